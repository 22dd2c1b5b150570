//! Common test utilities for the device class tests.

#![allow(dead_code)]

use idhal_devices::{I2cAttachment, SpiAttachment};
use idhal_drivers::gpio::{GpioPin, GpioPort};
use idhal_drivers::i2c::{I2cPort, RegisterWidth};
use idhal_drivers::mock::{MockI2c, MockI2cHandle, MockSpi, MockSpiHandle, SimI2cDevice, SimSdCard};
use idhal_drivers::spi::{ChipSelect, Polarity, SpiClock, SpiPort, SpiPrescaler};
use idhal_drivers::{I2cDriver, SpiDriver};

pub const I2C_PORT: I2cPort = I2cPort::I2c3Pc9Pa8;

pub const SSD1306_ADDRESS: u16 = 0x3C;
pub const HD44780_ADDRESS: u16 = 0x27;
pub const MPU6050_ADDRESS: u16 = 0x68;
pub const QMC5883L_ADDRESS: u16 = 0x0D;

/// I2C bus with every supported chip attached and answering its ID check.
pub fn i2c_bus() -> (I2cDriver<MockI2c>, MockI2cHandle) {
    let (transport, handle) = MockI2c::new();
    handle.attach(I2C_PORT, SSD1306_ADDRESS, SimI2cDevice::new(RegisterWidth::Bits8));
    handle.attach(I2C_PORT, HD44780_ADDRESS, SimI2cDevice::new(RegisterWidth::None));
    handle.attach(
        I2C_PORT,
        MPU6050_ADDRESS,
        SimI2cDevice::new(RegisterWidth::Bits8).with_register(0x75, 0x68),
    );
    handle.attach(
        I2C_PORT,
        QMC5883L_ADDRESS,
        SimI2cDevice::new(RegisterWidth::Bits8).with_register(0x0D, 0xFF),
    );
    (I2cDriver::new(transport), handle)
}

pub fn display_at(address: u16) -> I2cAttachment {
    I2cAttachment::new(0, I2C_PORT, address)
}

pub fn imu_at(address: u16) -> I2cAttachment {
    I2cAttachment::new(1, I2C_PORT, address)
}

/// SPI bus with an SD card on software chip select PD0.
pub fn spi_bus() -> (SpiDriver<MockSpi>, MockSpiHandle, SimSdCard) {
    let (transport, handle) = MockSpi::new();
    let card = SimSdCard::new();
    handle.attach(GpioPort::D, GpioPin::P0, Polarity::ActiveLow, card.clone());
    (SpiDriver::new(transport), handle, card)
}

pub fn sdcard() -> SpiAttachment {
    SpiAttachment::new(
        0,
        SpiPort::Spi3Pc10Pc11Pb5,
        ChipSelect::Software {
            port: GpioPort::D,
            pin: GpioPin::P0,
            polarity: Polarity::ActiveLow,
        },
        SpiClock::Prescaler(SpiPrescaler::Div32),
    )
}
