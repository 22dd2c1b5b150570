//! Common test utilities for the bus driver integration tests.
//!
//! [`Bench`] wires every driver to its simulated transport and keeps the
//! handles, so a test can drive one class and observe the wire.

#![allow(dead_code)]

use idhal_drivers::adc::{AdcChannel, AdcPort};
use idhal_drivers::gpio::{GpioPin, GpioPort};
use idhal_drivers::i2c::I2cPort;
use idhal_drivers::mock::{
    MockAdc, MockAdcHandle, MockGpio, MockGpioHandle, MockI2c, MockI2cHandle, MockSpi,
    MockSpiHandle, MockUart, MockUartHandle, SimClock,
};
use idhal_drivers::spi::{ChipSelect, Polarity, SpiClock, SpiPort, SpiPrescaler};
use idhal_drivers::uart::{UartBaudRate, UartPort};
use idhal_drivers::{
    AdcDriver, AdcParameters, GpioDriver, GpioParameters, I2cDriver, I2cParameters, PitDriver,
    SpiDriver, SpiParameters, UartDriver, UartParameters,
};

/// Every bus driver with default capacities, on simulated transports.
pub struct Bench {
    pub gpio: GpioDriver<MockGpio>,
    pub i2c: I2cDriver<MockI2c>,
    pub spi: SpiDriver<MockSpi>,
    pub uart: UartDriver<MockUart, SimClock>,
    pub adc: AdcDriver<MockAdc>,
    pub pit: PitDriver,
    pub gpio_bus: MockGpioHandle,
    pub i2c_bus: MockI2cHandle,
    pub spi_bus: MockSpiHandle,
    pub uart_bus: MockUartHandle,
    pub adc_bus: MockAdcHandle,
}

impl Bench {
    pub fn new() -> Self {
        let (gpio, gpio_bus) = MockGpio::new();
        let (i2c, i2c_bus) = MockI2c::new();
        let (spi, spi_bus) = MockSpi::new();
        let (uart, uart_bus) = MockUart::new();
        let (adc, adc_bus) = MockAdc::new();

        Self {
            gpio: GpioDriver::new(gpio),
            i2c: I2cDriver::new(i2c),
            spi: SpiDriver::new(spi),
            uart: UartDriver::with_clock(uart, SimClock::new()),
            adc: AdcDriver::new(adc),
            pit: PitDriver::new(),
            gpio_bus,
            i2c_bus,
            spi_bus,
            uart_bus,
            adc_bus,
        }
    }
}

pub fn gpio_output() -> GpioParameters {
    GpioParameters::output(GpioPort::B, GpioPin::P12)
}

pub fn i2c_display() -> I2cParameters {
    I2cParameters::new(I2cPort::I2c3Pc9Pa8, 0x3C)
}

pub fn spi_sdcard() -> SpiParameters {
    SpiParameters::new(
        SpiPort::Spi3Pc10Pc11Pb5,
        ChipSelect::Software {
            port: GpioPort::D,
            pin: GpioPin::P0,
            polarity: Polarity::ActiveLow,
        },
        SpiClock::Prescaler(SpiPrescaler::Div32),
    )
}

pub fn uart_console() -> UartParameters {
    UartParameters {
        port: UartPort::Uart2Pa3Pa2,
        baud_rate: UartBaudRate::Bps115200,
        reception_timeout_ms: 20,
    }
}

pub fn adc_input() -> AdcParameters {
    AdcParameters::new(AdcPort::Adc1, AdcChannel::Ch0)
}
