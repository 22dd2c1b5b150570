//! Device classes and their concrete drivers.
//!
//! A device class (display, inertial sensor, block storage) is a trait that
//! every concrete chip of that class implements. Application code is written
//! against the trait and the chip is picked at build time through the type
//! aliases in [`board`], so swapping an SSD1306 for an HD44780 never changes
//! the consumer.
//!
//! Every operation follows the same two-step bring-up:
//!
//! 1. `int_hw_init` binds the bus driver ID the chip sits on.
//! 2. `ext_hw_config` runs the chip's power-up sequence over that bus.
//!
//! Calling anything before step 1 (or, for everything but `ext_hw_config`,
//! before step 2) fails with `NotConfigured` and never touches the bus.
//!
//! # Examples
//!
//! ```
//! use idhal_devices::display::Ssd1306;
//! use idhal_devices::{Color, DisplayDevice, I2cAttachment};
//! use idhal_drivers::I2cDriver;
//! use idhal_drivers::i2c::{I2cPort, RegisterWidth};
//! use idhal_drivers::mock::{MockI2c, SimI2cDevice};
//!
//! let (transport, bus) = MockI2c::new();
//! bus.attach(I2cPort::I2c3Pc9Pa8, 0x3C, SimI2cDevice::new(RegisterWidth::Bits8));
//! let mut i2c: I2cDriver<_> = I2cDriver::new(transport);
//!
//! let mut display: Ssd1306 = Ssd1306::new();
//! display.int_hw_init(&mut i2c, 0, I2cAttachment::new(0, I2cPort::I2c3Pc9Pa8, 0x3C))?;
//! display.ext_hw_config(&mut i2c, 0)?;
//! display.send_string(&mut i2c, 0, b"HELLO", 0, 0, Color::Normal)?;
//!
//! let specs = DisplayDevice::<I2cDriver<MockI2c>>::read_specs(&display);
//! assert_eq!((specs.h_chars, specs.v_chars), (16, 4));
//! # Ok::<(), idhal_core::HalError>(())
//! ```

pub mod board;
pub mod display;
pub mod imu;
pub mod storage;
pub mod table;
pub mod traits;

pub use table::{DeviceClass, DeviceTable};
pub use traits::{
    Axes, Color, DeviceBus, DisplayDevice, DisplaySpecs, I2cAttachment, ImuData, ImuDevice,
    ImuSpecs, SpiAttachment, StorageDevice, StorageSpecs,
};
