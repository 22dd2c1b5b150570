//! ID-addressed bus drivers and software timers.
//!
//! Each peripheral class has one driver context that owns the class's
//! [`Registry`](idhal_core::Registry) and the transport the IDs are bound to:
//!
//! | Driver | Addressed by | Shares a port by |
//! |--------|--------------|------------------|
//! | [`GpioDriver`] | port + pin | never |
//! | [`I2cDriver`] | port + device address | distinct addresses |
//! | [`SpiDriver`] | peripheral + chip select | distinct chip selects |
//! | [`UartDriver`] | peripheral | never |
//! | [`AdcDriver`] | analog channel | distinct channels |
//! | [`PitDriver`] | timer ID | n/a |
//!
//! Every operation takes the ID first and fails the same way across classes:
//! `InvalidId` outside the table, `NotConfigured` before `init`.
//!
//! # Examples
//!
//! ```
//! use idhal_drivers::i2c::{I2cDriver, I2cParameters, I2cPort, RegisterWidth};
//! use idhal_drivers::mock::{MockI2c, SimI2cDevice};
//!
//! let (transport, bus) = MockI2c::new();
//! bus.attach(I2cPort::I2c3Pc9Pa8, 0x68, SimI2cDevice::new(RegisterWidth::Bits8).with_register(0x75, 0x68));
//!
//! let mut i2c: I2cDriver<_> = I2cDriver::new(transport);
//! i2c.init(0, I2cParameters::new(I2cPort::I2c3Pc9Pa8, 0x68))?;
//!
//! let mut who_am_i = [0u8; 1];
//! i2c.read(0, 0x75, &mut who_am_i)?;
//! assert_eq!(who_am_i, [0x68]);
//! # Ok::<(), idhal_core::HalError>(())
//! ```

pub mod adc;
pub mod gpio;
pub mod i2c;
pub mod mock;
pub mod pit;
pub mod spi;
pub mod traits;
pub mod uart;

pub use adc::{AdcDriver, AdcParameters};
pub use gpio::{GpioDriver, GpioParameters};
pub use i2c::{I2cDriver, I2cParameters};
pub use pit::{PitDriver, PitStatus, PitUnit};
pub use spi::{SpiDriver, SpiParameters};
pub use traits::{AdcTransport, Clock, GpioTransport, I2cTransport, SpiTransport, SystemClock, UartTransport};
pub use uart::{UartDriver, UartParameters};
