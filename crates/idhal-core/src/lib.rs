//! Core building blocks of the ID-based hardware abstraction layer.
//!
//! Every peripheral class of the board (GPIO, I2C, SPI, UART, ADC, software
//! timers) and every concrete device driver addresses its instances through
//! small integer IDs. This crate holds what all of them share:
//!
//! - [`Registry`]: the fixed-capacity ID table that validates parameters,
//!   detects binding conflicts and tracks the state of each slot.
//! - [`HalError`] and [`Status`]: the cross-driver error taxonomy and the
//!   discriminated status every operation can be reduced to.
//! - [`config`]: the per-class capacities with their documented defaults.
//!
//! # Examples
//!
//! ```
//! use idhal_core::{PeripheralClass, Registry, ResourceConfig, Result};
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Led {
//!     pin: u8,
//! }
//!
//! impl ResourceConfig for Led {
//!     const CLASS: PeripheralClass = PeripheralClass::Gpio;
//!
//!     fn validate(&self) -> Result<()> {
//!         Ok(())
//!     }
//!
//!     fn conflicts_with(&self, other: &Self) -> bool {
//!         self.pin == other.pin
//!     }
//! }
//!
//! let mut leds: Registry<Led, bool, 4> = Registry::new();
//! leds.init(0, Led { pin: 5 }, |_| Ok(false)).unwrap();
//!
//! // Pin 5 is already claimed by ID 0.
//! assert!(leds.init(1, Led { pin: 5 }, |_| Ok(false)).is_err());
//! // ID 4 is outside the table.
//! assert!(leds.init(4, Led { pin: 6 }, |_| Ok(false)).is_err());
//! ```

pub mod config;
pub mod error;
pub mod registry;
pub mod status;
pub mod types;

pub use error::{ErrorKind, HalError, NoResponse, Result};
pub use registry::{Registry, ResourceConfig, Slot, SlotState};
pub use status::Status;
pub use types::{Level, PeripheralClass};

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
