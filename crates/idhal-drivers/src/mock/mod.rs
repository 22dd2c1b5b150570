//! Simulated transports for host builds and tests.
//!
//! Every mock comes as a pair: the transport, which is moved into a bus
//! driver, and a cloneable handle that shares its state. Tests and the board
//! simulator use the handle to attach simulated devices, feed input and
//! inspect the traffic the driver produced.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod adc;
pub mod clock;
pub mod gpio;
pub mod i2c;
pub mod sdcard;
pub mod spi;
pub mod uart;

pub use adc::{MockAdc, MockAdcHandle};
pub use clock::SimClock;
pub use gpio::{MockGpio, MockGpioHandle};
pub use i2c::{I2cTransaction, MockI2c, MockI2cHandle, SimI2cDevice};
pub use sdcard::SimSdCard;
pub use spi::{MockSpi, MockSpiHandle, ScriptedResponder, SpiEvent, SpiResponder};
pub use uart::{MockUart, MockUartHandle};

/// Lock shared mock state. A panic in another test thread does not make the
/// state unusable, so poisoning is ignored.
pub(crate) fn lock<S>(state: &Mutex<S>) -> MutexGuard<'_, S> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
