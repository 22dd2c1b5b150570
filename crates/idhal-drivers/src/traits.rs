//! Transport traits: the boundary between the ID registries and the physical
//! peripherals.
//!
//! A bus driver validates IDs, parameters and bindings; everything that
//! touches a peripheral register goes through one of these traits. The host
//! build binds them to the simulated transports in [`crate::mock`], a firmware
//! build binds them to the chip's register blocks.
//!
//! Transports address hardware by physical enums (port, pin, channel), never by
//! ID. They do not validate anything the registry already validated.

use std::time::Instant;

use idhal_core::{Level, Result};

use crate::adc::{AdcChannel, AdcPort, AdcPrescaler, AdcResolution, AdcSamplingTime};
use crate::gpio::{Direction, GpioPin, GpioPort, PullConfig};
use crate::i2c::{I2cBaudRate, I2cPort};
use crate::spi::{SpiBusConfig, SpiPort};
use crate::uart::{UartBaudRate, UartPort};

/// Digital pin access.
pub trait GpioTransport {
    /// Apply direction and driver configuration to a pin; outputs start at `level`.
    fn configure(
        &mut self,
        port: GpioPort,
        pin: GpioPin,
        direction: Direction,
        pull: PullConfig,
        level: Level,
    ) -> Result<()>;

    fn write(&mut self, port: GpioPort, pin: GpioPin, level: Level) -> Result<()>;

    fn read(&mut self, port: GpioPort, pin: GpioPin) -> Result<Level>;
}

/// I2C controller access.
///
/// `bytes` are already framed: register address (if any) MSB-first, then payload.
pub trait I2cTransport {
    fn configure(&mut self, port: I2cPort, baud_rate: I2cBaudRate, pull_up: bool) -> Result<()>;

    /// Write transaction. A missing acknowledge is reported as
    /// [`HalError::DeviceNotResponding`](idhal_core::HalError::DeviceNotResponding).
    fn write(&mut self, port: I2cPort, address: u16, bytes: &[u8]) -> Result<()>;

    /// Write `bytes` (usually a register address), repeated start, then fill `buffer`.
    fn write_read(
        &mut self,
        port: I2cPort,
        address: u16,
        bytes: &[u8],
        buffer: &mut [u8],
    ) -> Result<()>;
}

/// SPI controller and software chip-select access.
pub trait SpiTransport {
    fn configure(&mut self, port: SpiPort, config: SpiBusConfig) -> Result<()>;

    /// Clock `data` out, discarding what comes back.
    fn write(&mut self, port: SpiPort, data: &[u8]) -> Result<()>;

    /// Full-duplex exchange; `tx` and `rx` have the same length.
    fn transfer(&mut self, port: SpiPort, tx: &[u8], rx: &mut [u8]) -> Result<()>;

    /// Drive a software chip-select line.
    fn write_cs(&mut self, port: GpioPort, pin: GpioPin, level: Level) -> Result<()>;
}

/// UART access.
pub trait UartTransport {
    fn configure(&mut self, port: UartPort, baud_rate: UartBaudRate) -> Result<()>;

    fn write(&mut self, port: UartPort, data: &[u8]) -> Result<()>;

    /// Move whatever is in the receive FIFO into `buffer` without blocking.
    ///
    /// Returns the number of bytes moved, at most `buffer.len()`.
    fn poll_read(&mut self, port: UartPort, buffer: &mut [u8]) -> Result<usize>;

    /// Discard the receive FIFO.
    fn flush_rx(&mut self, port: UartPort) -> Result<()>;
}

/// Analog converter access.
pub trait AdcTransport {
    fn configure(
        &mut self,
        port: AdcPort,
        resolution: AdcResolution,
        prescaler: AdcPrescaler,
    ) -> Result<()>;

    fn configure_channel(
        &mut self,
        port: AdcPort,
        channel: AdcChannel,
        sampling_time: AdcSamplingTime,
    ) -> Result<()>;

    /// One blocking conversion. The raw value may carry bits above the
    /// configured resolution; the driver masks them.
    fn convert(&mut self, port: AdcPort, channel: AdcChannel) -> Result<u16>;
}

/// Millisecond time source used for reception timeouts.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Wall-clock time since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}
