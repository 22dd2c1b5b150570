//! Simulated I2C controllers and register-mapped devices.
//!
//! Devices are attached by port and address. A write stores its payload
//! starting at the framed register address with auto-increment; a read
//! returns the same memory. Unwritten registers read as zero. Devices without
//! a register address (port expanders) keep the raw bytes they received
//! instead.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use idhal_core::{HalError, Result};

use super::lock;
use crate::i2c::{I2cBaudRate, I2cPort, RegisterWidth};
use crate::traits::I2cTransport;

/// One transaction as seen on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum I2cTransaction {
    Write {
        port: I2cPort,
        address: u16,
        bytes: Vec<u8>,
    },
    Read {
        port: I2cPort,
        address: u16,
        bytes: Vec<u8>,
        len: usize,
    },
}

impl I2cTransaction {
    pub fn address(&self) -> u16 {
        match self {
            Self::Write { address, .. } | Self::Read { address, .. } => *address,
        }
    }
}

/// Register map of a simulated device.
#[derive(Debug, Clone, Default)]
pub struct SimI2cDevice {
    width: RegisterWidth,
    registers: BTreeMap<u32, u8>,
    received: Vec<u8>,
}

impl SimI2cDevice {
    pub fn new(width: RegisterWidth) -> Self {
        Self {
            width,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_register(mut self, register: u32, value: u8) -> Self {
        self.registers.insert(register, value);
        self
    }

    #[must_use]
    pub fn with_registers(mut self, start: u32, values: &[u8]) -> Self {
        for (register, value) in (start..).zip(values) {
            self.registers.insert(register, *value);
        }
        self
    }

    /// Split a framed write into register address and payload.
    fn split<'a>(&self, bytes: &'a [u8]) -> (u32, &'a [u8]) {
        let len = self.width.bytes().min(bytes.len());
        let register = bytes[..len]
            .iter()
            .fold(0u32, |acc, byte| (acc << 8) | u32::from(*byte));
        (register, &bytes[len..])
    }

    fn write(&mut self, bytes: &[u8]) {
        if self.width == RegisterWidth::None {
            self.received.extend_from_slice(bytes);
            return;
        }
        let (start, payload) = self.split(bytes);
        for (register, value) in (start..).zip(payload) {
            self.registers.insert(register, *value);
        }
    }

    fn read(&self, bytes: &[u8], buffer: &mut [u8]) {
        let (start, _) = self.split(bytes);
        for (register, slot) in (start..).zip(buffer.iter_mut()) {
            *slot = self.registers.get(&register).copied().unwrap_or(0);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PortConfig {
    baud_rate: I2cBaudRate,
    pull_up: bool,
}

#[derive(Debug, Default)]
struct I2cState {
    ports: BTreeMap<I2cPort, PortConfig>,
    devices: BTreeMap<(I2cPort, u16), SimI2cDevice>,
    log: Vec<I2cTransaction>,
}

/// Simulated I2C transport.
#[derive(Debug, Clone)]
pub struct MockI2c {
    state: Arc<Mutex<I2cState>>,
}

/// Test-side view of a [`MockI2c`].
#[derive(Debug, Clone)]
pub struct MockI2cHandle {
    state: Arc<Mutex<I2cState>>,
}

impl MockI2c {
    pub fn new() -> (Self, MockI2cHandle) {
        let state = Arc::new(Mutex::new(I2cState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            MockI2cHandle { state },
        )
    }
}

impl I2cTransport for MockI2c {
    fn configure(&mut self, port: I2cPort, baud_rate: I2cBaudRate, pull_up: bool) -> Result<()> {
        lock(&self.state)
            .ports
            .insert(port, PortConfig { baud_rate, pull_up });
        Ok(())
    }

    fn write(&mut self, port: I2cPort, address: u16, bytes: &[u8]) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.ports.contains_key(&port) {
            return Err(HalError::hardware_fault(format!("{port:?} is not clocked")));
        }
        state.log.push(I2cTransaction::Write {
            port,
            address,
            bytes: bytes.to_vec(),
        });
        let device = state
            .devices
            .get_mut(&(port, address))
            .ok_or_else(|| HalError::nack(address))?;
        device.write(bytes);
        Ok(())
    }

    fn write_read(
        &mut self,
        port: I2cPort,
        address: u16,
        bytes: &[u8],
        buffer: &mut [u8],
    ) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.ports.contains_key(&port) {
            return Err(HalError::hardware_fault(format!("{port:?} is not clocked")));
        }
        state.log.push(I2cTransaction::Read {
            port,
            address,
            bytes: bytes.to_vec(),
            len: buffer.len(),
        });
        let device = state
            .devices
            .get(&(port, address))
            .ok_or_else(|| HalError::nack(address))?;
        device.read(bytes, buffer);
        Ok(())
    }
}

impl MockI2cHandle {
    /// Put a device on the bus.
    pub fn attach(&self, port: I2cPort, address: u16, device: SimI2cDevice) {
        lock(&self.state).devices.insert((port, address), device);
    }

    /// Remove a device; later transactions to it are not acknowledged.
    pub fn detach(&self, port: I2cPort, address: u16) {
        lock(&self.state).devices.remove(&(port, address));
    }

    /// Overwrite registers of an attached device (e.g. new sensor samples).
    pub fn set_registers(&self, port: I2cPort, address: u16, start: u32, values: &[u8]) {
        if let Some(device) = lock(&self.state).devices.get_mut(&(port, address)) {
            for (register, value) in (start..).zip(values) {
                device.registers.insert(register, *value);
            }
        }
    }

    pub fn register(&self, port: I2cPort, address: u16, register: u32) -> Option<u8> {
        lock(&self.state)
            .devices
            .get(&(port, address))
            .and_then(|device| device.registers.get(&register).copied())
    }

    /// Raw bytes received by a device without register addressing.
    pub fn received(&self, port: I2cPort, address: u16) -> Vec<u8> {
        lock(&self.state)
            .devices
            .get(&(port, address))
            .map(|device| device.received.clone())
            .unwrap_or_default()
    }

    pub fn transactions(&self) -> Vec<I2cTransaction> {
        lock(&self.state).log.clone()
    }

    pub fn clear_transactions(&self) {
        lock(&self.state).log.clear();
    }

    pub fn baud_rate(&self, port: I2cPort) -> Option<I2cBaudRate> {
        lock(&self.state).ports.get(&port).map(|c| c.baud_rate)
    }

    pub fn pull_up(&self, port: I2cPort) -> Option<bool> {
        lock(&self.state).ports.get(&port).map(|c| c.pull_up)
    }
}
