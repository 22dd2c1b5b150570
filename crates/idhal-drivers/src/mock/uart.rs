//! Simulated UART peripherals.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use idhal_core::{HalError, Result};

use super::lock;
use crate::traits::UartTransport;
use crate::uart::{UartBaudRate, UartPort};

#[derive(Debug, Default)]
struct Port {
    baud_rate: Option<UartBaudRate>,
    rx: VecDeque<u8>,
    tx: Vec<u8>,
}

#[derive(Debug, Default)]
struct UartState {
    ports: BTreeMap<UartPort, Port>,
}

/// Simulated UART transport.
#[derive(Debug, Clone)]
pub struct MockUart {
    state: Arc<Mutex<UartState>>,
}

/// Test-side view of a [`MockUart`].
#[derive(Debug, Clone)]
pub struct MockUartHandle {
    state: Arc<Mutex<UartState>>,
}

impl MockUart {
    pub fn new() -> (Self, MockUartHandle) {
        let state = Arc::new(Mutex::new(UartState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            MockUartHandle { state },
        )
    }
}

impl UartTransport for MockUart {
    fn configure(&mut self, port: UartPort, baud_rate: UartBaudRate) -> Result<()> {
        lock(&self.state).ports.entry(port).or_default().baud_rate = Some(baud_rate);
        Ok(())
    }

    fn write(&mut self, port: UartPort, data: &[u8]) -> Result<()> {
        let mut state = lock(&self.state);
        let port = state
            .ports
            .get_mut(&port)
            .filter(|p| p.baud_rate.is_some())
            .ok_or_else(|| HalError::hardware_fault(format!("{port:?} is not clocked")))?;
        port.tx.extend_from_slice(data);
        Ok(())
    }

    fn poll_read(&mut self, port: UartPort, buffer: &mut [u8]) -> Result<usize> {
        let mut state = lock(&self.state);
        let Some(port) = state.ports.get_mut(&port) else {
            return Ok(0);
        };
        let count = buffer.len().min(port.rx.len());
        for (slot, byte) in buffer.iter_mut().zip(port.rx.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }

    fn flush_rx(&mut self, port: UartPort) -> Result<()> {
        if let Some(port) = lock(&self.state).ports.get_mut(&port) {
            port.rx.clear();
        }
        Ok(())
    }
}

impl MockUartHandle {
    /// Queue bytes as if they arrived on the RX line.
    pub fn feed(&self, port: UartPort, bytes: &[u8]) {
        lock(&self.state)
            .ports
            .entry(port)
            .or_default()
            .rx
            .extend(bytes);
    }

    /// Everything written to the TX line so far.
    pub fn sent(&self, port: UartPort) -> Vec<u8> {
        lock(&self.state)
            .ports
            .get(&port)
            .map(|p| p.tx.clone())
            .unwrap_or_default()
    }

    /// Bytes waiting in the receive FIFO.
    pub fn pending(&self, port: UartPort) -> usize {
        lock(&self.state).ports.get(&port).map_or(0, |p| p.rx.len())
    }

    pub fn baud_rate(&self, port: UartPort) -> Option<UartBaudRate> {
        lock(&self.state).ports.get(&port).and_then(|p| p.baud_rate)
    }
}
