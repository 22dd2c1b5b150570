//! Simulated SPI peripherals.
//!
//! Every configure, chip-select change and byte exchange is recorded as a
//! [`SpiEvent`]. Simulated devices implement [`SpiResponder`] and are
//! attached behind either a software chip select or the hardware chip select
//! of a peripheral; a device only sees traffic while it is selected.
//! Unselected reads return `0xFF` (CIPO floating high).

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};

use idhal_core::{HalError, Level, Result};

use super::lock;
use crate::gpio::{GpioPin, GpioPort};
use crate::spi::{Polarity, SpiBusConfig, SpiPeripheral, SpiPort};
use crate::traits::SpiTransport;

/// A simulated SPI device.
pub trait SpiResponder: Send + fmt::Debug {
    /// Take the byte on COPI and return the byte driven on CIPO.
    fn exchange(&mut self, mosi: u8) -> u8;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpiEvent {
    Configure { port: SpiPort, config: SpiBusConfig },
    Cs { port: GpioPort, pin: GpioPin, level: Level },
    Write { port: SpiPort, data: Vec<u8> },
    Transfer { port: SpiPort, tx: Vec<u8> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Software {
        port: GpioPort,
        pin: GpioPin,
        polarity: Polarity,
    },
    Hardware(SpiPeripheral),
}

#[derive(Debug, Default)]
struct SpiState {
    ports: BTreeMap<SpiPort, SpiBusConfig>,
    cs: BTreeMap<(GpioPort, GpioPin), Level>,
    events: Vec<SpiEvent>,
    devices: Vec<(Target, Box<dyn SpiResponder>)>,
}

impl SpiState {
    fn exchange(&mut self, port: SpiPort, tx: &[u8], rx: &mut [u8]) -> Result<()> {
        let config = self
            .ports
            .get(&port)
            .copied()
            .ok_or_else(|| HalError::hardware_fault(format!("{port:?} is not clocked")))?;

        let cs = &self.cs;
        let selected = self.devices.iter_mut().find(|(target, _)| match *target {
            Target::Software {
                port: cs_port,
                pin,
                polarity,
            } => cs.get(&(cs_port, pin)) == Some(&polarity.active_level()),
            Target::Hardware(peripheral) => {
                config.hardware_cs && peripheral == port.peripheral()
            }
        });

        match selected {
            Some((_, device)) => {
                for (out, byte) in rx.iter_mut().zip(tx) {
                    *out = device.exchange(*byte);
                }
            }
            None => rx.fill(0xFF),
        }
        Ok(())
    }
}

/// Simulated SPI transport.
#[derive(Debug, Clone)]
pub struct MockSpi {
    state: Arc<Mutex<SpiState>>,
}

/// Test-side view of a [`MockSpi`].
#[derive(Debug, Clone)]
pub struct MockSpiHandle {
    state: Arc<Mutex<SpiState>>,
}

impl MockSpi {
    pub fn new() -> (Self, MockSpiHandle) {
        let state = Arc::new(Mutex::new(SpiState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            MockSpiHandle { state },
        )
    }
}

impl SpiTransport for MockSpi {
    fn configure(&mut self, port: SpiPort, config: SpiBusConfig) -> Result<()> {
        let mut state = lock(&self.state);
        state.ports.insert(port, config);
        state.events.push(SpiEvent::Configure { port, config });
        Ok(())
    }

    fn write(&mut self, port: SpiPort, data: &[u8]) -> Result<()> {
        let mut state = lock(&self.state);
        state.events.push(SpiEvent::Write {
            port,
            data: data.to_vec(),
        });
        let mut discard = vec![0u8; data.len()];
        state.exchange(port, data, &mut discard)
    }

    fn transfer(&mut self, port: SpiPort, tx: &[u8], rx: &mut [u8]) -> Result<()> {
        let mut state = lock(&self.state);
        state.events.push(SpiEvent::Transfer {
            port,
            tx: tx.to_vec(),
        });
        state.exchange(port, tx, rx)
    }

    fn write_cs(&mut self, port: GpioPort, pin: GpioPin, level: Level) -> Result<()> {
        let mut state = lock(&self.state);
        state.cs.insert((port, pin), level);
        state.events.push(SpiEvent::Cs { port, pin, level });
        Ok(())
    }
}

impl MockSpiHandle {
    /// Attach a device selected by a software chip-select line.
    pub fn attach(
        &self,
        port: GpioPort,
        pin: GpioPin,
        polarity: Polarity,
        device: impl SpiResponder + 'static,
    ) {
        lock(&self.state).devices.push((
            Target::Software {
                port,
                pin,
                polarity,
            },
            Box::new(device),
        ));
    }

    /// Attach a device selected by a peripheral's hardware chip select.
    pub fn attach_hardware(&self, peripheral: SpiPeripheral, device: impl SpiResponder + 'static) {
        lock(&self.state)
            .devices
            .push((Target::Hardware(peripheral), Box::new(device)));
    }

    pub fn events(&self) -> Vec<SpiEvent> {
        lock(&self.state).events.clone()
    }

    pub fn clear_events(&self) {
        lock(&self.state).events.clear();
    }

    /// Last level driven on a software chip-select line.
    pub fn cs_level(&self, port: GpioPort, pin: GpioPin) -> Option<Level> {
        lock(&self.state).cs.get(&(port, pin)).copied()
    }

    /// Settings the port was last programmed with.
    pub fn bus_config(&self, port: SpiPort) -> Option<SpiBusConfig> {
        lock(&self.state).ports.get(&port).copied()
    }
}

/// Responder that answers every byte with a fixed script, then `0xFF`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedResponder {
    script: VecDeque<u8>,
    received: Arc<Mutex<Vec<u8>>>,
}

impl ScriptedResponder {
    pub fn new(script: &[u8]) -> Self {
        Self {
            script: script.iter().copied().collect(),
            received: Arc::default(),
        }
    }

    /// Bytes clocked in so far (shared between clones).
    pub fn received(&self) -> Vec<u8> {
        lock(&self.received).clone()
    }
}

impl SpiResponder for ScriptedResponder {
    fn exchange(&mut self, mosi: u8) -> u8 {
        lock(&self.received).push(mosi);
        self.script.pop_front().unwrap_or(0xFF)
    }
}
