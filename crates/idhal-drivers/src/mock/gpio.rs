//! Simulated GPIO ports.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use idhal_core::{Level, Result};

use super::lock;
use crate::gpio::{Direction, GpioPin, GpioPort, PullConfig};
use crate::traits::GpioTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PinState {
    direction: Direction,
    pull: PullConfig,
    level: Level,
}

#[derive(Debug, Default)]
struct GpioState {
    pins: BTreeMap<(GpioPort, GpioPin), PinState>,
    writes: usize,
}

/// Simulated GPIO transport.
#[derive(Debug, Clone)]
pub struct MockGpio {
    state: Arc<Mutex<GpioState>>,
}

/// Test-side view of a [`MockGpio`].
#[derive(Debug, Clone)]
pub struct MockGpioHandle {
    state: Arc<Mutex<GpioState>>,
}

impl MockGpio {
    pub fn new() -> (Self, MockGpioHandle) {
        let state = Arc::new(Mutex::new(GpioState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            MockGpioHandle { state },
        )
    }
}

impl GpioTransport for MockGpio {
    fn configure(
        &mut self,
        port: GpioPort,
        pin: GpioPin,
        direction: Direction,
        pull: PullConfig,
        level: Level,
    ) -> Result<()> {
        // Inputs with a pull resistor idle at the pulled level.
        let level = match (direction, pull) {
            (Direction::Output, _) => level,
            (Direction::Input, PullConfig::PullUp) => Level::High,
            (Direction::Input, _) => Level::Low,
        };
        lock(&self.state).pins.insert(
            (port, pin),
            PinState {
                direction,
                pull,
                level,
            },
        );
        Ok(())
    }

    fn write(&mut self, port: GpioPort, pin: GpioPin, level: Level) -> Result<()> {
        let mut state = lock(&self.state);
        state.writes += 1;
        if let Some(pin) = state.pins.get_mut(&(port, pin)) {
            pin.level = level;
        }
        Ok(())
    }

    fn read(&mut self, port: GpioPort, pin: GpioPin) -> Result<Level> {
        Ok(lock(&self.state)
            .pins
            .get(&(port, pin))
            .map_or(Level::Low, |pin| pin.level))
    }
}

impl MockGpioHandle {
    /// Current level of a configured pin.
    pub fn level(&self, port: GpioPort, pin: GpioPin) -> Option<Level> {
        lock(&self.state).pins.get(&(port, pin)).map(|pin| pin.level)
    }

    /// Pull configuration a pin was set up with.
    pub fn pull(&self, port: GpioPort, pin: GpioPin) -> Option<PullConfig> {
        lock(&self.state).pins.get(&(port, pin)).map(|pin| pin.pull)
    }

    /// Apply an external level to an input pin.
    pub fn drive_input(&self, port: GpioPort, pin: GpioPin, level: Level) {
        let mut state = lock(&self.state);
        let entry = state.pins.entry((port, pin)).or_insert(PinState {
            direction: Direction::Input,
            pull: PullConfig::Disabled,
            level,
        });
        if entry.direction == Direction::Input {
            entry.level = level;
        }
    }

    /// Number of output writes performed so far.
    pub fn writes(&self) -> usize {
        lock(&self.state).writes
    }
}
