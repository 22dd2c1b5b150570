//! GPIO driver.
//!
//! Each ID binds one port/pin pair with a fixed direction. Output levels are
//! shadowed in the slot so `toggle` never has to read the pin back.
//!
//! # Examples
//!
//! ```
//! use idhal_core::Level;
//! use idhal_drivers::gpio::{GpioDriver, GpioParameters, GpioPin, GpioPort};
//! use idhal_drivers::mock::MockGpio;
//!
//! let (transport, handle) = MockGpio::new();
//! let mut gpio: GpioDriver<_> = GpioDriver::new(transport);
//!
//! gpio.init(0, GpioParameters::output(GpioPort::B, GpioPin::P12)).unwrap();
//! gpio.set(0).unwrap();
//! assert_eq!(handle.level(GpioPort::B, GpioPin::P12), Some(Level::High));
//!
//! // Reading an output is a caller error, not a no-op.
//! assert!(gpio.read(0).is_err());
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use idhal_core::config::GPIO_MAX_ID;
use idhal_core::{HalError, Level, PeripheralClass, Registry, ResourceConfig, Result, SlotState};

use crate::traits::GpioTransport;

/// GPIO ports of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GpioPort {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
}

/// Pin number inside a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GpioPin {
    P0,
    P1,
    P2,
    P3,
    P4,
    P5,
    P6,
    P7,
    P8,
    P9,
    P10,
    P11,
    P12,
    P13,
    P14,
    P15,
}

impl GpioPin {
    const ALL: [Self; 16] = [
        Self::P0,
        Self::P1,
        Self::P2,
        Self::P3,
        Self::P4,
        Self::P5,
        Self::P6,
        Self::P7,
        Self::P8,
        Self::P9,
        Self::P10,
        Self::P11,
        Self::P12,
        Self::P13,
        Self::P14,
        Self::P15,
    ];

    pub fn index(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for GpioPin {
    type Error = HalError;

    fn try_from(value: u8) -> Result<Self> {
        Self::ALL
            .get(usize::from(value))
            .copied()
            .ok_or_else(|| HalError::invalid_parameter(format!("GPIO pin {value} does not exist")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Input,
    Output,
}

/// Pin driver configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PullConfig {
    /// No pull resistor.
    Disabled,
    /// Internal pull-up.
    PullUp,
    /// Internal pull-down.
    PullDown,
    /// Open drain with no pull (output only).
    OpenDrain,
    /// Push-pull driver (output only).
    PushPull,
    /// High impedance (input only).
    HighZ,
}

impl PullConfig {
    /// Whether this driver configuration makes sense for `direction`.
    pub fn supports(self, direction: Direction) -> bool {
        match self {
            Self::Disabled | Self::PullUp | Self::PullDown => true,
            Self::OpenDrain | Self::PushPull => direction == Direction::Output,
            Self::HighZ => direction == Direction::Input,
        }
    }
}

/// Binding of a GPIO ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpioParameters {
    pub port: GpioPort,
    pub pin: GpioPin,
    pub direction: Direction,
    pub pull: PullConfig,
    /// Level driven right after configuration (outputs only).
    pub initial_level: Level,
}

impl GpioParameters {
    /// Push-pull output starting low.
    pub fn output(port: GpioPort, pin: GpioPin) -> Self {
        Self {
            port,
            pin,
            direction: Direction::Output,
            pull: PullConfig::PushPull,
            initial_level: Level::Low,
        }
    }

    /// Input without pull resistor.
    pub fn input(port: GpioPort, pin: GpioPin) -> Self {
        Self {
            port,
            pin,
            direction: Direction::Input,
            pull: PullConfig::Disabled,
            initial_level: Level::Low,
        }
    }

    #[must_use]
    pub fn with_pull(mut self, pull: PullConfig) -> Self {
        self.pull = pull;
        self
    }

    #[must_use]
    pub fn with_initial_level(mut self, level: Level) -> Self {
        self.initial_level = level;
        self
    }
}

impl ResourceConfig for GpioParameters {
    const CLASS: PeripheralClass = PeripheralClass::Gpio;

    fn validate(&self) -> Result<()> {
        if !self.pull.supports(self.direction) {
            return Err(HalError::invalid_parameter(format!(
                "pull configuration {:?} is not valid for an {:?} pin",
                self.pull, self.direction
            )));
        }
        Ok(())
    }

    fn conflicts_with(&self, other: &Self) -> bool {
        self.port == other.port && self.pin == other.pin
    }
}

/// Runtime state of a GPIO ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpioState {
    /// Last level driven (outputs only).
    pub level: Level,
}

/// GPIO driver context.
#[derive(Debug)]
pub struct GpioDriver<T, const N: usize = GPIO_MAX_ID> {
    registry: Registry<GpioParameters, GpioState, N>,
    transport: T,
}

impl<T: GpioTransport, const N: usize> GpioDriver<T, N> {
    pub fn new(transport: T) -> Self {
        Self {
            registry: Registry::new(),
            transport,
        }
    }

    /// Bind `id` to a pin and configure it.
    ///
    /// # Errors
    ///
    /// - `InvalidId` if `id >= N`
    /// - `InvalidParameter` if the pull configuration does not fit the direction
    /// - `ConfigurationConflict` if another ID already owns the pin
    pub fn init(&mut self, id: u8, parameters: GpioParameters) -> Result<()> {
        let transport = &mut self.transport;
        self.registry
            .init(id, parameters, |p| {
                transport.configure(p.port, p.pin, p.direction, p.pull, p.initial_level)?;
                Ok(GpioState {
                    level: p.initial_level,
                })
            })
            .inspect_err(|e| warn!(id, error = %e, "GPIO init rejected"))?;

        debug!(id, port = ?parameters.port, pin = ?parameters.pin, direction = ?parameters.direction, "GPIO bound");
        Ok(())
    }

    /// Drive an output high.
    pub fn set(&mut self, id: u8) -> Result<()> {
        self.write(id, Level::High)
    }

    /// Drive an output low.
    pub fn clear(&mut self, id: u8) -> Result<()> {
        self.write(id, Level::Low)
    }

    /// Invert the shadowed output level.
    pub fn toggle(&mut self, id: u8) -> Result<()> {
        let level = self.output_level(id)?.toggled();
        self.write(id, level)
    }

    /// Drive an output to `level`.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` if the ID is configured as an input.
    pub fn write(&mut self, id: u8, level: Level) -> Result<()> {
        let slot = self.registry.get_mut(id)?;
        let p = *slot.config();
        if p.direction != Direction::Output {
            return Err(wrong_direction(id, p.direction));
        }

        self.transport.write(p.port, p.pin, level)?;
        slot.state_mut().level = level;
        trace!(id, ?level, "GPIO write");
        Ok(())
    }

    /// Sample an input.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` if the ID is configured as an output.
    pub fn read(&mut self, id: u8) -> Result<Level> {
        let p = *self.registry.get(id)?.config();
        if p.direction != Direction::Input {
            return Err(wrong_direction(id, p.direction));
        }
        self.transport.read(p.port, p.pin)
    }

    /// Last level driven on an output.
    pub fn output_level(&self, id: u8) -> Result<Level> {
        let slot = self.registry.get(id)?;
        if slot.config().direction != Direction::Output {
            return Err(wrong_direction(id, slot.config().direction));
        }
        Ok(slot.state().level)
    }

    pub fn parameters(&self, id: u8) -> Result<&GpioParameters> {
        Ok(self.registry.get(id)?.config())
    }

    pub fn state(&self, id: u8) -> Result<SlotState> {
        self.registry.state(id)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

fn wrong_direction(id: u8, direction: Direction) -> HalError {
    HalError::invalid_parameter(format!("GPIO ID {id} has the wrong direction ({direction:?})"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockGpio;
    use idhal_core::ErrorKind;
    use rstest::rstest;

    fn driver() -> (GpioDriver<MockGpio, 4>, crate::mock::MockGpioHandle) {
        let (transport, handle) = MockGpio::new();
        (GpioDriver::new(transport), handle)
    }

    #[test]
    fn test_output_set_clear() {
        let (mut gpio, handle) = driver();
        gpio.init(0, GpioParameters::output(GpioPort::A, GpioPin::P5))
            .unwrap();

        gpio.set(0).unwrap();
        assert_eq!(handle.level(GpioPort::A, GpioPin::P5), Some(Level::High));

        gpio.clear(0).unwrap();
        assert_eq!(handle.level(GpioPort::A, GpioPin::P5), Some(Level::Low));
    }

    #[test]
    fn test_initial_level_is_driven() {
        let (mut gpio, handle) = driver();
        let parameters =
            GpioParameters::output(GpioPort::C, GpioPin::P13).with_initial_level(Level::High);
        gpio.init(1, parameters).unwrap();

        assert_eq!(handle.level(GpioPort::C, GpioPin::P13), Some(Level::High));
        assert_eq!(gpio.output_level(1).unwrap(), Level::High);
    }

    #[test]
    fn test_toggle_twice_restores_level() {
        let (mut gpio, handle) = driver();
        gpio.init(0, GpioParameters::output(GpioPort::B, GpioPin::P7))
            .unwrap();

        gpio.toggle(0).unwrap();
        assert_eq!(gpio.output_level(0).unwrap(), Level::High);
        gpio.toggle(0).unwrap();
        assert_eq!(gpio.output_level(0).unwrap(), Level::Low);
        assert_eq!(handle.level(GpioPort::B, GpioPin::P7), Some(Level::Low));
    }

    #[test]
    fn test_read_input() {
        let (mut gpio, handle) = driver();
        gpio.init(2, GpioParameters::input(GpioPort::D, GpioPin::P0))
            .unwrap();

        handle.drive_input(GpioPort::D, GpioPin::P0, Level::High);
        assert_eq!(gpio.read(2).unwrap(), Level::High);

        handle.drive_input(GpioPort::D, GpioPin::P0, Level::Low);
        assert_eq!(gpio.read(2).unwrap(), Level::Low);
    }

    #[test]
    fn test_read_on_output_fails() {
        let (mut gpio, _handle) = driver();
        gpio.init(0, GpioParameters::output(GpioPort::A, GpioPin::P1))
            .unwrap();

        let error = gpio.read(0).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidParameter);
    }

    #[rstest]
    #[case::set(|g: &mut GpioDriver<MockGpio, 4>| g.set(0))]
    #[case::clear(|g: &mut GpioDriver<MockGpio, 4>| g.clear(0))]
    #[case::toggle(|g: &mut GpioDriver<MockGpio, 4>| g.toggle(0))]
    #[case::write(|g: &mut GpioDriver<MockGpio, 4>| g.write(0, Level::High))]
    fn test_output_operations_on_input_fail(
        #[case] operation: fn(&mut GpioDriver<MockGpio, 4>) -> Result<()>,
    ) {
        let (mut gpio, handle) = driver();
        gpio.init(0, GpioParameters::input(GpioPort::A, GpioPin::P1))
            .unwrap();

        let error = operation(&mut gpio).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidParameter);
        assert_eq!(handle.writes(), 0);
    }

    #[rstest]
    #[case(Direction::Output, PullConfig::PushPull, true)]
    #[case(Direction::Output, PullConfig::OpenDrain, true)]
    #[case(Direction::Output, PullConfig::HighZ, false)]
    #[case(Direction::Input, PullConfig::HighZ, true)]
    #[case(Direction::Input, PullConfig::PushPull, false)]
    #[case(Direction::Input, PullConfig::OpenDrain, false)]
    #[case(Direction::Input, PullConfig::PullUp, true)]
    #[case(Direction::Output, PullConfig::PullDown, true)]
    #[case(Direction::Input, PullConfig::Disabled, true)]
    fn test_pull_validated_against_direction(
        #[case] direction: Direction,
        #[case] pull: PullConfig,
        #[case] valid: bool,
    ) {
        let (mut gpio, _handle) = driver();
        let parameters = GpioParameters {
            port: GpioPort::E,
            pin: GpioPin::P2,
            direction,
            pull,
            initial_level: Level::Low,
        };

        let result = gpio.init(0, parameters);
        if valid {
            assert!(result.is_ok());
        } else {
            assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidParameter);
        }
    }

    #[test]
    fn test_same_pin_conflicts() {
        let (mut gpio, _handle) = driver();
        gpio.init(0, GpioParameters::output(GpioPort::B, GpioPin::P12))
            .unwrap();

        let error = gpio
            .init(1, GpioParameters::input(GpioPort::B, GpioPin::P12))
            .unwrap_err();
        assert_eq!(error, HalError::conflict(PeripheralClass::Gpio, 1, 0));

        // Same pin number on another port is a different line.
        gpio.init(1, GpioParameters::input(GpioPort::C, GpioPin::P12))
            .unwrap();
    }

    #[test]
    fn test_reinit_changes_direction() {
        let (mut gpio, _handle) = driver();
        gpio.init(0, GpioParameters::output(GpioPort::A, GpioPin::P0))
            .unwrap();
        gpio.init(0, GpioParameters::input(GpioPort::A, GpioPin::P0))
            .unwrap();

        assert_eq!(gpio.parameters(0).unwrap().direction, Direction::Input);
        assert!(gpio.set(0).is_err());
    }

    #[test]
    fn test_pin_from_u8() {
        assert_eq!(GpioPin::try_from(15).unwrap(), GpioPin::P15);
        assert_eq!(GpioPin::try_from(3).unwrap().index(), 3);
        assert!(GpioPin::try_from(16).is_err());
    }
}
