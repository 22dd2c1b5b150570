//! Types shared by every peripheral class.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Peripheral class a registry is instantiated for.
///
/// Bus classes and device classes share the tag so that errors name the
/// table that rejected an ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeripheralClass {
    Gpio,
    I2c,
    Spi,
    Uart,
    Adc,
    Pit,
    Display,
    Imu,
    Storage,
}

impl fmt::Display for PeripheralClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Gpio => "GPIO",
            Self::I2c => "I2C",
            Self::Spi => "SPI",
            Self::Uart => "UART",
            Self::Adc => "ADC",
            Self::Pit => "PIT",
            Self::Display => "Display",
            Self::Imu => "IMU",
            Self::Storage => "Storage",
        };
        write!(f, "{name}")
    }
}

/// Logic level of a digital line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Level {
    #[default]
    Low,
    High,
}

impl Level {
    /// The opposite level.
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Self::Low => Self::High,
            Self::High => Self::Low,
        }
    }

    pub fn is_high(self) -> bool {
        self == Self::High
    }
}

impl From<bool> for Level {
    fn from(value: bool) -> Self {
        if value { Self::High } else { Self::Low }
    }
}

impl From<Level> for bool {
    fn from(level: Level) -> bool {
        level.is_high()
    }
}

impl From<u8> for Level {
    /// Zero is low, anything else is high.
    fn from(value: u8) -> Self {
        Self::from(value != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_toggle() {
        assert_eq!(Level::Low.toggled(), Level::High);
        assert_eq!(Level::High.toggled().toggled(), Level::High);
    }

    #[test]
    fn test_level_from_u8() {
        assert_eq!(Level::from(0u8), Level::Low);
        assert_eq!(Level::from(1u8), Level::High);
        assert_eq!(Level::from(0xFFu8), Level::High);
    }

    #[test]
    fn test_class_display() {
        assert_eq!(PeripheralClass::I2c.to_string(), "I2C");
        assert_eq!(PeripheralClass::Pit.to_string(), "PIT");
        assert_eq!(PeripheralClass::Imu.to_string(), "IMU");
    }

    #[test]
    fn test_level_serialization() {
        let json = serde_json::to_string(&Level::High).unwrap();
        let level: Level = serde_json::from_str(&json).unwrap();
        assert_eq!(level, Level::High);
    }
}
