//! Board setup: which IDs and wiring each application role uses.
//!
//! A [`BoardSetup`] is plain data. It deserializes from JSON, every field has
//! a default equal to the reference board, and [`BoardSetup::validate`]
//! rejects a setup whose roles collide before any driver is touched.
//!
//! ```
//! use idhal_sim::BoardSetup;
//!
//! let setup = BoardSetup::from_json(r#"{ "timers": { "display": { "pit_id": 4, "period_ms": 50 } } }"#)?;
//! assert_eq!(setup.timers.display.pit_id, 4);
//! assert_eq!(setup.timers.ahrs.pit_id, 1);
//! setup.validate()?;
//! # Ok::<(), idhal_sim::SetupError>(())
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use idhal_core::config::{GPIO_MAX_ID, I2C_MAX_ID, PIT_MAX_ID, SPI_MAX_ID, UART_MAX_ID};
use idhal_core::{HalError, PeripheralClass, Registry, ResourceConfig};
use idhal_devices::{I2cAttachment, SpiAttachment};
use idhal_drivers::gpio::{GpioPin, GpioPort};
use idhal_drivers::i2c::{I2cPort, RegisterWidth};
use idhal_drivers::spi::{ChipSelect, Polarity, SpiClock, SpiPort, SpiPrescaler};
use idhal_drivers::uart::{UartBaudRate, UartPort};
use idhal_drivers::{GpioParameters, UartParameters};

/// Errors raised while loading or checking a board setup.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("Invalid setup JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cannot read setup file: {0}")]
    Io(#[from] std::io::Error),

    /// Two roles claim the same ID of one class.
    #[error("{class} ID {id} is used by both {first} and {second}")]
    DuplicateId {
        class: PeripheralClass,
        id: u8,
        first: String,
        second: String,
    },

    /// A role's binding is rejected by its registry.
    #[error("{role}: {source}")]
    Hal {
        role: String,
        #[source]
        source: HalError,
    },
}

impl SetupError {
    fn hal(role: impl Into<String>, source: HalError) -> Self {
        Self::Hal {
            role: role.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SetupError>;

/// A device driver slot and where its chip sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRole<A> {
    pub device_id: u8,
    pub attachment: A,
}

/// A PIT ID re-armed every `period_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerRole {
    pub pit_id: u8,
    pub period_ms: u32,
}

/// A bus ID with its full parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusRole<P> {
    pub id: u8,
    pub parameters: P,
}

/// Periodic jobs of the main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timers {
    /// Display refresh.
    pub display: TimerRole,
    /// Attitude sampling (IMU plus magnetometer).
    pub ahrs: TimerRole,
    /// Sample logging to the SD card.
    pub sdcard: TimerRole,
}

impl Default for Timers {
    fn default() -> Self {
        Self {
            display: TimerRole {
                pit_id: 0,
                period_ms: 20,
            },
            ahrs: TimerRole {
                pit_id: 1,
                period_ms: 100,
            },
            sdcard: TimerRole {
                pit_id: 19,
                period_ms: 100,
            },
        }
    }
}

/// Wiring of every role the simulated board plays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardSetup {
    pub display: DeviceRole<I2cAttachment>,
    pub imu: DeviceRole<I2cAttachment>,
    /// Separate compass chip; absent when the IMU measures the field itself.
    pub magnetometer: Option<DeviceRole<I2cAttachment>>,
    pub sdcard: DeviceRole<SpiAttachment>,
    pub console: BusRole<UartParameters>,
    /// Status outputs toggled by the periodic jobs (display, AHRS, SD).
    pub status_pins: Vec<BusRole<GpioParameters>>,
    pub timers: Timers,
}

/// I2C port shared by the display and the inertial sensors.
pub const SENSOR_PORT: I2cPort = I2cPort::I2c3Pc9Pa8;

#[cfg(feature = "display-hd44780")]
const DISPLAY_ADDRESS: u16 = 0x27;
#[cfg(not(feature = "display-hd44780"))]
const DISPLAY_ADDRESS: u16 = 0x3C;

#[cfg(feature = "imu-qmc5883l")]
const IMU_ADDRESS: u16 = 0x0D;
#[cfg(not(feature = "imu-qmc5883l"))]
const IMU_ADDRESS: u16 = 0x68;

const COMPASS_ADDRESS: u16 = 0x0D;

impl Default for BoardSetup {
    fn default() -> Self {
        let status_pin = |id, pin| BusRole {
            id,
            parameters: GpioParameters::output(GpioPort::B, pin),
        };
        Self {
            display: DeviceRole {
                device_id: 0,
                attachment: I2cAttachment::new(0, SENSOR_PORT, DISPLAY_ADDRESS),
            },
            imu: DeviceRole {
                device_id: 0,
                attachment: I2cAttachment::new(1, SENSOR_PORT, IMU_ADDRESS),
            },
            magnetometer: (IMU_ADDRESS != COMPASS_ADDRESS).then(|| DeviceRole {
                device_id: 0,
                attachment: I2cAttachment::new(2, SENSOR_PORT, COMPASS_ADDRESS),
            }),
            sdcard: DeviceRole {
                device_id: 0,
                attachment: SpiAttachment::new(
                    0,
                    SpiPort::Spi3Pc10Pc11Pb5,
                    ChipSelect::Software {
                        port: GpioPort::D,
                        pin: GpioPin::P0,
                        polarity: Polarity::ActiveLow,
                    },
                    SpiClock::Prescaler(SpiPrescaler::Div32),
                ),
            },
            console: BusRole {
                id: 0,
                parameters: UartParameters {
                    port: UartPort::Uart2Pa3Pa2,
                    baud_rate: UartBaudRate::Bps115200,
                    reception_timeout_ms: 20,
                },
            },
            status_pins: vec![
                status_pin(0, GpioPin::P12),
                status_pin(1, GpioPin::P13),
                status_pin(2, GpioPin::P7),
            ],
            timers: Timers::default(),
        }
    }
}

impl BoardSetup {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every role against the registry rules of its class.
    ///
    /// Nothing is bound: each class is replayed into an empty table, so
    /// out-of-range IDs, invalid parameters and colliding bindings surface
    /// the same way the drivers would report them.
    ///
    /// # Errors
    ///
    /// - `DuplicateId` if two roles name the same ID of one class
    /// - `Hal` with the registry error of the first rejected role
    pub fn validate(&self) -> Result<()> {
        let i2c_roles = [
            ("display", Some(&self.display)),
            ("imu", Some(&self.imu)),
            ("magnetometer", self.magnetometer.as_ref()),
        ];
        let mut i2c: Registry<_, (), I2C_MAX_ID> = Registry::new();
        let mut i2c_owners = Owners::new(PeripheralClass::I2c);
        for (role, device) in i2c_roles {
            let Some(device) = device else { continue };
            let attachment = device.attachment;
            i2c_owners.claim(attachment.bus_id, role)?;
            replay(&mut i2c, role, attachment.bus_id, attachment.parameters(RegisterWidth::Bits8))?;
        }

        let mut spi: Registry<_, (), SPI_MAX_ID> = Registry::new();
        let attachment = self.sdcard.attachment;
        replay(&mut spi, "sdcard", attachment.bus_id, attachment.parameters())?;

        let mut uart: Registry<_, (), UART_MAX_ID> = Registry::new();
        replay(&mut uart, "console", self.console.id, self.console.parameters)?;

        let mut gpio: Registry<_, (), GPIO_MAX_ID> = Registry::new();
        let mut gpio_owners = Owners::new(PeripheralClass::Gpio);
        for (index, pin) in self.status_pins.iter().enumerate() {
            let role = format!("status pin {index}");
            gpio_owners.claim(pin.id, &role)?;
            replay(&mut gpio, &role, pin.id, pin.parameters)?;
        }

        let mut pit_owners = Owners::new(PeripheralClass::Pit);
        for (role, timer) in [
            ("display timer", self.timers.display),
            ("ahrs timer", self.timers.ahrs),
            ("sdcard timer", self.timers.sdcard),
        ] {
            if usize::from(timer.pit_id) >= PIT_MAX_ID {
                return Err(SetupError::hal(
                    role,
                    HalError::invalid_id(PeripheralClass::Pit, timer.pit_id, PIT_MAX_ID),
                ));
            }
            if timer.period_ms == 0 {
                return Err(SetupError::hal(
                    role,
                    HalError::invalid_parameter("PIT count must be greater than zero"),
                ));
            }
            pit_owners.claim(timer.pit_id, role)?;
        }

        Ok(())
    }
}

/// Bind `config` to `id` in a scratch table.
fn replay<C: ResourceConfig, const N: usize>(
    registry: &mut Registry<C, (), N>,
    role: &str,
    id: u8,
    config: C,
) -> Result<()> {
    registry
        .init(id, config, |_| Ok(()))
        .map(|_| ())
        .map_err(|e| SetupError::hal(role, e))
}

/// First role seen for each ID of one class.
struct Owners {
    class: PeripheralClass,
    roles: BTreeMap<u8, String>,
}

impl Owners {
    fn new(class: PeripheralClass) -> Self {
        Self {
            class,
            roles: BTreeMap::new(),
        }
    }

    fn claim(&mut self, id: u8, role: &str) -> Result<()> {
        if let Some(first) = self.roles.get(&id) {
            return Err(SetupError::DuplicateId {
                class: self.class,
                id,
                first: first.clone(),
                second: role.to_string(),
            });
        }
        self.roles.insert(id, role.to_string());
        Ok(())
    }
}
