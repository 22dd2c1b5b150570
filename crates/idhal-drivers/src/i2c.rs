//! I2C driver.
//!
//! An ID is one addressed device on one port. Several IDs may share a port as
//! long as their device addresses differ; the port is re-programmed before a
//! transaction whenever the ID's baud rate or pull-up differs from what the
//! port currently runs with.
//!
//! Register addresses are framed MSB-first ahead of the payload, using the
//! number of bytes given by the ID's [`RegisterWidth`].

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use idhal_core::config::I2C_MAX_ID;
use idhal_core::{HalError, PeripheralClass, Registry, ResourceConfig, Result, SlotState};

use crate::traits::I2cTransport;

/// I2C controllers with their routed pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum I2cPort {
    /// I2C1, SDA on PB7, SCL on PB6.
    I2c1Pb7Pb6,
    /// I2C2, SDA on PB11, SCL on PB10.
    I2c2Pb11Pb10,
    /// I2C3, SDA on PC9, SCL on PA8.
    I2c3Pc9Pa8,
}

impl I2cPort {
    pub const COUNT: usize = 3;

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressMode {
    SevenBit,
    TenBit,
}

impl AddressMode {
    /// Highest device address the mode can express.
    pub fn max_address(self) -> u16 {
        match self {
            Self::SevenBit => 0x7F,
            Self::TenBit => 0x3FF,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum I2cBaudRate {
    /// 100 kbit/s.
    Standard,
    /// 400 kbit/s.
    Fast,
}

impl I2cBaudRate {
    pub fn hz(self) -> u32 {
        match self {
            Self::Standard => 100_000,
            Self::Fast => 400_000,
        }
    }
}

/// Size of the register address inside the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RegisterWidth {
    /// The device has no register address; payload goes out as is.
    #[default]
    None,
    Bits8,
    Bits16,
    Bits24,
    Bits32,
}

impl RegisterWidth {
    /// Build a width from a bit count.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` unless `bits` is 0, 8, 16, 24 or 32.
    ///
    /// # Examples
    ///
    /// ```
    /// use idhal_drivers::i2c::RegisterWidth;
    ///
    /// assert_eq!(RegisterWidth::from_bits(16).unwrap(), RegisterWidth::Bits16);
    /// assert!(RegisterWidth::from_bits(12).is_err());
    /// ```
    pub fn from_bits(bits: u32) -> Result<Self> {
        match bits {
            0 => Ok(Self::None),
            8 => Ok(Self::Bits8),
            16 => Ok(Self::Bits16),
            24 => Ok(Self::Bits24),
            32 => Ok(Self::Bits32),
            other => Err(HalError::invalid_parameter(format!(
                "register width of {other} bits is not supported"
            ))),
        }
    }

    /// Number of address bytes sent ahead of the payload.
    pub fn bytes(self) -> usize {
        match self {
            Self::None => 0,
            Self::Bits8 => 1,
            Self::Bits16 => 2,
            Self::Bits24 => 3,
            Self::Bits32 => 4,
        }
    }

    /// Whether `register` can be expressed in this width.
    pub fn fits(self, register: u32) -> bool {
        match self.bytes() {
            4 => true,
            n => u64::from(register) < 1u64 << (8 * n),
        }
    }

    /// Encode `register` MSB-first.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` if the register does not fit.
    pub fn encode(self, register: u32) -> Result<Vec<u8>> {
        if !self.fits(register) {
            return Err(HalError::invalid_parameter(format!(
                "register 0x{register:X} does not fit a {:?} register address",
                self
            )));
        }
        let bytes = register.to_be_bytes();
        Ok(bytes[4 - self.bytes()..].to_vec())
    }
}

/// Binding of an I2C ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct I2cParameters {
    pub port: I2cPort,
    pub address_mode: AddressMode,
    pub address: u16,
    pub baud_rate: I2cBaudRate,
    pub pull_up: bool,
    pub register_width: RegisterWidth,
}

impl I2cParameters {
    /// 7-bit device at 400 kbit/s with 8-bit registers and no internal pull-up.
    pub fn new(port: I2cPort, address: u16) -> Self {
        Self {
            port,
            address_mode: AddressMode::SevenBit,
            address,
            baud_rate: I2cBaudRate::Fast,
            pull_up: false,
            register_width: RegisterWidth::Bits8,
        }
    }

    #[must_use]
    pub fn with_register_width(mut self, width: RegisterWidth) -> Self {
        self.register_width = width;
        self
    }

    #[must_use]
    pub fn with_baud_rate(mut self, baud_rate: I2cBaudRate) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    #[must_use]
    pub fn with_pull_up(mut self, pull_up: bool) -> Self {
        self.pull_up = pull_up;
        self
    }

    fn bus(&self) -> BusConfig {
        BusConfig {
            baud_rate: self.baud_rate,
            pull_up: self.pull_up,
        }
    }
}

impl ResourceConfig for I2cParameters {
    const CLASS: PeripheralClass = PeripheralClass::I2c;

    fn validate(&self) -> Result<()> {
        let max = self.address_mode.max_address();
        if self.address > max {
            return Err(HalError::invalid_parameter(format!(
                "address 0x{:X} exceeds {:?} range (max 0x{max:X})",
                self.address, self.address_mode
            )));
        }
        Ok(())
    }

    fn conflicts_with(&self, other: &Self) -> bool {
        self.port == other.port && self.address == other.address
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BusConfig {
    baud_rate: I2cBaudRate,
    pull_up: bool,
}

/// I2C driver context.
#[derive(Debug)]
pub struct I2cDriver<T, const N: usize = I2C_MAX_ID> {
    registry: Registry<I2cParameters, (), N>,
    active: [Option<BusConfig>; I2cPort::COUNT],
    transport: T,
}

impl<T: I2cTransport, const N: usize> I2cDriver<T, N> {
    pub fn new(transport: T) -> Self {
        Self {
            registry: Registry::new(),
            active: [None; I2cPort::COUNT],
            transport,
        }
    }

    /// Bind `id` to a device on a port and program the port.
    ///
    /// # Errors
    ///
    /// - `InvalidId` if `id >= N`
    /// - `InvalidParameter` if the address does not fit its mode
    /// - `ConfigurationConflict` if another ID owns the same address on the port
    pub fn init(&mut self, id: u8, parameters: I2cParameters) -> Result<()> {
        let Self {
            registry,
            active,
            transport,
        } = self;
        registry
            .init(id, parameters, |p| {
                program(transport, active, p)?;
                Ok(())
            })
            .inspect_err(|e| warn!(id, error = %e, "I2C init rejected"))?;

        debug!(id, port = ?parameters.port, address = parameters.address, "I2C bound");
        Ok(())
    }

    /// Bind `id` for a device driver, sharing an identical existing binding.
    ///
    /// Unlike `init`, a live ID is never moved to another device.
    ///
    /// # Errors
    ///
    /// `ConfigurationConflict` if `id` is bound with other parameters,
    /// otherwise the same checks as `init`.
    pub fn attach(&mut self, id: u8, parameters: I2cParameters) -> Result<()> {
        let Self {
            registry,
            active,
            transport,
        } = self;
        registry
            .claim(id, parameters, |p| {
                program(transport, active, p)?;
                Ok(())
            })
            .inspect_err(|e| warn!(id, error = %e, "I2C attach rejected"))?;

        debug!(id, port = ?parameters.port, address = parameters.address, "I2C attached");
        Ok(())
    }

    /// Re-bind an initialized ID with new baud rate, pull-up or address.
    ///
    /// # Errors
    ///
    /// `NotConfigured` if the ID was never initialized, then the same checks as `init`.
    pub fn reconfigure(&mut self, id: u8, parameters: I2cParameters) -> Result<()> {
        let Self {
            registry,
            active,
            transport,
        } = self;
        registry
            .reconfigure(id, parameters, |p, _| program(transport, active, p))
            .inspect_err(|e| warn!(id, error = %e, "I2C reconfigure rejected"))?;

        debug!(id, port = ?parameters.port, address = parameters.address, "I2C re-bound");
        Ok(())
    }

    /// Write `data` to `register` of the ID's device.
    ///
    /// # Errors
    ///
    /// - `InvalidParameter` if the register does not fit the ID's register width
    /// - `DeviceNotResponding` if the device does not acknowledge
    pub fn send(&mut self, id: u8, register: u32, data: &[u8]) -> Result<()> {
        let p = self.prepare(id)?;
        let mut frame = p.register_width.encode(register)?;
        frame.extend_from_slice(data);

        trace!(id, register, len = data.len(), "I2C send");
        self.transport
            .write(p.port, p.address, &frame)
            .inspect_err(|e| warn!(id, address = p.address, error = %e, "I2C send failed"))
    }

    /// Read `buffer.len()` bytes starting at `register` of the ID's device.
    ///
    /// # Errors
    ///
    /// - `InvalidParameter` if the register does not fit the ID's register width
    /// - `DeviceNotResponding` if the device does not acknowledge
    pub fn read(&mut self, id: u8, register: u32, buffer: &mut [u8]) -> Result<()> {
        let p = self.prepare(id)?;
        let frame = p.register_width.encode(register)?;

        trace!(id, register, len = buffer.len(), "I2C read");
        self.transport
            .write_read(p.port, p.address, &frame, buffer)
            .inspect_err(|e| warn!(id, address = p.address, error = %e, "I2C read failed"))
    }

    pub fn parameters(&self, id: u8) -> Result<&I2cParameters> {
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

    /// Look the ID up and make sure its port runs with the ID's settings.
    fn prepare(&mut self, id: u8) -> Result<I2cParameters> {
        let p = *self.registry.get(id)?.config();
        if self.active[p.port.index()] != Some(p.bus()) {
            program(&mut self.transport, &mut self.active, &p)?;
        }
        Ok(p)
    }
}

fn program<T: I2cTransport>(
    transport: &mut T,
    active: &mut [Option<BusConfig>; I2cPort::COUNT],
    p: &I2cParameters,
) -> Result<()> {
    transport.configure(p.port, p.baud_rate, p.pull_up)?;
    active[p.port.index()] = Some(p.bus());
    Ok(())
}
