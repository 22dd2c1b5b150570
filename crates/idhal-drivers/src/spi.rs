//! SPI driver.
//!
//! An ID is one chip select on one SPI peripheral. The chip select is either
//! driven by the peripheral itself ([`ChipSelect::Hardware`]) or by a GPIO
//! line the driver toggles ([`ChipSelect::Software`]). The clock is given as
//! a prescaler of the peripheral clock or as a target frequency; both shapes
//! share the same ID space.
//!
//! Unless the caller holds the chip select with [`SpiDriver::cs_control`],
//! every transaction asserts it before the first byte and releases it after
//! the last one.
//!
//! # Examples
//!
//! ```
//! use idhal_core::Level;
//! use idhal_drivers::gpio::{GpioPin, GpioPort};
//! use idhal_drivers::mock::{MockSpi, SpiEvent};
//! use idhal_drivers::spi::{ChipSelect, Polarity, SpiClock, SpiDriver, SpiParameters, SpiPort, SpiPrescaler};
//!
//! let (transport, handle) = MockSpi::new();
//! let mut spi: SpiDriver<_> = SpiDriver::new(transport);
//!
//! let cs = ChipSelect::Software { port: GpioPort::D, pin: GpioPin::P0, polarity: Polarity::ActiveLow };
//! let parameters = SpiParameters::new(SpiPort::Spi3Pc10Pc11Pb5, cs, SpiClock::Prescaler(SpiPrescaler::Div32));
//! spi.init(0, parameters).unwrap();
//!
//! // Hold CS low across two writes.
//! spi.cs_control(0, true, Level::Low).unwrap();
//! spi.send(0, &[0x40]).unwrap();
//! spi.send(0, &[0x00]).unwrap();
//! spi.cs_control(0, false, Level::Low).unwrap();
//!
//! let cs_changes = handle.events().iter().filter(|e| matches!(e, SpiEvent::Cs { .. })).count();
//! assert_eq!(cs_changes, 3); // idle at init, lock, release
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use idhal_core::config::SPI_MAX_ID;
use idhal_core::{HalError, Level, PeripheralClass, Registry, ResourceConfig, Result, SlotState};

use crate::gpio::{GpioPin, GpioPort};
use crate::traits::SpiTransport;

/// Highest SCK frequency the peripherals can generate.
pub const SPI_MAX_FREQUENCY_HZ: u32 = 42_000_000;

/// SPI peripheral instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SpiPeripheral {
    Spi1,
    Spi2,
    Spi3,
}

impl SpiPeripheral {
    pub const COUNT: usize = 3;

    fn index(self) -> usize {
        self as usize
    }
}

/// SPI peripherals with their routed SCK/CIPO/COPI pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SpiPort {
    /// SPI1, SCK PA5, CIPO PA6, COPI PA7.
    Spi1Pa5Pa6Pa7,
    /// SPI2, SCK PB10, CIPO PC2, COPI PC3.
    Spi2Pb10Pc2Pc3,
    /// SPI2, SCK PB13, CIPO PC2, COPI PC3.
    Spi2Pb13Pc2Pc3,
    /// SPI3, SCK PC10, CIPO PC11, COPI PC12.
    Spi3Pc10Pc11Pc12,
    /// SPI3, SCK PC10, CIPO PC11, COPI PB5.
    Spi3Pc10Pc11Pb5,
}

impl SpiPort {
    pub fn peripheral(self) -> SpiPeripheral {
        match self {
            Self::Spi1Pa5Pa6Pa7 => SpiPeripheral::Spi1,
            Self::Spi2Pb10Pc2Pc3 | Self::Spi2Pb13Pc2Pc3 => SpiPeripheral::Spi2,
            Self::Spi3Pc10Pc11Pc12 | Self::Spi3Pc10Pc11Pb5 => SpiPeripheral::Spi3,
        }
    }
}

/// Clock polarity and phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SpiMode {
    /// CPOL 0, CPHA 0.
    #[default]
    Mode0,
    /// CPOL 0, CPHA 1.
    Mode1,
    /// CPOL 1, CPHA 0.
    Mode2,
    /// CPOL 1, CPHA 1.
    Mode3,
}

/// Level at which a chip select selects its device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Polarity {
    #[default]
    ActiveLow,
    ActiveHigh,
}

impl Polarity {
    pub fn active_level(self) -> Level {
        match self {
            Self::ActiveLow => Level::Low,
            Self::ActiveHigh => Level::High,
        }
    }

    pub fn idle_level(self) -> Level {
        self.active_level().toggled()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChipSelect {
    /// Driven by the SPI peripheral (its NSS pin).
    Hardware,
    /// Driven by the driver through a GPIO line.
    Software {
        port: GpioPort,
        pin: GpioPin,
        polarity: Polarity,
    },
}

/// Division of the peripheral clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpiPrescaler {
    Div2,
    Div4,
    Div8,
    Div16,
    Div32,
    Div64,
    Div128,
    Div256,
}

impl SpiPrescaler {
    pub fn divisor(self) -> u32 {
        2 << (self as u32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpiClock {
    Prescaler(SpiPrescaler),
    /// Target SCK frequency in hertz.
    Frequency(u32),
}

/// Binding of an SPI ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpiParameters {
    pub port: SpiPort,
    pub mode: SpiMode,
    pub chip_select: ChipSelect,
    pub clock: SpiClock,
    /// Byte clocked out while reading.
    pub mosi_value_on_reads: u8,
}

impl SpiParameters {
    /// Mode 0, reads clock out `0xFF`.
    pub fn new(port: SpiPort, chip_select: ChipSelect, clock: SpiClock) -> Self {
        Self {
            port,
            mode: SpiMode::Mode0,
            chip_select,
            clock,
            mosi_value_on_reads: 0xFF,
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: SpiMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_mosi_value_on_reads(mut self, value: u8) -> Self {
        self.mosi_value_on_reads = value;
        self
    }

    /// Settings the peripheral must run with for this ID.
    pub fn bus(&self) -> SpiBusConfig {
        SpiBusConfig {
            mode: self.mode,
            clock: self.clock,
            hardware_cs: self.chip_select == ChipSelect::Hardware,
        }
    }
}

impl ResourceConfig for SpiParameters {
    const CLASS: PeripheralClass = PeripheralClass::Spi;

    fn validate(&self) -> Result<()> {
        if let SpiClock::Frequency(hz) = self.clock
            && !(1..=SPI_MAX_FREQUENCY_HZ).contains(&hz)
        {
            return Err(HalError::invalid_parameter(format!(
                "SPI clock of {hz} Hz is outside 1..={SPI_MAX_FREQUENCY_HZ}"
            )));
        }
        Ok(())
    }

    fn conflicts_with(&self, other: &Self) -> bool {
        let same_peripheral = self.port.peripheral() == other.port.peripheral();
        if same_peripheral && self.port != other.port {
            return true;
        }
        match (self.chip_select, other.chip_select) {
            (ChipSelect::Hardware, ChipSelect::Hardware) => same_peripheral,
            (
                ChipSelect::Software { port, pin, .. },
                ChipSelect::Software {
                    port: other_port,
                    pin: other_pin,
                    ..
                },
            ) => port == other_port && pin == other_pin,
            _ => false,
        }
    }
}

/// Peripheral-level settings handed to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpiBusConfig {
    pub mode: SpiMode,
    pub clock: SpiClock,
    pub hardware_cs: bool,
}

/// SPI driver context.
#[derive(Debug)]
pub struct SpiDriver<T, const N: usize = SPI_MAX_ID> {
    registry: Registry<SpiParameters, (), N>,
    active: [Option<SpiBusConfig>; SpiPeripheral::COUNT],
    transport: T,
}

impl<T: SpiTransport, const N: usize> SpiDriver<T, N> {
    pub fn new(transport: T) -> Self {
        Self {
            registry: Registry::new(),
            active: [None; SpiPeripheral::COUNT],
            transport,
        }
    }

    /// Bind `id` to a chip select on a peripheral.
    ///
    /// Programs the peripheral and parks a software chip select at its idle level.
    ///
    /// # Errors
    ///
    /// - `InvalidId` if `id >= N`
    /// - `InvalidParameter` if the clock frequency is out of range
    /// - `ConfigurationConflict` on a shared chip-select pin, a second
    ///   hardware chip select, or a second routing of the same peripheral
    pub fn init(&mut self, id: u8, parameters: SpiParameters) -> Result<()> {
        let Self {
            registry,
            active,
            transport,
        } = self;
        registry
            .init(id, parameters, |p| {
                program(transport, active, p)?;
                if let ChipSelect::Software {
                    port,
                    pin,
                    polarity,
                } = p.chip_select
                {
                    transport.write_cs(port, pin, polarity.idle_level())?;
                }
                Ok(())
            })
            .inspect_err(|e| warn!(id, error = %e, "SPI init rejected"))?;

        debug!(id, port = ?parameters.port, chip_select = ?parameters.chip_select, "SPI bound");
        Ok(())
    }

    /// Bind `id` for a device driver, sharing an identical existing binding.
    ///
    /// Unlike `init`, a live ID is never moved to another chip select.
    ///
    /// # Errors
    ///
    /// `ConfigurationConflict` if `id` is bound with other parameters,
    /// otherwise the same checks as `init`.
    pub fn attach(&mut self, id: u8, parameters: SpiParameters) -> Result<()> {
        if self.registry.is_configured(id) {
            self.registry
                .claim(id, parameters, |_| Ok(()))
                .inspect_err(|e| warn!(id, error = %e, "SPI attach rejected"))?;
            return Ok(());
        }
        self.init(id, parameters)
    }

    /// Hold or release the chip select of a software-CS ID.
    ///
    /// With `lock` set the line is driven to `value` and left there across
    /// subsequent transactions; the ID reports [`SlotState::Busy`] until it is
    /// released. Without `lock` the line returns to the idle level of its
    /// polarity and `value` is ignored.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` for a hardware-CS ID.
    pub fn cs_control(&mut self, id: u8, lock: bool, value: Level) -> Result<()> {
        let p = *self.registry.get(id)?.config();
        let ChipSelect::Software {
            port,
            pin,
            polarity,
        } = p.chip_select
        else {
            return Err(HalError::invalid_parameter(format!(
                "SPI ID {id} uses a hardware chip select"
            )));
        };

        let level = if lock { value } else { polarity.idle_level() };
        self.transport.write_cs(port, pin, level)?;
        self.registry.set_busy(id, lock)?;
        trace!(id, lock, ?level, "SPI chip select");
        Ok(())
    }

    /// Clock `data` out, discarding the received bytes.
    pub fn send(&mut self, id: u8, data: &[u8]) -> Result<()> {
        self.transaction(id, |transport, port, _| transport.write(port, data))
    }

    /// Fill `buffer`, clocking out the ID's `mosi_value_on_reads`.
    pub fn read(&mut self, id: u8, buffer: &mut [u8]) -> Result<()> {
        self.transaction(id, |transport, port, p| {
            let tx = vec![p.mosi_value_on_reads; buffer.len()];
            transport.transfer(port, &tx, buffer)
        })
    }

    /// Full-duplex exchange.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` if the buffers differ in length.
    pub fn transfer(&mut self, id: u8, tx: &[u8], rx: &mut [u8]) -> Result<()> {
        if tx.len() != rx.len() {
            return Err(HalError::invalid_parameter(format!(
                "SPI transfer buffers differ in length ({} sent, {} received)",
                tx.len(),
                rx.len()
            )));
        }
        self.transaction(id, |transport, port, _| transport.transfer(port, tx, rx))
    }

    pub fn parameters(&self, id: u8) -> Result<&SpiParameters> {
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

    /// Run `f` with the peripheral programmed for `id` and its chip select
    /// asserted. A held chip select is left alone; otherwise it is released
    /// on every exit path.
    fn transaction<F>(&mut self, id: u8, f: F) -> Result<()>
    where
        F: FnOnce(&mut T, SpiPort, &SpiParameters) -> Result<()>,
    {
        let slot = self.registry.get(id)?;
        let p = *slot.config();
        let held = slot.is_busy();

        if self.active[p.port.peripheral().index()] != Some(p.bus()) {
            program(&mut self.transport, &mut self.active, &p)?;
        }

        let software_cs = match p.chip_select {
            ChipSelect::Software {
                port,
                pin,
                polarity,
            } if !held => Some((port, pin, polarity)),
            _ => None,
        };

        if let Some((port, pin, polarity)) = software_cs {
            self.transport.write_cs(port, pin, polarity.active_level())?;
        }

        let result = f(&mut self.transport, p.port, &p);

        if let Some((port, pin, polarity)) = software_cs {
            self.transport.write_cs(port, pin, polarity.idle_level())?;
        }

        trace!(id, ok = result.is_ok(), "SPI transaction");
        result
    }
}

fn program<T: SpiTransport>(
    transport: &mut T,
    active: &mut [Option<SpiBusConfig>; SpiPeripheral::COUNT],
    p: &SpiParameters,
) -> Result<()> {
    let bus = p.bus();
    transport.configure(p.port, bus)?;
    active[p.port.peripheral().index()] = Some(bus);
    Ok(())
}
