//! ADC driver.
//!
//! An ID is one analog channel sampled by one of the three converters.
//! Channels 4 to 9, 14 and 15 are only wired to ADC1 and ADC2. Converter-wide
//! settings (resolution, clock prescaler) follow the ID being read: the
//! converter is re-programmed when the previous conversion used different ones.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use idhal_core::config::ADC_MAX_ID;
use idhal_core::{HalError, PeripheralClass, Registry, ResourceConfig, Result, SlotState};

use crate::traits::AdcTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AdcPort {
    Adc1,
    Adc2,
    Adc3,
}

impl AdcPort {
    pub const COUNT: usize = 3;

    fn index(self) -> usize {
        self as usize
    }
}

/// Analog input channels and the pins they sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AdcChannel {
    /// PA0
    Ch0,
    /// PA1
    Ch1,
    /// PA2
    Ch2,
    /// PA3
    Ch3,
    /// PA4
    Ch4,
    /// PA5
    Ch5,
    /// PA6
    Ch6,
    /// PA7
    Ch7,
    /// PB0
    Ch8,
    /// PB1
    Ch9,
    /// PC0
    Ch10,
    /// PC1
    Ch11,
    /// PC2
    Ch12,
    /// PC3
    Ch13,
    /// PC4
    Ch14,
    /// PC5
    Ch15,
}

impl AdcChannel {
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Whether `port` can sample this channel.
    pub fn is_available_on(self, port: AdcPort) -> bool {
        match port {
            AdcPort::Adc1 | AdcPort::Adc2 => true,
            AdcPort::Adc3 => !matches!(self.index(), 4..=9 | 14 | 15),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AdcResolution {
    Bits6,
    Bits8,
    Bits10,
    #[default]
    Bits12,
}

impl AdcResolution {
    pub fn bits(self) -> u32 {
        match self {
            Self::Bits6 => 6,
            Self::Bits8 => 8,
            Self::Bits10 => 10,
            Self::Bits12 => 12,
        }
    }

    /// Largest sample value at this resolution.
    pub fn max_value(self) -> u16 {
        (1u16 << self.bits()) - 1
    }
}

/// Division of the converter clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AdcPrescaler {
    #[default]
    Div2,
    Div4,
    Div6,
    Div8,
}

/// Sample-and-hold time in converter clock cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AdcSamplingTime {
    #[default]
    Cycles3,
    Cycles15,
    Cycles28,
    Cycles56,
    Cycles84,
    Cycles112,
    Cycles144,
    Cycles480,
}

impl AdcSamplingTime {
    pub fn cycles(self) -> u32 {
        match self {
            Self::Cycles3 => 3,
            Self::Cycles15 => 15,
            Self::Cycles28 => 28,
            Self::Cycles56 => 56,
            Self::Cycles84 => 84,
            Self::Cycles112 => 112,
            Self::Cycles144 => 144,
            Self::Cycles480 => 480,
        }
    }
}

/// Binding of an ADC ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdcParameters {
    pub port: AdcPort,
    pub channel: AdcChannel,
    pub resolution: AdcResolution,
    pub prescaler: AdcPrescaler,
    pub sampling_time: AdcSamplingTime,
}

impl AdcParameters {
    /// 12-bit conversions with the fastest clock and sampling time.
    pub fn new(port: AdcPort, channel: AdcChannel) -> Self {
        Self {
            port,
            channel,
            resolution: AdcResolution::default(),
            prescaler: AdcPrescaler::default(),
            sampling_time: AdcSamplingTime::default(),
        }
    }

    #[must_use]
    pub fn with_resolution(mut self, resolution: AdcResolution) -> Self {
        self.resolution = resolution;
        self
    }

    fn converter(&self) -> ConverterConfig {
        ConverterConfig {
            resolution: self.resolution,
            prescaler: self.prescaler,
        }
    }
}

impl ResourceConfig for AdcParameters {
    const CLASS: PeripheralClass = PeripheralClass::Adc;

    fn validate(&self) -> Result<()> {
        if !self.channel.is_available_on(self.port) {
            return Err(HalError::invalid_parameter(format!(
                "{:?} is not wired to {:?}",
                self.channel, self.port
            )));
        }
        Ok(())
    }

    fn conflicts_with(&self, other: &Self) -> bool {
        self.channel == other.channel
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ConverterConfig {
    resolution: AdcResolution,
    prescaler: AdcPrescaler,
}

/// ADC driver context.
#[derive(Debug)]
pub struct AdcDriver<T, const N: usize = ADC_MAX_ID> {
    registry: Registry<AdcParameters, (), N>,
    active: [Option<ConverterConfig>; AdcPort::COUNT],
    transport: T,
}

impl<T: AdcTransport, const N: usize> AdcDriver<T, N> {
    pub fn new(transport: T) -> Self {
        Self {
            registry: Registry::new(),
            active: [None; AdcPort::COUNT],
            transport,
        }
    }

    /// Bind `id` to a converter channel.
    ///
    /// # Errors
    ///
    /// - `InvalidId` if `id >= N`
    /// - `InvalidParameter` if the channel is not wired to the converter
    /// - `ConfigurationConflict` if another ID samples the same channel
    pub fn init(&mut self, id: u8, parameters: AdcParameters) -> Result<()> {
        let Self {
            registry,
            active,
            transport,
        } = self;
        registry
            .init(id, parameters, |p| program(transport, active, p))
            .inspect_err(|e| warn!(id, error = %e, "ADC init rejected"))?;

        debug!(id, port = ?parameters.port, channel = ?parameters.channel, "ADC bound");
        Ok(())
    }

    /// Move an initialized ID to another analog input.
    ///
    /// # Errors
    ///
    /// `NotConfigured` if the ID was never initialized, then the same checks as `init`.
    pub fn setup_channel(&mut self, id: u8, channel: AdcChannel) -> Result<()> {
        let parameters = AdcParameters {
            channel,
            ..*self.registry.get(id)?.config()
        };
        let transport = &mut self.transport;
        self.registry
            .reconfigure(id, parameters, |p, _| {
                transport.configure_channel(p.port, p.channel, p.sampling_time)
            })
            .inspect_err(|e| warn!(id, error = %e, "ADC channel setup rejected"))?;

        debug!(id, ?channel, "ADC channel moved");
        Ok(())
    }

    /// Perform `samples` conversions into `buffer`, masked to the ID's resolution.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` if `buffer` holds fewer than `samples` values.
    pub fn read(&mut self, id: u8, buffer: &mut [u16], samples: usize) -> Result<()> {
        let p = *self.registry.get(id)?.config();
        if buffer.len() < samples {
            return Err(HalError::invalid_parameter(format!(
                "ADC buffer of {} samples cannot hold {samples}",
                buffer.len()
            )));
        }

        if self.active[p.port.index()] != Some(p.converter()) {
            program(&mut self.transport, &mut self.active, &p)?;
        }

        let mask = p.resolution.max_value();
        for sample in &mut buffer[..samples] {
            *sample = self.transport.convert(p.port, p.channel)? & mask;
        }
        trace!(id, samples, "ADC read");
        Ok(())
    }

    pub fn parameters(&self, id: u8) -> Result<&AdcParameters> {
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

fn program<T: AdcTransport>(
    transport: &mut T,
    active: &mut [Option<ConverterConfig>; AdcPort::COUNT],
    p: &AdcParameters,
) -> Result<()> {
    transport.configure(p.port, p.resolution, p.prescaler)?;
    transport.configure_channel(p.port, p.channel, p.sampling_time)?;
    active[p.port.index()] = Some(p.converter());
    Ok(())
}
