//! Simulated analog converters.
//!
//! Channel values are set through the handle and returned raw by every
//! conversion; bits above the configured resolution are left for the driver
//! to mask.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use idhal_core::{HalError, Result};

use super::lock;
use crate::adc::{AdcChannel, AdcPort, AdcPrescaler, AdcResolution, AdcSamplingTime};
use crate::traits::AdcTransport;

#[derive(Debug, Default)]
struct AdcState {
    converters: BTreeMap<AdcPort, (AdcResolution, AdcPrescaler)>,
    channels: BTreeMap<(AdcPort, AdcChannel), AdcSamplingTime>,
    values: BTreeMap<AdcChannel, u16>,
    conversions: usize,
}

/// Simulated ADC transport.
#[derive(Debug, Clone)]
pub struct MockAdc {
    state: Arc<Mutex<AdcState>>,
}

/// Test-side view of a [`MockAdc`].
#[derive(Debug, Clone)]
pub struct MockAdcHandle {
    state: Arc<Mutex<AdcState>>,
}

impl MockAdc {
    pub fn new() -> (Self, MockAdcHandle) {
        let state = Arc::new(Mutex::new(AdcState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            MockAdcHandle { state },
        )
    }
}

impl AdcTransport for MockAdc {
    fn configure(
        &mut self,
        port: AdcPort,
        resolution: AdcResolution,
        prescaler: AdcPrescaler,
    ) -> Result<()> {
        lock(&self.state)
            .converters
            .insert(port, (resolution, prescaler));
        Ok(())
    }

    fn configure_channel(
        &mut self,
        port: AdcPort,
        channel: AdcChannel,
        sampling_time: AdcSamplingTime,
    ) -> Result<()> {
        lock(&self.state)
            .channels
            .insert((port, channel), sampling_time);
        Ok(())
    }

    fn convert(&mut self, port: AdcPort, channel: AdcChannel) -> Result<u16> {
        let mut state = lock(&self.state);
        if !state.channels.contains_key(&(port, channel)) {
            return Err(HalError::hardware_fault(format!(
                "{channel:?} is not enabled on {port:?}"
            )));
        }
        state.conversions += 1;
        Ok(state.values.get(&channel).copied().unwrap_or(0))
    }
}

impl MockAdcHandle {
    /// Raw value every later conversion of `channel` returns.
    pub fn set_value(&self, channel: AdcChannel, raw: u16) {
        lock(&self.state).values.insert(channel, raw);
    }

    pub fn conversions(&self) -> usize {
        lock(&self.state).conversions
    }

    pub fn resolution(&self, port: AdcPort) -> Option<AdcResolution> {
        lock(&self.state).converters.get(&port).map(|(r, _)| *r)
    }
}
