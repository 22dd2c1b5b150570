//! Software timers (PIT).
//!
//! A single tick source calls [`PitDriver::tick`] once per millisecond. Each
//! ID counts ticks towards its own target; callers poll with
//! [`PitDriver::get`], which answers [`PitStatus::Answered`] exactly once and
//! then frees the ID.
//!
//! # Examples
//!
//! ```
//! use idhal_drivers::pit::{PitDriver, PitStatus, PitUnit};
//!
//! let mut pit: PitDriver = PitDriver::new();
//! pit.set(0, 3, PitUnit::Milliseconds).unwrap();
//!
//! pit.tick();
//! pit.tick();
//! assert_eq!(pit.get(0).unwrap(), PitStatus::Running);
//!
//! pit.tick();
//! assert_eq!(pit.get(0).unwrap(), PitStatus::Answered);
//! assert!(pit.get(0).is_err());
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use idhal_core::config::PIT_MAX_ID;
use idhal_core::{HalError, PeripheralClass, Registry, ResourceConfig, Result, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PitUnit {
    #[default]
    Milliseconds,
}

impl PitUnit {
    /// Ticks in one count of this unit (one tick is `PIT_TICK_MS`).
    pub fn ticks(self) -> u64 {
        match self {
            Self::Milliseconds => 1,
        }
    }
}

/// Result of polling a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PitStatus {
    /// The period has not elapsed yet.
    Running,
    /// The period elapsed; the ID has been freed.
    Answered,
}

impl From<PitStatus> for Status {
    fn from(status: PitStatus) -> Self {
        match status {
            PitStatus::Running => Self::InProgress,
            PitStatus::Answered => Self::Answered,
        }
    }
}

/// A requested countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PitCountdown {
    pub counts: u32,
    pub unit: PitUnit,
}

impl PitCountdown {
    /// Ticks until the countdown is answered.
    pub fn target_ticks(&self) -> u64 {
        u64::from(self.counts) * self.unit.ticks()
    }
}

impl ResourceConfig for PitCountdown {
    const CLASS: PeripheralClass = PeripheralClass::Pit;

    fn validate(&self) -> Result<()> {
        if self.counts == 0 {
            return Err(HalError::invalid_parameter("PIT count must be greater than zero"));
        }
        Ok(())
    }

    // Timers share nothing physical.
    fn conflicts_with(&self, _other: &Self) -> bool {
        false
    }
}

/// Software timer table.
#[derive(Debug)]
pub struct PitDriver<const N: usize = PIT_MAX_ID> {
    registry: Registry<PitCountdown, u64, N>,
    halted: bool,
}

impl<const N: usize> PitDriver<N> {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            halted: false,
        }
    }

    /// Start counting `counts` units for `id`, discarding any countdown in flight.
    ///
    /// # Errors
    ///
    /// - `InvalidId` if `id >= N`
    /// - `InvalidParameter` if `counts` is zero
    pub fn set(&mut self, id: u8, counts: u32, unit: PitUnit) -> Result<()> {
        self.registry
            .init(id, PitCountdown { counts, unit }, |_| Ok(0))?;
        trace!(id, counts, ?unit, "PIT set");
        Ok(())
    }

    /// Poll a countdown without blocking.
    ///
    /// # Errors
    ///
    /// `NotConfigured` if the ID has no countdown (never set, or already answered).
    pub fn get(&mut self, id: u8) -> Result<PitStatus> {
        let slot = self.registry.get(id)?;
        if *slot.state() < slot.config().target_ticks() {
            return Ok(PitStatus::Running);
        }
        self.registry.release(id)?;
        trace!(id, "PIT answered");
        Ok(PitStatus::Answered)
    }

    /// Advance every running countdown by one tick, unless halted.
    pub fn tick(&mut self) {
        if self.halted {
            return;
        }
        for (_, slot) in self.registry.iter_mut() {
            let target = slot.config().target_ticks();
            let elapsed = slot.state_mut();
            if *elapsed < target {
                *elapsed += 1;
            }
        }
    }

    /// Stop tick advancement; elapsed counts are kept.
    pub fn halt(&mut self) {
        self.halted = true;
        debug!("PIT halted");
    }

    pub fn resume(&mut self) {
        self.halted = false;
        debug!("PIT resumed");
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Ticks counted so far by `id`.
    pub fn elapsed(&self, id: u8) -> Result<u64> {
        Ok(*self.registry.get(id)?.state())
    }

    /// IDs with a countdown in flight or not yet collected.
    pub fn active_ids(&self) -> Vec<u8> {
        self.registry.configured_ids().collect()
    }
}

impl<const N: usize> Default for PitDriver<N> {
    fn default() -> Self {
        Self::new()
    }
}
