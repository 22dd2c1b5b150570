//! Simulated millisecond clock.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::traits::Clock;

/// Clock that advances by a fixed step each time it is read.
///
/// Busy-wait loops measured on it terminate without real time passing.
/// Clones share the same time.
///
/// # Examples
///
/// ```
/// use idhal_drivers::mock::SimClock;
/// use idhal_drivers::traits::Clock;
///
/// let clock = SimClock::with_step(0);
/// clock.advance(25);
/// assert_eq!(clock.now_ms(), 25);
/// ```
#[derive(Debug, Clone)]
pub struct SimClock {
    now: Arc<AtomicU64>,
    step: u64,
}

impl SimClock {
    /// One millisecond per read.
    pub fn new() -> Self {
        Self::with_step(1)
    }

    pub fn with_step(step: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(0)),
            step,
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimClock {
    fn now_ms(&self) -> u64 {
        self.now.fetch_add(self.step, Ordering::SeqCst)
    }
}
