//! Tick source for the software timers.
//!
//! On the board a hardware timer interrupt advances the PIT table once per
//! millisecond. Here a tokio interval task does the same on a
//! [`SharedPit`], taking the lock for exactly one `tick` each time, so the
//! main loop can `set` and `get` timers between ticks.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::{JoinError, JoinSet};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use idhal_core::config::PIT_TICK_MS;
use idhal_drivers::PitDriver;

/// PIT table shared between the tick task and the main loop.
pub type SharedPit = Arc<Mutex<PitDriver>>;

pub fn shared_pit() -> SharedPit {
    Arc::new(Mutex::new(PitDriver::new()))
}

/// Lock the PIT table for one mutation.
///
/// Poisoning is ignored: every mutation is a single driver call.
pub fn lock(pit: &SharedPit) -> MutexGuard<'_, PitDriver> {
    pit.lock().unwrap_or_else(PoisonError::into_inner)
}

/// How the tick task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskTermination {
    /// Task returned on its own.
    Success,
    /// Task was aborted (expected during shutdown).
    Cancelled,
    /// Task panicked.
    Panic,
}

/// Builder for the tick task.
#[derive(Debug, Clone)]
pub struct Ticker {
    pit: SharedPit,
    period: Duration,
}

impl Ticker {
    /// One tick every `PIT_TICK_MS`.
    pub fn new(pit: SharedPit) -> Self {
        Self {
            pit,
            period: Duration::from_millis(PIT_TICK_MS),
        }
    }

    #[must_use]
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Spawn the tick task on the current runtime.
    ///
    /// # Panics
    ///
    /// If called outside a tokio runtime.
    pub fn start(self) -> TickHandle {
        let mut tasks = JoinSet::new();
        let pit = Arc::clone(&self.pit);
        let period = self.period;
        tasks.spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            // Late ticks are replayed so the PIT stays in step with wall time.
            interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
            loop {
                interval.tick().await;
                lock(&pit).tick();
            }
        });
        debug!(period_ms = self.period.as_millis() as u64, "PIT tick source started");

        TickHandle {
            pit: self.pit,
            tasks,
        }
    }
}

/// Running tick source.
#[derive(Debug)]
pub struct TickHandle {
    pit: SharedPit,
    tasks: JoinSet<()>,
}

impl TickHandle {
    /// Freeze every countdown; elapsed ticks are kept.
    pub fn halt(&self) {
        lock(&self.pit).halt();
    }

    pub fn resume(&self) {
        lock(&self.pit).resume();
    }

    pub fn is_halted(&self) -> bool {
        lock(&self.pit).is_halted()
    }

    pub fn pit(&self) -> &SharedPit {
        &self.pit
    }

    /// Stop the tick task and report how it ended.
    pub async fn shutdown(mut self) -> TaskTermination {
        self.tasks.abort_all();

        let mut termination = TaskTermination::Cancelled;
        while let Some(result) = self.tasks.join_next().await {
            termination = classify_task_result(result);
            if termination == TaskTermination::Panic {
                warn!("PIT tick task panicked");
            }
        }
        debug!(?termination, "PIT tick source stopped");
        termination
    }
}

fn classify_task_result(result: std::result::Result<(), JoinError>) -> TaskTermination {
    match result {
        Ok(()) => TaskTermination::Success,
        Err(e) if e.is_cancelled() => TaskTermination::Cancelled,
        Err(_) => TaskTermination::Panic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idhal_drivers::{PitStatus, PitUnit};

    #[tokio::test(start_paused = true)]
    async fn test_ticks_answer_timer() {
        let pit = shared_pit();
        lock(&pit).set(0, 5, PitUnit::Milliseconds).unwrap();
        let handle = Ticker::new(Arc::clone(&pit)).start();

        time::sleep(Duration::from_millis(20)).await;
        assert_eq!(lock(&pit).get(0).unwrap(), PitStatus::Answered);

        assert_eq!(handle.shutdown().await, TaskTermination::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_halt_freezes_elapsed() {
        let pit = shared_pit();
        lock(&pit).set(3, 1_000, PitUnit::Milliseconds).unwrap();
        let handle = Ticker::new(Arc::clone(&pit)).start();

        time::sleep(Duration::from_millis(10)).await;
        handle.halt();
        assert!(handle.is_halted());
        let frozen = lock(&pit).elapsed(3).unwrap();
        assert!(frozen > 0);

        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(lock(&pit).elapsed(3).unwrap(), frozen);

        handle.resume();
        time::sleep(Duration::from_millis(10)).await;
        assert!(lock(&pit).elapsed(3).unwrap() > frozen);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_ticking() {
        let pit = shared_pit();
        let handle = Ticker::new(Arc::clone(&pit)).start();
        assert_eq!(handle.shutdown().await, TaskTermination::Cancelled);

        lock(&pit).set(0, 2, PitUnit::Milliseconds).unwrap();
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(lock(&pit).get(0).unwrap(), PitStatus::Running);
    }

    #[test]
    fn test_classify_panic() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let termination = runtime.block_on(async {
            let mut tasks: JoinSet<()> = JoinSet::new();
            tasks.spawn(async {
                panic!("tick source failure");
            });
            let result = tasks.join_next().await.unwrap();
            classify_task_result(result)
        });
        assert_eq!(termination, TaskTermination::Panic);
    }
}
