//! Process-wide cooperative throttle.
//!
//! One [`Backoff`] is shared by every runner thread. A temporary failure
//! freezes all of them for the current interval; the interval doubles on each
//! consecutive failure up to a ceiling and returns to the base on success.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

/// The wait was cut short by [`Backoff::interrupt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

#[derive(Debug)]
struct BackoffState {
    interval: Duration,
    /// Threads currently sleeping off a failure
    freezers: usize,
    interrupted: bool,
}

/// Shared backoff state: one mutex and one condition variable.
#[derive(Debug)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    state: Mutex<BackoffState>,
    thawed: Condvar,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let max = max.max(base);
        Self {
            base,
            max,
            state: Mutex::new(BackoffState {
                interval: base,
                freezers: 0,
                interrupted: false,
            }),
            thawed: Condvar::new(),
        }
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Interval the next failure will sleep for.
    pub fn current_interval(&self) -> Duration {
        self.state.lock().interval
    }

    pub fn is_frozen(&self) -> bool {
        self.state.lock().freezers > 0
    }

    pub fn is_interrupted(&self) -> bool {
        self.state.lock().interrupted
    }

    /// Block while frozen.
    ///
    /// Returns immediately when not frozen, even after an interrupt.
    pub fn wait_while_frozen(&self) -> Result<(), Interrupted> {
        let mut state = self.state.lock();
        while state.freezers > 0 {
            if state.interrupted {
                return Err(Interrupted);
            }
            self.thawed.wait(&mut state);
        }
        Ok(())
    }

    /// Return the interval to the base after a success.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        if state.interval != self.base {
            debug!(
                previous_ms = state.interval.as_millis() as u64,
                "Backoff interval reset"
            );
            state.interval = self.base;
        }
    }

    /// Freeze, run `on_frozen`, sleep for the current interval, double it,
    /// then thaw and wake every waiting thread.
    ///
    /// `on_frozen` runs with the freeze in place but without the lock held;
    /// the runner uses it to resubmit the replacement task.
    pub fn engage<F: FnOnce()>(&self, on_frozen: F) -> Result<(), Interrupted> {
        let interval = {
            let mut state = self.state.lock();
            state.freezers += 1;
            let interval = state.interval;
            state.interval = (interval * 2).min(self.max);
            interval
        };
        warn!(interval_ms = interval.as_millis() as u64, "Backoff engaged, freezing runners");

        on_frozen();

        let deadline = Instant::now() + interval;
        let mut state = self.state.lock();
        while !state.interrupted {
            if self.thawed.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        let result = if state.interrupted {
            Err(Interrupted)
        } else {
            Ok(())
        };

        state.freezers -= 1;
        let frozen = state.freezers > 0;
        drop(state);
        self.thawed.notify_all();

        if !frozen {
            info!("Backoff released, runners resumed");
        }
        result
    }

    /// Wake every waiting or sleeping thread and make frozen waits fail.
    pub fn interrupt(&self) {
        self.state.lock().interrupted = true;
        self.thawed.notify_all();
        debug!("Backoff interrupted");
    }
}
