//! Cooperative cancellation primitives
//!
//! Cancellation is advisory: a [`CancelFlag`] transitions false→true at
//! most once per run cycle, long-running loops poll it at iteration
//! boundaries (≤1 s apart), and blocking waits use [`CancelFlag::sleep`]
//! so a stop request is observed promptly.
//!
//! The orchestrator publishes whichever step is currently doing work in a
//! [`StepSlot`]; an external stop caller reads the slot and forwards
//! `stop()` without knowing which stage is active. The slot holds the only
//! state shared between the run thread and a stop caller, and it only ever
//! swaps `Arc` handles; no step is mutated from two threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Shared write-once interrupt flag.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag {
    set: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Safe to call repeatedly and from any thread.
    pub fn set(&self) {
        self.set.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::SeqCst)
    }

    /// Fail with [`Error::Interrupted`] if cancellation was requested.
    /// Called at stage and iteration boundaries.
    pub fn check(&self) -> Result<()> {
        if self.is_set() {
            Err(Error::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Sleep for `duration`, waking early if the flag is set. Polls every
    /// 100 ms. Returns `true` if the sleep was interrupted.
    pub fn sleep(&self, duration: Duration) -> bool {
        let start = Instant::now();
        loop {
            if self.is_set() {
                return true;
            }
            let remaining = duration.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                return false;
            }
            std::thread::sleep(remaining.min(Duration::from_millis(100)));
        }
    }
}

/// A unit of work that can be asked to stop.
///
/// `stop()` may be called zero or more times, concurrently with the work,
/// and must be a no-op before the work starts or after it finishes. It
/// must cause any blocking operation owned by the step to return within a
/// bounded time; it does not forcibly preempt anything.
pub trait Stoppable: Send + Sync {
    fn stop(&self);
}

/// Holder for the currently active step of a run.
///
/// Replaced by the run thread as the pipeline advances; read by stop
/// callers. Cleared between stages so a stop that lands on a stage
/// boundary only sets the run-level flag.
#[derive(Clone, Default)]
pub struct StepSlot {
    current: Arc<Mutex<Option<Arc<dyn Stoppable>>>>,
}

impl StepSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, step: Arc<dyn Stoppable>) {
        *self.current.lock().unwrap() = Some(step);
    }

    pub fn clear(&self) {
        *self.current.lock().unwrap() = None;
    }

    /// Forward a stop request to the active step, if any. The handle is
    /// cloned out of the lock first so a slow `stop()` cannot block the
    /// run thread's next `install`.
    pub fn stop_active(&self) {
        let active = self.current.lock().unwrap().clone();
        if let Some(step) = active {
            step.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct CountingStep {
        stops: AtomicU32,
    }

    impl CountingStep {
        fn new() -> Self {
            Self {
                stops: AtomicU32::new(0),
            }
        }
    }

    impl Stoppable for CountingStep {
        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_flag_starts_clear() {
        let flag = CancelFlag::new();
        assert!(!flag.is_set());
        assert!(flag.check().is_ok());
    }

    #[test]
    fn test_flag_set_is_sticky_and_visible_across_clones() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        clone.set();
        assert!(flag.is_set());
        assert!(matches!(flag.check(), Err(Error::Interrupted)));
    }

    #[test]
    fn test_sleep_returns_early_when_interrupted() {
        let flag = CancelFlag::new();
        let waker = flag.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            waker.set();
        });

        let start = Instant::now();
        let interrupted = flag.sleep(Duration::from_secs(30));
        handle.join().unwrap();

        assert!(interrupted);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_sleep_completes_when_not_interrupted() {
        let flag = CancelFlag::new();
        assert!(!flag.sleep(Duration::from_millis(20)));
    }

    #[test]
    fn test_slot_routes_stop_to_active_step() {
        let slot = StepSlot::new();
        let step = Arc::new(CountingStep::new());
        slot.install(step.clone());

        slot.stop_active();
        slot.stop_active();
        assert_eq!(step.stops.load(Ordering::SeqCst), 2);

        slot.clear();
        slot.stop_active();
        assert_eq!(step.stops.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_slot_replacement_targets_newest_step() {
        let slot = StepSlot::new();
        let first = Arc::new(CountingStep::new());
        let second = Arc::new(CountingStep::new());

        slot.install(first.clone());
        slot.install(second.clone());
        slot.stop_active();

        assert_eq!(first.stops.load(Ordering::SeqCst), 0);
        assert_eq!(second.stops.load(Ordering::SeqCst), 1);
    }
}
