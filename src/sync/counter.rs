//! Shared counters: the race-condition demonstration and its fix
//!
//! Every variant increments with the same read, pause, write sequence.
//! Only the guard around it differs:
//!
//! - `Unguarded`: nothing stops two workers from reading the same value and
//!   both writing `value + 1`, so increments get lost under concurrency.
//! - `Exclusive`: the sequence runs under a one-slot guard and is exact.
//! - `Bounded(n)`: the sequence runs under an n-slot guard. With `n > 1` up to
//!   n read-modify-writes overlap, so updates are still lost. A semaphore
//!   limits concurrency, it does not provide mutual exclusion.
//!
//! The value is an atomic read and written with separate relaxed operations,
//! which keeps the race a logical one (lost updates) rather than undefined
//! behaviour.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use super::error::SyncError;
use super::guard::Guard;
use super::metrics::ContentionMetrics;
use super::slots::SlotGuard;

/// Default pause between read and write, matching a short unit of work.
pub const DEFAULT_RACE_WINDOW: Duration = Duration::from_micros(100);

#[derive(Debug)]
enum CounterGuard {
    Unguarded,
    Slots(Arc<SlotGuard>),
}

/// An integer shared by all workers of an experiment.
#[derive(Debug)]
pub struct SharedCounter {
    value: AtomicU64,
    calls: AtomicU64,
    window: Duration,
    guard: CounterGuard,
}

impl SharedCounter {
    /// Race-prone counter with no guard.
    pub fn unguarded(window: Duration) -> Self {
        Self::build(CounterGuard::Unguarded, window)
    }

    /// Counter guarded by mutual exclusion. Final value always equals calls.
    pub fn exclusive() -> Self {
        Self::with_guard(Arc::new(SlotGuard::exclusive()), DEFAULT_RACE_WINDOW)
    }

    /// Counter guarded by a counting semaphore with `permits` slots.
    pub fn bounded(permits: usize, window: Duration) -> Result<Self, SyncError> {
        Ok(Self::with_guard(Arc::new(SlotGuard::bounded(permits)?), window))
    }

    /// Counter behind a caller-supplied guard.
    pub fn with_guard(guard: Arc<SlotGuard>, window: Duration) -> Self {
        Self::build(CounterGuard::Slots(guard), window)
    }

    fn build(guard: CounterGuard, window: Duration) -> Self {
        Self {
            value: AtomicU64::new(0),
            calls: AtomicU64::new(0),
            window,
            guard,
        }
    }

    /// Add one.
    pub fn increment(&self) {
        match &self.guard {
            CounterGuard::Unguarded => self.read_modify_write(),
            CounterGuard::Slots(guard) => guard.with_slot(|| self.read_modify_write()),
        }
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    fn read_modify_write(&self) {
        let current = self.value.load(Ordering::Relaxed);
        if self.window.is_zero() {
            thread::yield_now();
        } else {
            thread::sleep(self.window);
        }
        self.value.store(current + 1, Ordering::Relaxed);
    }

    /// Current value. Only meaningful once all writers have finished.
    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Number of completed `increment` calls.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Increments that vanished because of overlapping read-modify-writes.
    pub fn lost_updates(&self) -> u64 {
        self.calls().saturating_sub(self.value())
    }

    /// True when every increment is serialized by construction.
    pub fn is_exact(&self) -> bool {
        matches!(&self.guard, CounterGuard::Slots(guard) if guard.capacity() == 1)
    }

    /// Contention metrics for the counter's guard, if it has one.
    pub fn metrics(&self) -> Option<ContentionMetrics> {
        match &self.guard {
            CounterGuard::Unguarded => None,
            CounterGuard::Slots(guard) => Some(ContentionMetrics::new(guard.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hammer(counter: &SharedCounter, workers: usize, total: usize) {
        thread::scope(|s| {
            for worker in 0..workers {
                // Spread `total` increments over the workers.
                let share = total / workers + usize::from(worker < total % workers);
                s.spawn(move || {
                    for _ in 0..share {
                        counter.increment();
                    }
                });
            }
        });
    }

    #[test]
    fn test_exclusive_counter_is_exact_for_all_degrees() {
        for total in [1usize, 10, 1000] {
            for workers in [1usize, 2, 8, 64] {
                let counter = SharedCounter::with_guard(
                    Arc::new(SlotGuard::exclusive()),
                    Duration::ZERO,
                );
                hammer(&counter, workers, total);
                assert_eq!(counter.value(), total as u64, "total={total} workers={workers}");
                assert_eq!(counter.calls(), total as u64);
                assert_eq!(counter.lost_updates(), 0);
            }
        }
    }

    #[test]
    fn test_unguarded_counter_loses_updates() {
        // Statistical: one run out of several must lose an update.
        let lost_somewhere = (0..5).any(|_| {
            let counter = SharedCounter::unguarded(Duration::from_micros(50));
            hammer(&counter, 8, 400);
            assert_eq!(counter.calls(), 400);
            counter.value() < 400
        });
        assert!(lost_somewhere, "expected at least one run with lost updates");
    }

    #[test]
    fn test_single_worker_unguarded_is_exact() {
        let counter = SharedCounter::unguarded(Duration::ZERO);
        hammer(&counter, 1, 100);
        assert_eq!(counter.value(), 100);
    }

    #[test]
    fn test_bounded_of_one_is_exact() {
        let counter = SharedCounter::bounded(1, Duration::from_micros(20)).unwrap();
        assert!(counter.is_exact());
        hammer(&counter, 8, 200);
        assert_eq!(counter.value(), 200);
    }

    #[test]
    fn test_bounded_rejects_zero_permits() {
        assert!(SharedCounter::bounded(0, Duration::ZERO).is_err());
    }

    #[test]
    fn test_guarded_counter_reports_metrics() {
        let counter = SharedCounter::exclusive();
        hammer(&counter, 4, 40);

        let snapshot = counter.metrics().unwrap().snapshot().unwrap();
        assert_eq!(snapshot.acquisitions, 40);
        assert!(snapshot.contended <= 40);
        assert!(SharedCounter::unguarded(Duration::ZERO).metrics().is_none());
    }
}
