//! In-process exclusive and bounded guards
//!
//! Both are the same machine: `capacity` slots behind one state mutex.
//! A claimer takes a free slot immediately when nobody is queued. Otherwise
//! it queues behind earlier waiters and parks on its own condition variable.
//! A release with waiters queued hands the slot straight to the oldest
//! waiter and wakes only that waiter, so service is FIFO and no waiter can
//! be overtaken indefinitely.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use super::error::SyncError;
use super::guard::{Guard, GuardKind, GuardStats, Ticket};

#[derive(Debug)]
struct Waiter {
    ticket: Ticket,
    wake: Arc<Condvar>,
}

#[derive(Debug, Default)]
struct SlotState {
    /// Held tickets and when each hold started.
    held: HashMap<Ticket, Instant>,
    queue: VecDeque<Waiter>,
    stats: GuardStats,
}

/// Exclusive (one slot) or bounded (N slots) in-process guard.
#[derive(Debug)]
pub struct SlotGuard {
    kind: GuardKind,
    capacity: usize,
    next_ticket: AtomicU64,
    state: Mutex<SlotState>,
}

impl SlotGuard {
    /// Mutual exclusion: at most one holder.
    pub fn exclusive() -> Self {
        Self::with_capacity(GuardKind::Exclusive, 1)
    }

    /// Counting semaphore: at most `permits` holders.
    pub fn bounded(permits: usize) -> Result<Self, SyncError> {
        if permits < 1 {
            return Err(SyncError::InvalidConfig(format!(
                "bounded guard needs at least 1 permit, got {permits}"
            )));
        }
        Ok(Self::with_capacity(GuardKind::Bounded, permits))
    }

    fn with_capacity(kind: GuardKind, capacity: usize) -> Self {
        Self {
            kind,
            capacity,
            next_ticket: AtomicU64::new(1),
            state: Mutex::new(SlotState::default()),
        }
    }

    // No user code ever runs under the state mutex, so a poisoned lock
    // still guards consistent state.
    fn lock_state(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim a slot, blocking until one is granted. Never fails.
    pub fn claim(&self) -> Ticket {
        let ticket = Ticket(self.next_ticket.fetch_add(1, Ordering::Relaxed));
        let mut state = self.lock_state();

        if state.queue.is_empty() && state.held.len() < self.capacity {
            state.held.insert(ticket, Instant::now());
            state.stats.record_occupied();
            state.stats.record_grant(None);
            tracing::trace!("{} guard: {} claimed immediately", self.kind, ticket);
            return ticket;
        }

        let started = Instant::now();
        let wake = Arc::new(Condvar::new());
        state.queue.push_back(Waiter {
            ticket,
            wake: Arc::clone(&wake),
        });
        tracing::trace!(
            "{} guard: {} queued behind {} waiter(s)",
            self.kind,
            ticket,
            state.queue.len() - 1
        );

        // The releaser inserts our ticket into `held` before waking us;
        // anything else is a spurious wakeup.
        while !state.held.contains_key(&ticket) {
            state = wake.wait(state).unwrap_or_else(PoisonError::into_inner);
        }

        let waited = started.elapsed();
        state.stats.record_grant(Some(waited));
        tracing::trace!("{} guard: {} granted after {:?}", self.kind, ticket, waited);
        ticket
    }

    /// Free `ticket`'s slot. Returns `false` if it was not held.
    fn vacate(&self, ticket: Ticket) -> bool {
        let mut state = self.lock_state();
        let Some(since) = state.held.remove(&ticket) else {
            return false;
        };
        let now = Instant::now();

        match state.queue.pop_front() {
            Some(next) => {
                // Occupancy is unchanged, the slot moves to `next`.
                state.stats.record_handoff(now.duration_since(since));
                state.held.insert(next.ticket, now);
                next.wake.notify_one();
            }
            None => state.stats.record_vacated(now.duration_since(since)),
        }
        true
    }

    /// Run `work` under a slot. The slot is freed on every exit path.
    pub fn with_slot<R>(&self, work: impl FnOnce() -> R) -> R {
        struct Vacate<'a> {
            guard: &'a SlotGuard,
            ticket: Ticket,
        }
        impl Drop for Vacate<'_> {
            fn drop(&mut self) {
                self.guard.vacate(self.ticket);
            }
        }

        let _slot = Vacate {
            guard: self,
            ticket: self.claim(),
        };
        work()
    }

    /// Slots held right now.
    pub fn holders(&self) -> usize {
        self.lock_state().held.len()
    }

    /// Claimers currently blocked.
    pub fn waiting(&self) -> usize {
        self.lock_state().queue.len()
    }

    pub fn snapshot(&self) -> GuardStats {
        self.lock_state().stats
    }
}

impl Guard for SlotGuard {
    fn kind(&self) -> GuardKind {
        self.kind
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn acquire(&self) -> Result<Ticket, SyncError> {
        Ok(self.claim())
    }

    fn release(&self, ticket: Ticket) -> Result<(), SyncError> {
        if self.vacate(ticket) {
            Ok(())
        } else {
            Err(SyncError::not_held(ticket))
        }
    }

    fn stats(&self) -> Result<GuardStats, SyncError> {
        Ok(self.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::guard::GuardExt;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_bounded_rejects_zero_permits() {
        let err = SlotGuard::bounded(0).unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfig(_)));
        assert!(err.is_programming_error());
    }

    #[test]
    fn test_uncontended_acquire_release() {
        let guard = SlotGuard::exclusive();
        let ticket = guard.acquire().unwrap();
        assert_eq!(guard.holders(), 1);
        guard.release(ticket).unwrap();

        let stats = guard.snapshot();
        assert_eq!(stats.acquisitions, 1);
        assert_eq!(stats.contended, 0);
        assert_eq!(stats.wait_ns, 0);
        assert_eq!(stats.holders, 0);
    }

    #[test]
    fn test_double_release_is_rejected() {
        let guard = SlotGuard::exclusive();
        let ticket = guard.acquire().unwrap();
        guard.release(ticket).unwrap();

        let err = guard.release(ticket).unwrap_err();
        assert!(matches!(err, SyncError::InvalidState { .. }));
    }

    #[test]
    fn test_foreign_ticket_does_not_free_holder() {
        let guard = SlotGuard::bounded(2).unwrap();
        let mine = guard.acquire().unwrap();

        assert!(guard.release(Ticket(mine.id() + 100)).is_err());
        assert_eq!(guard.holders(), 1);
        guard.release(mine).unwrap();
    }

    #[test]
    fn test_release_hands_slot_to_waiter() {
        let guard = Arc::new(SlotGuard::exclusive());
        let first = guard.acquire().unwrap();

        let waiter = {
            let guard = Arc::clone(&guard);
            thread::spawn(move || {
                let ticket = guard.acquire().unwrap();
                guard.release(ticket).unwrap();
            })
        };

        while guard.waiting() == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        thread::sleep(Duration::from_millis(10));
        guard.release(first).unwrap();
        waiter.join().unwrap();

        let stats = guard.snapshot();
        assert_eq!(stats.acquisitions, 2);
        assert_eq!(stats.contended, 1);
        assert!(stats.wait_ns >= 10_000_000);
        assert_eq!(stats.peak_holders, 1);
        assert_eq!(stats.holders, 0);
    }

    #[test]
    fn test_waiters_are_served_in_arrival_order() {
        let guard = Arc::new(SlotGuard::exclusive());
        let order = Arc::new(Mutex::new(Vec::new()));
        let first = guard.acquire().unwrap();

        let mut handles = Vec::new();
        for id in 0..4 {
            let worker_guard = Arc::clone(&guard);
            let order = Arc::clone(&order);
            handles.push(thread::spawn(move || {
                worker_guard
                    .scoped(|| order.lock().unwrap().push(id))
                    .unwrap();
            }));
            // Queue them one at a time so arrival order is known.
            while guard.waiting() < id + 1 {
                thread::sleep(Duration::from_millis(1));
            }
        }

        guard.release(first).unwrap();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_bounded_never_exceeds_permits() {
        let guard = Arc::new(SlotGuard::bounded(3).unwrap());
        let live = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let guard = Arc::clone(&guard);
                let live = Arc::clone(&live);
                let max_seen = Arc::clone(&max_seen);
                thread::spawn(move || {
                    for _ in 0..20 {
                        guard.with_slot(|| {
                            let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                            max_seen.fetch_max(now, Ordering::SeqCst);
                            thread::yield_now();
                            live.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(max_seen.load(Ordering::SeqCst) <= 3);
        let stats = guard.snapshot();
        assert_eq!(stats.acquisitions, 16 * 20);
        assert!(stats.peak_holders <= 3);
        assert_eq!(stats.holders, 0);
    }

    #[test]
    fn test_with_slot_releases_on_panic() {
        let guard = Arc::new(SlotGuard::exclusive());
        let result = {
            let guard = Arc::clone(&guard);
            thread::spawn(move || guard.with_slot(|| panic!("work failed"))).join()
        };
        assert!(result.is_err());
        assert_eq!(guard.holders(), 0);

        // Still usable afterwards.
        guard.with_slot(|| ());
        assert_eq!(guard.snapshot().acquisitions, 2);
    }
}
