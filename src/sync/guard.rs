//! The common guard interface
//!
//! A guard hands out *slots*. An exclusive guard has one slot, a bounded
//! guard has N. Every successful `acquire` returns a [`Ticket`] naming the
//! holder; `release` takes the ticket back and refuses tickets it does not
//! currently hold.
//!
//! Callers should prefer [`GuardExt::hold`], [`GuardExt::scoped`] and
//! [`GuardExt::scoped_try`], which release on every exit path including
//! panics unwinding through the work.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::error::SyncError;

/// Identity of one logical holder of a guard slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(pub(crate) u64);

impl Ticket {
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which admission policy a guard implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardKind {
    /// At most one holder, in-process.
    Exclusive,
    /// At most N holders, in-process.
    Bounded,
    /// At most one holder across OS processes.
    CrossProcess,
}

impl fmt::Display for GuardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GuardKind::Exclusive => "exclusive",
            GuardKind::Bounded => "bounded",
            GuardKind::CrossProcess => "cross-process",
        };
        f.write_str(name)
    }
}

/// Raw accounting kept by every guard.
///
/// Durations are stored as nanoseconds so the record has the same shape
/// in process memory and in the cross-process stats record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuardStats {
    /// Slots held right now.
    pub holders: u64,
    /// Highest number of simultaneously held slots ever observed.
    pub peak_holders: u64,
    /// Successful acquisitions, waited or not.
    pub acquisitions: u64,
    /// Acquisitions that had to block.
    pub contended: u64,
    pub wait_ns: u64,
    pub max_wait_ns: u64,
    /// Time slots spent held, summed over completed holds.
    pub hold_ns: u64,
}

impl GuardStats {
    /// Account for one granted slot.
    pub(crate) fn record_grant(&mut self, waited: Option<Duration>) {
        self.acquisitions += 1;
        if let Some(waited) = waited {
            let ns = saturating_nanos(waited);
            self.contended += 1;
            self.wait_ns = self.wait_ns.saturating_add(ns);
            self.max_wait_ns = self.max_wait_ns.max(ns);
        }
    }

    /// Account for a slot becoming occupied (fresh claim, not a hand-off).
    pub(crate) fn record_occupied(&mut self) {
        self.holders += 1;
        self.peak_holders = self.peak_holders.max(self.holders);
    }

    /// Account for a slot passed directly from one holder to the next.
    pub(crate) fn record_handoff(&mut self, held: Duration) {
        self.hold_ns = self.hold_ns.saturating_add(saturating_nanos(held));
    }

    /// Account for a slot being vacated after `held` time.
    pub(crate) fn record_vacated(&mut self, held: Duration) {
        self.holders = self.holders.saturating_sub(1);
        self.hold_ns = self.hold_ns.saturating_add(saturating_nanos(held));
    }
}

pub(crate) fn saturating_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// A concurrency guard over some shared resource.
///
/// Implementations must block (never spin) while no slot is free, must not
/// starve waiters, and must account every acquisition in [`GuardStats`].
pub trait Guard: Send + Sync + fmt::Debug {
    fn kind(&self) -> GuardKind;

    /// Maximum number of simultaneous holders.
    fn capacity(&self) -> usize;

    /// Claim a slot, blocking until one is free.
    fn acquire(&self) -> Result<Ticket, SyncError>;

    /// Free the slot held under `ticket`.
    ///
    /// Fails with [`SyncError::InvalidState`] if `ticket` does not hold a
    /// slot of this guard; no other holder is affected.
    fn release(&self, ticket: Ticket) -> Result<(), SyncError>;

    /// Point-in-time copy of the guard's accounting.
    fn stats(&self) -> Result<GuardStats, SyncError>;
}

/// A held slot, released when dropped.
#[must_use = "dropping a Held releases the slot immediately"]
pub struct Held<'a, G: Guard + ?Sized> {
    guard: &'a G,
    ticket: Ticket,
    armed: bool,
}

impl<'a, G: Guard + ?Sized> Held<'a, G> {
    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    /// Release now and surface any error instead of logging it on drop.
    pub fn release(mut self) -> Result<(), SyncError> {
        self.armed = false;
        self.guard.release(self.ticket)
    }
}

impl<G: Guard + ?Sized> Drop for Held<'_, G> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = self.guard.release(self.ticket) {
            tracing::error!(
                "Failed to release {} guard slot {}: {}",
                self.guard.kind(),
                self.ticket,
                e
            );
        }
    }
}

impl<G: Guard + ?Sized> fmt::Debug for Held<'_, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Held")
            .field("kind", &self.guard.kind())
            .field("ticket", &self.ticket)
            .field("armed", &self.armed)
            .finish()
    }
}

/// Scoped acquisition helpers, available on every guard.
pub trait GuardExt: Guard {
    /// Acquire a slot wrapped in an RAII [`Held`].
    fn hold(&self) -> Result<Held<'_, Self>, SyncError> {
        let ticket = self.acquire()?;
        Ok(Held {
            guard: self,
            ticket,
            armed: true,
        })
    }

    /// Run `work` while holding a slot.
    fn scoped<R>(&self, work: impl FnOnce() -> R) -> Result<R, SyncError> {
        let held = self.hold()?;
        let out = work();
        held.release()?;
        Ok(out)
    }

    /// Run fallible `work` while holding a slot. The slot is released
    /// before the work's error is returned.
    fn scoped_try<R, E>(&self, work: impl FnOnce() -> Result<R, E>) -> Result<R, E>
    where
        E: From<SyncError>,
    {
        let held = self.hold()?;
        let out = work();
        held.release()?;
        out
    }
}

impl<G: Guard + ?Sized> GuardExt for G {}
