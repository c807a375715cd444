//! Contention metrics collection
//!
//! [`ContentionMetrics`] wraps any guard and turns its raw [`GuardStats`]
//! into a [`MetricsSnapshot`]. The snapshot is copied out under the guard's
//! own state lock (or the shared lock for a cross-process guard), so the
//! counters in one snapshot always belong to the same instant.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::error::SyncError;
use super::guard::{Guard, GuardKind, GuardStats};

/// Reads point-in-time contention figures from a guard.
#[derive(Clone)]
pub struct ContentionMetrics {
    guard: Arc<dyn Guard>,
}

impl ContentionMetrics {
    pub fn new(guard: Arc<dyn Guard>) -> Self {
        Self { guard }
    }

    pub fn guard(&self) -> &Arc<dyn Guard> {
        &self.guard
    }

    /// Current accounting of the wrapped guard.
    ///
    /// Only fails when the guard keeps its state in shared storage that
    /// cannot be read.
    pub fn snapshot(&self) -> Result<MetricsSnapshot, SyncError> {
        let stats = self.guard.stats()?;
        Ok(MetricsSnapshot::from_stats(
            self.guard.kind(),
            self.guard.capacity(),
            &stats,
        ))
    }
}

impl fmt::Debug for ContentionMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentionMetrics")
            .field("kind", &self.guard.kind())
            .field("capacity", &self.guard.capacity())
            .finish()
    }
}

/// Immutable contention figures for one guard.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub kind: GuardKind,
    pub capacity: usize,
    pub acquisitions: u64,
    pub contended: u64,
    #[serde(with = "seconds")]
    pub wait_total: Duration,
    #[serde(with = "seconds")]
    pub max_wait: Duration,
    #[serde(with = "seconds")]
    pub hold_total: Duration,
    pub peak_holders: u64,
}

impl MetricsSnapshot {
    pub fn from_stats(kind: GuardKind, capacity: usize, stats: &GuardStats) -> Self {
        Self {
            kind,
            capacity,
            acquisitions: stats.acquisitions,
            contended: stats.contended,
            wait_total: Duration::from_nanos(stats.wait_ns),
            max_wait: Duration::from_nanos(stats.max_wait_ns),
            hold_total: Duration::from_nanos(stats.hold_ns),
            peak_holders: stats.peak_holders,
        }
    }

    /// Share of the experiment window spent waiting for the guard.
    ///
    /// Wait time is summed over all workers, so with many workers the ratio
    /// can exceed 1.0. A zero window yields 0.0.
    pub fn contention_ratio(&self, elapsed: Duration) -> f64 {
        if elapsed.is_zero() {
            return 0.0;
        }
        self.wait_total.as_secs_f64() / elapsed.as_secs_f64()
    }

    /// Mean wait of the acquisitions that had to wait.
    pub fn avg_wait(&self) -> Duration {
        match self.contended {
            0 => Duration::ZERO,
            n => Duration::from_nanos(
                u64::try_from(self.wait_total.as_nanos() / u128::from(n)).unwrap_or(u64::MAX),
            ),
        }
    }

    /// Fraction of acquisitions that had to wait.
    pub fn contended_fraction(&self) -> f64 {
        if self.acquisitions == 0 {
            0.0
        } else {
            self.contended as f64 / self.acquisitions as f64
        }
    }
}

/// Durations as fractional seconds in serialized output.
pub(crate) mod seconds {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}
