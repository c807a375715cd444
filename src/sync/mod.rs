//! Synchronization core
//!
//! Guards, the shared resources they protect, and the metrics read from
//! them.
//!
//! # Components
//!
//! - [`Guard`]: the acquire/release contract shared by every guard, with
//!   scoped helpers in [`GuardExt`].
//! - [`SlotGuard`]: in-process exclusive (one slot) and bounded (N slots)
//!   guard with FIFO hand-off.
//! - [`ProcessGuard`]: exclusive guard valid across OS processes, its
//!   accounting stored next to the lock in a shared file.
//! - [`SharedCounter`]: unguarded, exclusive and bounded counters.
//! - [`GuardedLogger`]: unguarded, exclusive, bounded and cross-process
//!   loggers over a [`LogSink`].
//! - [`ContentionMetrics`]: point-in-time [`MetricsSnapshot`]s of a guard.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use syncbench::sync::{GuardedLogger, MemorySink, SharedCounter};
//!
//! let counter = SharedCounter::exclusive();
//! let sink = Arc::new(MemorySink::new());
//! let logger = GuardedLogger::bounded(sink.clone(), 2)?;
//!
//! std::thread::scope(|s| {
//!     for worker in 0..4 {
//!         let (counter, logger) = (&counter, &logger);
//!         s.spawn(move || {
//!             counter.increment();
//!             logger.append(&format!("worker-{worker} done"))
//!         });
//!     }
//! });
//!
//! assert_eq!(counter.value(), 4);
//! let snapshot = logger.metrics().expect("guarded").snapshot()?;
//! println!("waited {:?} over {} acquisitions", snapshot.wait_total, snapshot.acquisitions);
//! # Ok::<(), syncbench::sync::SyncError>(())
//! ```

pub mod counter;
pub mod error;
pub mod guard;
pub mod logger;
pub mod metrics;
pub mod process;
pub mod slots;


pub use counter::{DEFAULT_RACE_WINDOW, SharedCounter};
pub use error::SyncError;
pub use guard::{Guard, GuardExt, GuardKind, GuardStats, Held, Ticket};
pub use logger::{FileSink, GuardedLogger, LogAudit, LogSink, MemorySink};
pub use metrics::{ContentionMetrics, MetricsSnapshot};
pub use process::ProcessGuard;
pub use slots::SlotGuard;
