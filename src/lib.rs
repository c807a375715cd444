//! # syncbench - what locks cost, and what they protect
//!
//! syncbench runs one workload (grayscale conversion of synthetic or on-disk
//! frames) under several execution strategies and guard policies, and
//! measures both sides of synchronization:
//!
//! - **Integrity**: every worker appends to a shared log and bumps a shared
//!   counter. Unguarded runs lose updates and garble lines; guarded runs
//!   must not.
//! - **Cost**: every guard records acquisitions, contended acquisitions and
//!   wait time, reported as a [`sync::MetricsSnapshot`] and a contention
//!   ratio.
//!
//! ## Quick Start
//!
//! ```bash
//! # Race demonstrations on a counter and three loggers
//! syncbench demo
//!
//! # Full experiment plan, results written to ./results
//! syncbench run --threads 8 --processes 4
//!
//! # Only some experiments, no files written
//! syncbench run --only sequential,threads-exclusive --no-write
//! ```
//!
//! ## Library use
//!
//! The guards are usable on their own:
//!
//! ```
//! use std::sync::Arc;
//! use syncbench::sync::{ContentionMetrics, GuardExt, SlotGuard};
//!
//! let guard = Arc::new(SlotGuard::bounded(2)?);
//! let answer = guard.scoped(|| 6 * 7)?;
//! assert_eq!(answer, 42);
//!
//! let snapshot = ContentionMetrics::new(guard).snapshot()?;
//! assert_eq!(snapshot.acquisitions, 1);
//! # Ok::<(), syncbench::sync::SyncError>(())
//! ```

pub mod cli;
pub mod config;
pub mod experiment;
pub mod parallel;
pub mod sync;
pub mod workload;

pub use cli::{Cli, Output};
pub use config::BenchConfig;

/// Result type alias for syncbench operations
pub type Result<T> = anyhow::Result<T>;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
