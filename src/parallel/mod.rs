//! Execution strategies compared by the experiments
//!
//! This module only decides *how* work items are distributed. It knows
//! nothing about guards, counters or images:
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────────┐    ┌─────────────────┐
//! │   Experiment    │    │   Parallel       │    │   System        │
//! │   runner        │───▶│   module         │───▶│   resources     │
//! │                 │    │                  │    │                 │
//! │ • Guard policy  │    │ • Worker threads │    │ • CPU cores     │
//! │ • Shared state  │    │ • Channels       │    │ • OS threads    │
//! │ • Reports       │    │ • Thread pool    │    │                 │
//! └─────────────────┘    └──────────────────┘    └─────────────────┘
//! ```
//!
//! - [`ExecutionStrategy::Sequential`]: one item after another on the
//!   calling thread.
//! - [`ExecutionStrategy::Threads`]: dedicated scoped threads fed through a
//!   bounded crossbeam channel.
//! - [`ExecutionStrategy::Pool`]: a rayon thread pool sized to the worker
//!   count.
//!
//! Process-based execution is driven by the experiment runner, since it
//! spawns whole programs rather than closures.
//!
//! # Example Usage
//!
//! ```rust
//! use syncbench::parallel::ExecutionStrategy;
//!
//! let strategy = ExecutionStrategy::Threads { workers: 4 };
//! let squares = strategy
//!     .execute((1..=8).collect(), |x: u32, _worker_id| x * x, None::<fn(usize, usize, usize)>)
//!     .unwrap();
//! assert_eq!(squares[7], 64);
//! ```

pub mod core;

pub use self::core::{ExecutionStrategy, ParallelExecutor, PoolExecutor, SequentialExecutor};
