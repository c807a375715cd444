//! The unit of work performed by every experiment worker
//!
//! A [`WorkItem`] names one frame to convert to grayscale. Frames come either
//! from a deterministic generator or from files found in an input
//! directory. The conversion always runs outside any guard; workers touch
//! the shared counter and logger only after it finishes.

pub mod convert;
pub mod source;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::sync::metrics::seconds;

pub use convert::convert_to_grayscale;
pub use source::{IMAGE_EXTENSIONS, scan_directory, synthetic};

/// Where a work item's pixels come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemSource {
    /// Generated RGB frame, reproducible from its seed.
    Synthetic { width: u32, height: u32, seed: u64 },
    /// A file whose bytes are read as packed RGB pixels.
    File(PathBuf),
}

/// One frame to convert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub name: String,
    pub source: ItemSource,
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Result of converting one work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub name: String,
    /// Index of the worker (thread or process) that handled the item.
    pub worker: usize,
    pub success: bool,
    pub error: Option<String>,
    /// Time spent in the work function.
    #[serde(with = "seconds")]
    pub elapsed: Duration,
    /// FNV-1a of the grayscale pixels; identical across strategies.
    pub checksum: u64,
    pub pixels: u64,
}

impl ItemOutcome {
    /// The line a worker appends to the shared log for this outcome.
    pub fn log_line(&self) -> String {
        match &self.error {
            None => format!(
                "worker-{} converted {} ({} px, checksum {:016x})",
                self.worker, self.name, self.pixels, self.checksum
            ),
            Some(error) => format!("worker-{} failed {}: {}", self.worker, self.name, error),
        }
    }
}
