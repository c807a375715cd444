//! Configuration management for syncbench
//!
//! Settings are layered with figment (see [`BenchConfig::load`]) and
//! extracted into the typed [`BenchConfig`].

pub mod core;
pub mod overrides;

#[cfg(test)]
mod tests;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::sync::SyncError;
use crate::workload::{self, WorkItem};

pub use overrides::{ConfigOverrides, ExperimentOverrides, WorkloadOverrides};

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchConfig {
    pub workload: WorkloadConfig,
    pub experiment: ExperimentConfig,
    pub results: ResultsConfig,
    pub demo: DemoConfig,
}

/// Where work items come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum WorkSource {
    Synthetic,
    Directory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadConfig {
    pub source: WorkSource,
    pub input_dir: PathBuf,
    /// Number of synthetic frames
    pub count: usize,
    pub width: u32,
    pub height: u32,
    pub seed: u64,
    /// Write grayscale frames here when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub threads: usize,
    /// 0 = one per CPU core
    pub processes: usize,
    pub pool_workers: usize,
    pub permits: usize,
    pub race_window_us: u64,
    #[serde(default)]
    pub only: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsConfig {
    pub dir: PathBuf,
    pub write: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoConfig {
    pub workers: usize,
    pub iterations: usize,
}

impl BenchConfig {
    /// Reject settings no experiment can run with.
    pub fn validate(&self) -> Result<(), SyncError> {
        let positive = [
            ("experiment.threads", self.experiment.threads),
            ("experiment.pool_workers", self.experiment.pool_workers),
            ("experiment.permits", self.experiment.permits),
            ("demo.workers", self.demo.workers),
            ("demo.iterations", self.demo.iterations),
        ];
        for (key, value) in positive {
            if value < 1 {
                return Err(SyncError::InvalidConfig(format!("{key} must be at least 1")));
            }
        }

        if self.workload.source == WorkSource::Synthetic {
            if self.workload.count < 1 {
                return Err(SyncError::InvalidConfig(
                    "workload.count must be at least 1".to_string(),
                ));
            }
            if self.workload.width < 1 || self.workload.height < 1 {
                return Err(SyncError::InvalidConfig(format!(
                    "workload frame size {}x{} is empty",
                    self.workload.width, self.workload.height
                )));
            }
        }
        Ok(())
    }

    /// Child process count, resolving 0 to the number of CPU cores.
    pub fn process_count(&self) -> usize {
        match self.experiment.processes {
            0 => num_cpus::get(),
            n => n,
        }
    }

    pub fn race_window(&self) -> Duration {
        Duration::from_micros(self.experiment.race_window_us)
    }

    /// Build the work items described by the workload section.
    pub fn load_items(&self) -> Result<Vec<WorkItem>> {
        let w = &self.workload;
        match w.source {
            WorkSource::Synthetic => Ok(workload::synthetic(w.count, w.width, w.height, w.seed)),
            WorkSource::Directory => workload::scan_directory(&w.input_dir),
        }
    }
}
