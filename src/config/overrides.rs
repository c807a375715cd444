//! Command-line overrides, layered over every other config source
//!
//! Unset fields are skipped when serialized so they never mask a value from
//! a lower layer.

use serde::Serialize;
use std::path::PathBuf;

use super::WorkSource;

#[derive(Debug, Default, Clone, Serialize)]
pub struct ConfigOverrides {
    pub workload: WorkloadOverrides,
    pub experiment: ExperimentOverrides,
    #[serde(skip_serializing_if = "Option::is_none", rename = "results")]
    pub results_dir: Option<ResultsDir>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct WorkloadOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<WorkSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ExperimentOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool_workers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permits: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub only: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultsDir {
    pub dir: PathBuf,
}

impl ConfigOverrides {
    /// Point the results section at `dir`.
    pub fn results_in(mut self, dir: Option<PathBuf>) -> Self {
        self.results_dir = dir.map(|dir| ResultsDir { dir });
        self
    }
}
