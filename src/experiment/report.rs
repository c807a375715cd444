//! Experiment reports and results export

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{ExperimentSpec, GuardPolicy};
use crate::sync::metrics::seconds;
use crate::sync::{LogAudit, MetricsSnapshot, SharedCounter};
use crate::workload::ItemOutcome;

/// Final state of an experiment's shared counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterReport {
    /// Increments performed.
    pub expected: u64,
    /// Value read after all workers joined.
    pub observed: u64,
    pub lost: u64,
}

impl From<&SharedCounter> for CounterReport {
    fn from(counter: &SharedCounter) -> Self {
        Self {
            expected: counter.calls(),
            observed: counter.value(),
            lost: counter.lost_updates(),
        }
    }
}

/// Everything measured for one experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub name: String,
    pub mode: String,
    pub workers: usize,
    pub policy: GuardPolicy,
    pub total_items: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Wall-clock time of the whole experiment.
    #[serde(with = "seconds")]
    pub total_time: Duration,
    #[serde(with = "seconds")]
    pub avg_time_per_item: Duration,
    /// Work-function time summed over all items.
    #[serde(with = "seconds")]
    pub work_time: Duration,
    /// Items per second.
    pub throughput: f64,
    /// Absent when workers run in separate processes.
    pub counter: Option<CounterReport>,
    pub log: LogAudit,
    /// Contention on the log guard; absent when unguarded.
    pub lock: Option<MetricsSnapshot>,
    pub contention_ratio: f64,
    /// First few work failures, for diagnosis.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

const MAX_REPORTED_ERRORS: usize = 10;

impl ExperimentReport {
    pub fn build(
        spec: &ExperimentSpec,
        outcomes: &[ItemOutcome],
        total_time: Duration,
        counter: Option<CounterReport>,
        log: LogAudit,
        lock: Option<MetricsSnapshot>,
    ) -> Self {
        let total_items = outcomes.len();
        let succeeded = outcomes.iter().filter(|o| o.success).count();
        let work_time: Duration = outcomes.iter().map(|o| o.elapsed).sum();
        let avg_time_per_item = match u32::try_from(total_items) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(n) => total_time / n,
        };
        let throughput = if total_time.is_zero() {
            0.0
        } else {
            total_items as f64 / total_time.as_secs_f64()
        };
        let contention_ratio = lock.map_or(0.0, |snapshot| snapshot.contention_ratio(total_time));
        let errors = outcomes
            .iter()
            .filter_map(|o| o.error.as_ref().map(|e| format!("{}: {}", o.name, e)))
            .take(MAX_REPORTED_ERRORS)
            .collect();

        Self {
            name: spec.name.clone(),
            mode: spec.mode.label().to_string(),
            workers: spec.mode.workers(),
            policy: spec.policy,
            total_items,
            succeeded,
            failed: total_items - succeeded,
            total_time,
            avg_time_per_item,
            work_time,
            throughput,
            counter,
            log,
            lock,
            contention_ratio,
            errors,
        }
    }

    /// Whether the shared resources came out exactly as expected.
    pub fn is_consistent(&self) -> bool {
        self.log.is_clean() && self.counter.is_none_or(|c| c.lost == 0)
    }
}

/// One row of `summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub name: String,
    pub mode: String,
    pub workers: usize,
    pub policy: GuardPolicy,
    #[serde(with = "seconds")]
    pub total_time: Duration,
    pub throughput: f64,
    /// Sequential time divided by this experiment's time.
    pub speedup: Option<f64>,
    pub contention_ratio: f64,
    pub lost_updates: Option<u64>,
    pub corrupted_lines: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub generator: String,
    pub experiments: Vec<SummaryRow>,
}

impl Summary {
    pub fn from_reports(reports: &[ExperimentReport]) -> Self {
        let baseline = reports
            .iter()
            .find(|r| r.mode == "sequential")
            .map(|r| r.total_time);

        let experiments = reports
            .iter()
            .map(|r| SummaryRow {
                name: r.name.clone(),
                mode: r.mode.clone(),
                workers: r.workers,
                policy: r.policy,
                total_time: r.total_time,
                throughput: r.throughput,
                speedup: baseline
                    .filter(|_| !r.total_time.is_zero())
                    .map(|base| base.as_secs_f64() / r.total_time.as_secs_f64()),
                contention_ratio: r.contention_ratio,
                lost_updates: r.counter.map(|c| c.lost),
                corrupted_lines: r.log.corrupted,
            })
            .collect();

        Self {
            generator: format!("{} {}", crate::PKG_NAME, crate::VERSION),
            experiments,
        }
    }
}

/// Write `<name>.json` per experiment plus `summary.json` into `dir`.
///
/// Returns the written paths, summary last.
pub fn export_reports(dir: &Path, reports: &[ExperimentReport]) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create results directory {}", dir.display()))?;

    let mut written = Vec::with_capacity(reports.len() + 1);
    for report in reports {
        let path = dir.join(format!("{}.json", report.name));
        write_json(&path, report)?;
        written.push(path);
    }

    let summary_path = dir.join("summary.json");
    write_json(&summary_path, &Summary::from_reports(reports))?;
    written.push(summary_path);

    tracing::info!("Exported {} report(s) to {}", reports.len(), dir.display());
    Ok(written)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}
