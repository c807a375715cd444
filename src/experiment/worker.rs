//! Child-process side of process experiments
//!
//! The coordinator writes one JSON [`WorkerJob`] per child and starts
//! `syncbench worker --job FILE`. The child converts its items, appends to
//! the shared log under the job's guard policy, and prints its outcomes as
//! a JSON array on stdout.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::GuardPolicy;
use crate::sync::{FileSink, GuardedLogger, ProcessGuard};
use crate::workload::{ItemOutcome, WorkItem, convert_to_grayscale};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerJob {
    /// Index of this child among its siblings.
    pub worker: usize,
    pub policy: GuardPolicy,
    pub items: Vec<WorkItem>,
    pub log_path: PathBuf,
    /// Lock file created by the coordinator; required for `CrossProcess`.
    pub lock_path: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
}

impl WorkerJob {
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write job file {}", path.display()))
    }

    pub fn read(path: &Path) -> Result<Self> {
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read job file {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("Invalid job file {}", path.display()))
    }
}

/// Run every item of `job` in this process.
pub fn run_worker_job(job: &WorkerJob) -> Result<Vec<ItemOutcome>> {
    let sink = Arc::new(
        FileSink::open(&job.log_path)
            .with_context(|| format!("Failed to open log {}", job.log_path.display()))?,
    );
    let logger = match job.policy {
        GuardPolicy::Unguarded => GuardedLogger::unguarded(sink),
        GuardPolicy::CrossProcess => {
            let lock = job
                .lock_path
                .as_ref()
                .context("Cross-process job has no lock file")?;
            GuardedLogger::cross_process(sink, ProcessGuard::open(lock)?)
        }
        other => anyhow::bail!("{other} guards cannot span processes"),
    };

    tracing::debug!("worker-{}: {} item(s) under {}", job.worker, job.items.len(), job.policy);
    job.items
        .iter()
        .map(|item| -> Result<ItemOutcome> {
            let outcome = convert_to_grayscale(item, job.output_dir.as_deref(), job.worker);
            logger.append(&outcome.log_line())?;
            Ok(outcome)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{Guard, LogAudit};
    use crate::workload::synthetic;
    use std::thread;
    use tempfile::TempDir;

    fn job(dir: &Path, worker: usize, policy: GuardPolicy) -> WorkerJob {
        WorkerJob {
            worker,
            policy,
            items: synthetic(6, 8, 8, worker as u64 * 100),
            log_path: dir.join("shared.log"),
            lock_path: Some(dir.join("shared.lock")),
            output_dir: None,
        }
    }

    #[test]
    fn test_job_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let original = job(dir.path(), 1, GuardPolicy::CrossProcess);
        let path = dir.path().join("job.json");
        original.write(&path).unwrap();
        assert_eq!(WorkerJob::read(&path).unwrap(), original);
    }

    #[test]
    fn test_sibling_jobs_share_one_lock() {
        let dir = TempDir::new().unwrap();
        let guard = ProcessGuard::create(dir.path().join("shared.lock")).unwrap();
        FileSink::create(dir.path().join("shared.log")).unwrap();

        let jobs: Vec<_> = (0..3)
            .map(|w| job(dir.path(), w, GuardPolicy::CrossProcess))
            .collect();
        let outcomes: Vec<ItemOutcome> = thread::scope(|s| {
            let handles: Vec<_> = jobs
                .iter()
                .map(|job| s.spawn(move || run_worker_job(job).unwrap()))
                .collect();
            handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(outcomes.len(), 18);
        assert!(outcomes.iter().all(|o| o.success));
        let lines: Vec<String> = outcomes.iter().map(ItemOutcome::log_line).collect();
        let audit = LogAudit::inspect_file(&dir.path().join("shared.log"), &lines).unwrap();
        assert!(audit.is_clean(), "{audit}");
        assert_eq!(guard.stats().unwrap().acquisitions, 18);
    }

    #[test]
    fn test_in_process_policies_are_refused() {
        let dir = TempDir::new().unwrap();
        let err = run_worker_job(&job(dir.path(), 0, GuardPolicy::Exclusive)).unwrap_err();
        assert!(err.to_string().contains("cannot span processes"));
    }

    #[test]
    fn test_cross_process_job_needs_existing_lock() {
        let dir = TempDir::new().unwrap();
        assert!(run_worker_job(&job(dir.path(), 0, GuardPolicy::CrossProcess)).is_err());
    }
}
