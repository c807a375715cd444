//! Runs planned experiments and measures them

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::report::{CounterReport, ExperimentReport};
use super::worker::WorkerJob;
use super::{ExperimentMode, ExperimentSpec, GuardPolicy};
use crate::config::BenchConfig;
use crate::parallel::ExecutionStrategy;
use crate::sync::{
    ContentionMetrics, FileSink, GuardedLogger, LogAudit, LogSink, ProcessGuard, SharedCounter,
    SlotGuard, SyncError,
};
use crate::workload::{ItemOutcome, WorkItem, convert_to_grayscale};

/// Inputs shared by every experiment of one run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub items: Vec<WorkItem>,
    /// Logs, lock files and job files go under `<run_dir>/logs`.
    pub run_dir: PathBuf,
    pub output_dir: Option<PathBuf>,
    pub race_window: Duration,
    /// Binary started for process experiments.
    pub worker_exe: PathBuf,
}

impl RunContext {
    pub fn from_config(config: &BenchConfig, worker_exe: PathBuf) -> Result<Self> {
        let items = config.load_items()?;
        if items.is_empty() {
            anyhow::bail!("No work items found");
        }
        Ok(Self {
            items,
            run_dir: config.results.dir.clone(),
            output_dir: config.workload.output_dir.clone(),
            race_window: config.race_window(),
            worker_exe,
        })
    }
}

pub struct ExperimentRunner {
    ctx: RunContext,
    logs_dir: PathBuf,
}

impl ExperimentRunner {
    pub fn new(ctx: RunContext) -> Result<Self> {
        let logs_dir = ctx.run_dir.join("logs");
        fs::create_dir_all(&logs_dir)
            .with_context(|| format!("Failed to create {}", logs_dir.display()))?;
        if let Some(dir) = &ctx.output_dir {
            fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        Ok(Self { ctx, logs_dir })
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.ctx.items
    }

    /// Run `plan` in order, handing each report to `on_report` as it completes.
    pub fn run_all(
        &self,
        plan: &[ExperimentSpec],
        mut on_report: impl FnMut(&ExperimentReport),
    ) -> Result<Vec<ExperimentReport>> {
        let mut reports = Vec::with_capacity(plan.len());
        for spec in plan {
            let report = self.run(spec)?;
            on_report(&report);
            reports.push(report);
        }
        Ok(reports)
    }

    pub fn run(&self, spec: &ExperimentSpec) -> Result<ExperimentReport> {
        spec.validate()?;
        tracing::info!(
            "Running {} ({} workers, {}) over {} items",
            spec.name,
            spec.mode.workers(),
            spec.policy,
            self.ctx.items.len()
        );

        let report = match spec.mode {
            ExperimentMode::InProcess { strategy } => self.run_in_process(spec, strategy),
            ExperimentMode::Processes { workers } => self.run_processes(spec, workers),
        }
        .with_context(|| format!("Experiment {} failed", spec.name))?;

        tracing::info!(
            "{} finished in {:.3}s ({:.1} items/s, contention {:.3})",
            report.name,
            report.total_time.as_secs_f64(),
            report.throughput,
            report.contention_ratio
        );
        if !report.is_consistent() {
            tracing::warn!("{}: shared state inconsistent ({})", report.name, report.log);
        }
        Ok(report)
    }

    fn log_path(&self, spec: &ExperimentSpec) -> PathBuf {
        self.logs_dir.join(format!("{}.log", spec.name))
    }

    fn lock_path(&self, spec: &ExperimentSpec) -> PathBuf {
        self.logs_dir.join(format!("{}.lock", spec.name))
    }

    fn run_in_process(&self, spec: &ExperimentSpec, strategy: ExecutionStrategy) -> Result<ExperimentReport> {
        let log_path = self.log_path(spec);
        let sink: Arc<dyn LogSink> = Arc::new(FileSink::create(&log_path)?);
        let logger = in_process_logger(spec.policy, sink, &self.lock_path(spec))?;
        let counter = counter_for(spec.policy, self.ctx.race_window)?;
        let output_dir = self.ctx.output_dir.as_deref();

        let progress = |current: usize, total: usize, worker: usize| {
            tracing::trace!("{}: {}/{} items [worker-{}]", spec.name, current, total, worker);
        };

        let started = Instant::now();
        let results = strategy.execute(
            self.ctx.items.clone(),
            |item, worker| -> Result<ItemOutcome, SyncError> {
                // Conversion happens before any guard is touched.
                let outcome = convert_to_grayscale(&item, output_dir, worker);
                logger.append(&outcome.log_line())?;
                counter.increment();
                Ok(outcome)
            },
            Some(progress),
        )?;
        let total_time = started.elapsed();
        let outcomes = results.into_iter().collect::<Result<Vec<_>, _>>()?;

        let audit = audit_log(&log_path, &outcomes)?;
        let lock = logger.metrics().map(|m| m.snapshot()).transpose()?;
        Ok(ExperimentReport::build(
            spec,
            &outcomes,
            total_time,
            Some(CounterReport::from(&counter)),
            audit,
            lock,
        ))
    }

    fn run_processes(&self, spec: &ExperimentSpec, workers: usize) -> Result<ExperimentReport> {
        let workers = workers.min(self.ctx.items.len()).max(1);
        let log_path = self.log_path(spec);
        FileSink::create(&log_path)?;
        let guard = match spec.policy {
            GuardPolicy::CrossProcess => Some(ProcessGuard::create(self.lock_path(spec))?),
            _ => None,
        };

        let started = Instant::now();
        let mut children = Vec::with_capacity(workers);
        for worker in 0..workers {
            let job = WorkerJob {
                worker,
                policy: spec.policy,
                items: stripe(&self.ctx.items, worker, workers),
                log_path: log_path.clone(),
                lock_path: guard.as_ref().map(|g| g.path().to_path_buf()),
                output_dir: self.ctx.output_dir.clone(),
            };
            let job_path = self.logs_dir.join(format!("{}-worker-{worker}.json", spec.name));
            let spawned = job.write(&job_path).and_then(|()| self.spawn_worker(&job_path));
            match spawned {
                Ok(child) => children.push((worker, child)),
                Err(e) => {
                    reap_workers(children);
                    return Err(e);
                }
            }
        }

        let mut outcomes = Vec::with_capacity(self.ctx.items.len());
        let mut pending = children.into_iter();
        while let Some((worker, child)) = pending.next() {
            match collect_worker(worker, child) {
                Ok(worker_outcomes) => outcomes.extend(worker_outcomes),
                Err(e) => {
                    reap_workers(pending);
                    return Err(e);
                }
            }
        }
        let total_time = started.elapsed();

        let audit = audit_log(&log_path, &outcomes)?;
        let lock = guard
            .map(|g| ContentionMetrics::new(Arc::new(g)).snapshot())
            .transpose()?;
        Ok(ExperimentReport::build(spec, &outcomes, total_time, None, audit, lock))
    }

    fn spawn_worker(&self, job_path: &Path) -> Result<Child> {
        Command::new(&self.ctx.worker_exe)
            .arg("worker")
            .arg("--job")
            .arg(job_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to start worker {}", self.ctx.worker_exe.display()))
    }
}

fn collect_worker(worker: usize, child: Child) -> Result<Vec<ItemOutcome>> {
    let output = child
        .wait_with_output()
        .with_context(|| format!("Failed to wait for worker {worker}"))?;
    if !output.status.success() {
        anyhow::bail!(
            "Worker {} exited with {}: {}",
            worker,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    serde_json::from_slice(&output.stdout)
        .with_context(|| format!("Worker {worker} printed invalid outcomes"))
}

/// Kill and wait every remaining child so none outlives a failed experiment.
fn reap_workers(children: impl IntoIterator<Item = (usize, Child)>) {
    for (worker, mut child) in children {
        if let Err(e) = child.kill() {
            tracing::debug!("Worker {} already gone: {}", worker, e);
        }
        match child.wait() {
            Ok(status) => tracing::debug!("Reaped worker {} ({})", worker, status),
            Err(e) => tracing::warn!("Failed to reap worker {}: {}", worker, e),
        }
    }
}

/// Items `worker`, `worker + workers`, `worker + 2 * workers`, ...
fn stripe(items: &[WorkItem], worker: usize, workers: usize) -> Vec<WorkItem> {
    items.iter().skip(worker).step_by(workers).cloned().collect()
}

fn audit_log(log_path: &Path, outcomes: &[ItemOutcome]) -> Result<LogAudit> {
    let expected: Vec<String> = outcomes.iter().map(ItemOutcome::log_line).collect();
    LogAudit::inspect_file(log_path, &expected)
        .with_context(|| format!("Failed to read log {}", log_path.display()))
}

fn in_process_logger(
    policy: GuardPolicy,
    sink: Arc<dyn LogSink>,
    lock_path: &Path,
) -> Result<GuardedLogger, SyncError> {
    Ok(match policy {
        GuardPolicy::Unguarded => GuardedLogger::unguarded(sink),
        GuardPolicy::Exclusive => GuardedLogger::exclusive(sink),
        GuardPolicy::Bounded { permits } => GuardedLogger::bounded(sink, permits)?,
        GuardPolicy::CrossProcess => GuardedLogger::cross_process(sink, ProcessGuard::create(lock_path)?),
    })
}

/// The counter guard matching a policy. A cross-process policy still
/// counts in process memory, behind an exclusive guard.
fn counter_for(policy: GuardPolicy, window: Duration) -> Result<SharedCounter, SyncError> {
    match policy {
        GuardPolicy::Unguarded => Ok(SharedCounter::unguarded(window)),
        GuardPolicy::Exclusive | GuardPolicy::CrossProcess => Ok(SharedCounter::with_guard(
            Arc::new(SlotGuard::exclusive()),
            window,
        )),
        GuardPolicy::Bounded { permits } => SharedCounter::bounded(permits, window),
    }
}
