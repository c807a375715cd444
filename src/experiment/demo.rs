//! Race demonstrations
//!
//! Small hammer tests run by `syncbench demo`: many threads hit one counter
//! or one logger, and the outcome shows what each guard does (and does not)
//! protect.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::DemoConfig;
use crate::sync::metrics::seconds;
use crate::sync::{
    FileSink, GuardedLogger, LogAudit, MemorySink, MetricsSnapshot, SharedCounter, SlotGuard,
};

/// Result of one demonstration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemoOutcome {
    pub name: String,
    /// Increments or lines the workers produced.
    pub expected: u64,
    /// Final counter value, or intact log lines.
    pub observed: u64,
    /// Lost updates, or corrupted plus missing lines.
    pub anomalies: u64,
    pub lock: Option<MetricsSnapshot>,
    #[serde(with = "seconds")]
    pub elapsed: Duration,
    pub contention_ratio: f64,
}

impl DemoOutcome {
    fn new(
        name: &str,
        expected: u64,
        observed: u64,
        anomalies: u64,
        lock: Option<MetricsSnapshot>,
        elapsed: Duration,
    ) -> Self {
        let contention_ratio = lock.map_or(0.0, |s| s.contention_ratio(elapsed));
        Self {
            name: name.to_string(),
            expected,
            observed,
            anomalies,
            lock,
            elapsed,
            contention_ratio,
        }
    }
}

/// Run every demonstration. File logs are written into `dir`.
pub fn run_demos(
    config: &DemoConfig,
    permits: usize,
    dir: &Path,
    race_window: Duration,
) -> Result<Vec<DemoOutcome>> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut outcomes = vec![
        counter_demo("unguarded-counter", config, SharedCounter::unguarded(race_window))?,
        counter_demo(
            "exclusive-counter",
            config,
            SharedCounter::with_guard(Arc::new(SlotGuard::exclusive()), race_window),
        )?,
    ];

    let sink = Arc::new(MemorySink::new());
    let logger = GuardedLogger::unguarded(sink.clone());
    outcomes.push(logger_demo("unguarded-logger", config, &logger, || Ok(sink.contents()))?);

    let path = dir.join("demo-exclusive.log");
    let logger = GuardedLogger::exclusive(Arc::new(FileSink::create(&path)?));
    outcomes.push(logger_demo("exclusive-file-logger", config, &logger, || {
        fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))
    })?);

    let sink = Arc::new(MemorySink::new());
    let logger = GuardedLogger::bounded(sink.clone(), permits)?;
    outcomes.push(logger_demo("bounded-logger", config, &logger, || Ok(sink.contents()))?);

    for outcome in &outcomes {
        tracing::debug!(
            "{}: expected {}, observed {}, anomalies {}",
            outcome.name,
            outcome.expected,
            outcome.observed,
            outcome.anomalies
        );
    }
    Ok(outcomes)
}

fn counter_demo(name: &str, config: &DemoConfig, counter: SharedCounter) -> Result<DemoOutcome> {
    let started = Instant::now();
    thread::scope(|s| {
        for _ in 0..config.workers {
            s.spawn(|| {
                for _ in 0..config.iterations {
                    counter.increment();
                }
            });
        }
    });
    let elapsed = started.elapsed();

    let lock = counter.metrics().map(|m| m.snapshot()).transpose()?;
    Ok(DemoOutcome::new(
        name,
        counter.calls(),
        counter.value(),
        counter.lost_updates(),
        lock,
        elapsed,
    ))
}

fn logger_demo(
    name: &str,
    config: &DemoConfig,
    logger: &GuardedLogger,
    read_back: impl FnOnce() -> Result<String>,
) -> Result<DemoOutcome> {
    let started = Instant::now();
    thread::scope(|s| -> Result<()> {
        let handles: Vec<_> = (0..config.workers)
            .map(|worker| {
                s.spawn(move || {
                    (0..config.iterations)
                        .try_for_each(|i| logger.append(&demo_line(worker, i)))
                })
            })
            .collect();
        for handle in handles {
            handle
                .join()
                .map_err(|_| anyhow::anyhow!("{name}: worker panicked"))??;
        }
        Ok(())
    })?;
    let elapsed = started.elapsed();

    let expected: Vec<String> = (0..config.workers)
        .flat_map(|w| (0..config.iterations).map(move |i| demo_line(w, i)))
        .collect();
    let audit = LogAudit::inspect(&read_back()?, &expected);
    let lock = logger.metrics().map(|m| m.snapshot()).transpose()?;
    Ok(DemoOutcome::new(
        name,
        expected.len() as u64,
        audit.intact,
        audit.corrupted + audit.missing,
        lock,
        elapsed,
    ))
}

fn demo_line(worker: usize, iteration: usize) -> String {
    format!("worker-{worker:02} entry-{iteration:04} the quick brown fox")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn outcome<'a>(outcomes: &'a [DemoOutcome], name: &str) -> &'a DemoOutcome {
        outcomes.iter().find(|o| o.name == name).unwrap()
    }

    #[test]
    fn test_guarded_demos_are_exact() {
        let dir = TempDir::new().unwrap();
        let config = DemoConfig {
            workers: 4,
            iterations: 25,
        };
        let outcomes = run_demos(&config, 2, dir.path(), Duration::from_micros(20)).unwrap();
        assert_eq!(outcomes.len(), 5);

        let counter = outcome(&outcomes, "exclusive-counter");
        assert_eq!((counter.expected, counter.observed, counter.anomalies), (100, 100, 0));
        assert_eq!(counter.lock.unwrap().acquisitions, 100);

        for name in ["exclusive-file-logger", "bounded-logger"] {
            let logger = outcome(&outcomes, name);
            assert_eq!(logger.expected, 100, "{name}");
            assert_eq!(logger.observed, 100, "{name}");
            assert_eq!(logger.anomalies, 0, "{name}");
            assert!(logger.lock.is_some());
        }
        assert!(dir.path().join("demo-exclusive.log").is_file());
    }

    #[test]
    fn test_unguarded_demos_report_without_metrics() {
        let dir = TempDir::new().unwrap();
        let config = DemoConfig {
            workers: 2,
            iterations: 10,
        };
        let outcomes = run_demos(&config, 1, dir.path(), Duration::ZERO).unwrap();

        let counter = outcome(&outcomes, "unguarded-counter");
        assert_eq!(counter.expected, 20);
        assert_eq!(counter.observed + counter.anomalies, 20);
        assert!(counter.lock.is_none());
        assert_eq!(counter.contention_ratio, 0.0);

        let logger = outcome(&outcomes, "unguarded-logger");
        assert!(logger.observed <= 20);
        assert!(logger.lock.is_none());
    }

    #[test]
    fn test_zero_permits_fail() {
        let dir = TempDir::new().unwrap();
        let config = DemoConfig {
            workers: 1,
            iterations: 1,
        };
        assert!(run_demos(&config, 0, dir.path(), Duration::ZERO).is_err());
    }
}
