//! Experiments: one execution strategy paired with one guard policy
//!
//! Every worker converts its item outside any guard, then appends one line
//! to the experiment's shared log and increments the shared counter. The
//! guard policy decides what protects those two shared resources.

pub mod demo;
pub mod report;
pub mod runner;
pub mod worker;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::BenchConfig;
use crate::parallel::ExecutionStrategy;
use crate::sync::SyncError;

pub use demo::{DemoOutcome, run_demos};
pub use report::{CounterReport, ExperimentReport, export_reports};
pub use runner::{ExperimentRunner, RunContext};
pub use worker::{WorkerJob, run_worker_job};

/// What guards the shared log and counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum GuardPolicy {
    Unguarded,
    Exclusive,
    Bounded { permits: usize },
    CrossProcess,
}

impl fmt::Display for GuardPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardPolicy::Unguarded => f.write_str("unguarded"),
            GuardPolicy::Exclusive => f.write_str("exclusive"),
            GuardPolicy::Bounded { permits } => write!(f, "bounded({permits})"),
            GuardPolicy::CrossProcess => f.write_str("cross-process"),
        }
    }
}

/// How the workers of an experiment are run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ExperimentMode {
    /// Closures inside this process.
    InProcess { strategy: ExecutionStrategy },
    /// Independent child processes of the syncbench binary.
    Processes { workers: usize },
}

impl ExperimentMode {
    pub fn workers(&self) -> usize {
        match self {
            ExperimentMode::InProcess { strategy } => strategy.workers(),
            ExperimentMode::Processes { workers } => *workers,
        }
    }

    /// Short label used in reports: sequential, threads, pool or processes.
    pub fn label(&self) -> &'static str {
        match self {
            ExperimentMode::InProcess {
                strategy: ExecutionStrategy::Sequential,
            } => "sequential",
            ExperimentMode::InProcess {
                strategy: ExecutionStrategy::Threads { .. },
            } => "threads",
            ExperimentMode::InProcess {
                strategy: ExecutionStrategy::Pool { .. },
            } => "pool",
            ExperimentMode::Processes { .. } => "processes",
        }
    }
}

/// One planned experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentSpec {
    pub name: String,
    pub mode: ExperimentMode,
    pub policy: GuardPolicy,
}

impl ExperimentSpec {
    pub fn new(mode: ExperimentMode, policy: GuardPolicy) -> Self {
        let name = match (mode, policy) {
            (
                ExperimentMode::InProcess {
                    strategy: ExecutionStrategy::Sequential,
                },
                GuardPolicy::Unguarded,
            ) => "sequential".to_string(),
            _ => {
                let policy_name = match policy {
                    GuardPolicy::Bounded { .. } => "bounded".to_string(),
                    other => other.to_string(),
                };
                format!("{}-{}", mode.label(), policy_name)
            }
        };
        Self { name, mode, policy }
    }

    /// Reject combinations that cannot work.
    ///
    /// In-process guards live in one address space, so child processes can
    /// only share the log unguarded or under the cross-process guard.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.mode.workers() < 1 {
            return Err(SyncError::InvalidConfig(format!(
                "experiment {} needs at least one worker",
                self.name
            )));
        }
        if let GuardPolicy::Bounded { permits } = self.policy
            && permits < 1
        {
            return Err(SyncError::InvalidConfig(format!(
                "experiment {} needs at least 1 permit",
                self.name
            )));
        }
        if matches!(self.mode, ExperimentMode::Processes { .. })
            && matches!(self.policy, GuardPolicy::Exclusive | GuardPolicy::Bounded { .. })
        {
            return Err(SyncError::InvalidConfig(format!(
                "experiment {}: {} guards cannot span processes",
                self.name, self.policy
            )));
        }
        Ok(())
    }
}

/// The standard comparison: a sequential baseline, threads under every
/// in-process policy, processes under the cross-process guard, and the
/// executor pool under exclusive and bounded guards.
///
/// `experiment.only` narrows the plan down to the named experiments.
pub fn default_plan(config: &BenchConfig) -> Vec<ExperimentSpec> {
    let exp = &config.experiment;
    let bounded = GuardPolicy::Bounded {
        permits: exp.permits,
    };
    let threads = ExperimentMode::InProcess {
        strategy: ExecutionStrategy::Threads {
            workers: exp.threads,
        },
    };
    let pool = ExperimentMode::InProcess {
        strategy: ExecutionStrategy::Pool {
            workers: exp.pool_workers,
        },
    };

    let plan = vec![
        ExperimentSpec::new(
            ExperimentMode::InProcess {
                strategy: ExecutionStrategy::Sequential,
            },
            GuardPolicy::Unguarded,
        ),
        ExperimentSpec::new(threads, GuardPolicy::Unguarded),
        ExperimentSpec::new(threads, GuardPolicy::Exclusive),
        ExperimentSpec::new(threads, bounded),
        ExperimentSpec::new(
            ExperimentMode::Processes {
                workers: config.process_count(),
            },
            GuardPolicy::CrossProcess,
        ),
        ExperimentSpec::new(pool, GuardPolicy::Exclusive),
        ExperimentSpec::new(pool, bounded),
    ];

    if exp.only.is_empty() {
        return plan;
    }
    plan.into_iter()
        .filter(|spec| exp.only.iter().any(|name| name == &spec.name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_plan_names() {
        let config = BenchConfig::load_default().unwrap();
        let names: Vec<_> = default_plan(&config).into_iter().map(|spec| spec.name).collect();
        assert_eq!(
            names,
            vec![
                "sequential",
                "threads-unguarded",
                "threads-exclusive",
                "threads-bounded",
                "processes-cross-process",
                "pool-exclusive",
                "pool-bounded",
            ]
        );
    }

    #[test]
    fn test_plan_filter() {
        let mut config = BenchConfig::load_default().unwrap();
        config.experiment.only = vec!["pool-bounded".to_string(), "sequential".to_string()];
        let plan = default_plan(&config);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].name, "sequential");
        assert_eq!(
            plan[1].policy,
            GuardPolicy::Bounded {
                permits: config.experiment.permits
            }
        );
    }

    #[test]
    fn test_in_process_guards_cannot_span_processes() {
        let spec = ExperimentSpec::new(ExperimentMode::Processes { workers: 2 }, GuardPolicy::Exclusive);
        assert!(matches!(spec.validate(), Err(SyncError::InvalidConfig(_))));

        let spec = ExperimentSpec::new(ExperimentMode::Processes { workers: 2 }, GuardPolicy::Unguarded);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let spec = ExperimentSpec::new(
            ExperimentMode::InProcess {
                strategy: ExecutionStrategy::Threads { workers: 0 },
            },
            GuardPolicy::Exclusive,
        );
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_policy_serde_shape() {
        let json = serde_json::to_string(&GuardPolicy::Bounded { permits: 3 }).unwrap();
        assert_eq!(json, r#"{"policy":"bounded","permits":3}"#);
        assert_eq!(GuardPolicy::CrossProcess.to_string(), "cross-process");
    }
}
