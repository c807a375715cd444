use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};

use crate::cli::Output;
use crate::config::{BenchConfig, ConfigOverrides, ExperimentOverrides, WorkSource, WorkloadOverrides};
use crate::experiment::{ExperimentRunner, RunContext, default_plan, export_reports};

#[derive(Args, Default)]
pub struct RunArgs {
    /// Worker threads for thread experiments
    #[arg(long)]
    pub threads: Option<usize>,

    /// Child processes for process experiments (0 = one per CPU core)
    #[arg(long)]
    pub processes: Option<usize>,

    /// Threads in the executor pool
    #[arg(long)]
    pub pool_workers: Option<usize>,

    /// Concurrent holders admitted by bounded guards
    #[arg(long)]
    pub permits: Option<usize>,

    /// Number of synthetic frames
    #[arg(long)]
    pub count: Option<usize>,

    /// Where work items come from
    #[arg(long, value_enum)]
    pub source: Option<WorkSource>,

    /// Directory scanned when the source is `directory`
    #[arg(long, value_name = "DIR")]
    pub input_dir: Option<PathBuf>,

    /// Write converted frames (PGM) into DIR
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Directory for logs and JSON results
    #[arg(long, value_name = "DIR")]
    pub results_dir: Option<PathBuf>,

    /// Only run the named experiments (comma-separated or repeated)
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,

    /// Skip writing JSON results
    #[arg(long)]
    pub no_write: bool,
}

impl RunArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            workload: WorkloadOverrides {
                source: self.source,
                input_dir: self.input_dir.clone(),
                count: self.count,
                output_dir: self.output_dir.clone(),
            },
            experiment: ExperimentOverrides {
                threads: self.threads,
                processes: self.processes,
                pool_workers: self.pool_workers,
                permits: self.permits,
                only: self.only.clone(),
            },
            results_dir: None,
        }
        .results_in(self.results_dir.clone())
    }
}

pub fn execute(args: RunArgs, custom_config: Option<&Path>, output: &Output) -> Result<()> {
    let config = BenchConfig::load(custom_config, Some(&args.overrides()))?;
    let plan = default_plan(&config);
    if plan.is_empty() {
        anyhow::bail!("No experiment matches {:?}", config.experiment.only);
    }

    let worker_exe = std::env::current_exe().context("Failed to locate the syncbench binary")?;
    let runner = ExperimentRunner::new(RunContext::from_config(&config, worker_exe)?)?;

    output.header("Experiments");
    output.key_value("items", &runner.items().len().to_string(), false);
    output.key_value("experiments", &plan.len().to_string(), false);
    output.key_value("results", &config.results.dir.display().to_string(), false);
    output.separator();

    let reports = runner.run_all(&plan, |report| output.experiment(report))?;
    output.separator();

    let races = reports.iter().filter(|r| !r.is_consistent()).count();
    if races > 0 {
        output.warning(&format!(
            "{races} experiment(s) corrupted shared state (expected for unguarded runs)"
        ));
    }

    if config.results.write && !args.no_write {
        let written = export_reports(&config.results.dir, &reports)?;
        for path in &written {
            output.verbose(&format!("wrote {}", path.display()));
        }
        output.success(&format!(
            "Wrote {} result file(s) to {}",
            written.len(),
            config.results.dir.display()
        ));
    } else {
        output.info("Results not written");
    }
    Ok(())
}
