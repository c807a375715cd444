use anyhow::Result;
use clap::Args;
use std::path::{Path, PathBuf};

use crate::cli::Output;
use crate::config::BenchConfig;
use crate::experiment::run_demos;

#[derive(Args, Default)]
pub struct DemoArgs {
    /// Threads hammering each shared resource
    #[arg(long)]
    pub workers: Option<usize>,

    /// Operations per thread
    #[arg(long)]
    pub iterations: Option<usize>,

    /// Directory for the demonstration log files
    #[arg(long, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Print outcomes as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: DemoArgs, custom_config: Option<&Path>, output: &Output) -> Result<()> {
    let config = BenchConfig::load(custom_config, None::<&()>)?;
    let mut demo = config.demo.clone();
    if let Some(workers) = args.workers {
        demo.workers = workers.max(1);
    }
    if let Some(iterations) = args.iterations {
        demo.iterations = iterations.max(1);
    }
    let dir = args.dir.unwrap_or_else(|| config.results.dir.join("demo"));

    let outcomes = run_demos(&demo, config.experiment.permits, &dir, config.race_window())?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
        return Ok(());
    }

    output.header(&format!(
        "Race demonstrations ({} threads x {} operations)",
        demo.workers, demo.iterations
    ));
    for outcome in &outcomes {
        output.demo(outcome);
    }
    output.blank_line();
    output.info("Unguarded resources may lose updates or garble lines; guarded ones must not.");
    Ok(())
}
