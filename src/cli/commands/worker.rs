use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use crate::experiment::{WorkerJob, run_worker_job};

#[derive(Args)]
pub struct WorkerArgs {
    /// JSON job file written by the coordinator
    #[arg(long, value_name = "FILE")]
    pub job: PathBuf,
}

/// Run the job and print its outcomes on stdout.
pub fn execute(args: WorkerArgs) -> Result<()> {
    let job = WorkerJob::read(&args.job)?;
    let outcomes = run_worker_job(&job)?;
    println!("{}", serde_json::to_string(&outcomes)?);
    Ok(())
}
