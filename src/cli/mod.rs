//! Command-line interface for syncbench
//!
//! Parses arguments with clap, sets up tracing and dispatches to the
//! command implementations in [`commands`].

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;
pub mod output;

pub use output::Output;

use commands::{config, demo, run, version, worker};

#[derive(Parser)]
#[command(
    name = "syncbench",
    version = env!("CARGO_PKG_VERSION"),
    about = "Measure what locks cost and what they protect",
    long_about = "syncbench runs the same workload sequentially, on threads, on an executor pool \
                  and in child processes, guarding a shared log and counter with exclusive, \
                  bounded and cross-process guards, and reports contention and integrity."
)]
pub struct Cli {
    /// Increase verbosity (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Use custom configuration file (TOML, or JSON by extension)
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the experiment plan and export results
    Run(run::RunArgs),
    /// Race demonstrations on a shared counter and shared loggers
    Demo(demo::DemoArgs),
    /// Configuration management
    Config(config::ConfigArgs),
    /// Show version information
    Version(version::VersionArgs),
    /// Run one process-experiment job (started by `run`)
    #[command(hide = true)]
    Worker(worker::WorkerArgs),
}

impl Cli {
    pub fn run(self) -> Result<()> {
        setup_logging(self.verbose, self.quiet);
        let output = Output::new(self.verbose > 0, self.quiet);
        let custom_config = self.config.as_deref();

        match self.command {
            Some(Commands::Run(args)) => run::execute(args, custom_config, &output),
            Some(Commands::Demo(args)) => demo::execute(args, custom_config, &output),
            Some(Commands::Config(args)) => config::execute(args, custom_config, &output),
            Some(Commands::Version(args)) => version::execute(args),
            Some(Commands::Worker(args)) => worker::execute(args),
            None => {
                Cli::command().print_help()?;
                Ok(())
            }
        }
    }
}

fn setup_logging(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        match verbose {
            0 => tracing_subscriber::EnvFilter::new("warn"),
            1 => tracing_subscriber::EnvFilter::new("info,ignore=warn"),
            2 => tracing_subscriber::EnvFilter::new("debug,ignore=warn"),
            _ => tracing_subscriber::EnvFilter::new("trace"),
        }
    });

    // stdout belongs to command output (worker outcomes are JSON on stdout)
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
