use anyhow::Result;
use clap::{Args, Subcommand, ValueEnum};
use std::path::Path;

use crate::cli::Output;
use crate::config::BenchConfig;
use crate::experiment::default_plan;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Display current merged configuration
    Show {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = ConfigFormat::Toml)]
        format: ConfigFormat,
    },
    /// Validate configuration and list the experiments it plans
    Validate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfigFormat {
    Toml,
    Json,
}

pub fn execute(args: ConfigArgs, custom_config: Option<&Path>, output: &Output) -> Result<()> {
    match args.command {
        ConfigCommand::Show { format } => {
            let config = BenchConfig::load(custom_config, None::<&()>)?;
            let rendered = match format {
                ConfigFormat::Toml => toml::to_string_pretty(&config)?,
                ConfigFormat::Json => serde_json::to_string_pretty(&config)?,
            };
            println!("{rendered}");
        }
        ConfigCommand::Validate => {
            let config = match BenchConfig::load(custom_config, None::<&()>) {
                Ok(config) => config,
                Err(err) => {
                    output.error("Configuration is invalid");
                    return Err(err);
                }
            };

            output.success("Configuration is valid");
            output.key_value("source", &format!("{:?}", config.workload.source), false);
            output.key_value("threads", &config.experiment.threads.to_string(), false);
            output.key_value("processes", &config.process_count().to_string(), false);
            output.key_value("pool workers", &config.experiment.pool_workers.to_string(), false);
            output.key_value("permits", &config.experiment.permits.to_string(), false);
            output.blank_line();
            output.step("Planned experiments");
            for spec in default_plan(&config) {
                match spec.validate() {
                    Ok(()) => output.key_value(&spec.name, &spec.mode.workers().to_string(), false),
                    Err(err) => output.warning(&format!("{}: {err}", spec.name)),
                }
            }
        }
    }
    Ok(())
}
