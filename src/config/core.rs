use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml};
use serde::Serialize;
use std::path::Path;

use super::BenchConfig;

// Embed the default config at compile time
const DEFAULT_CONFIG: &str = include_str!("../../default-config.toml");

/// Base name of the per-directory config file (`syncbench.toml` / `syncbench.json`)
const LOCAL_CONFIG: &str = "syncbench";
const ENV_PREFIX: &str = "SYNCBENCH_";

impl BenchConfig {
    /// Build the merged figment without extracting it.
    pub fn figment<T: Serialize>(custom_config: Option<&Path>, cli_overrides: Option<T>) -> Figment {
        tracing::trace!("CONFIG LOAD: Starting");

        let mut figment = Figment::new()
            .merge(Toml::string(DEFAULT_CONFIG)) // 1. Defaults (lowest)
            .merge(Toml::file(format!("{LOCAL_CONFIG}.toml"))) // 2. Directory config
            .merge(Json::file(format!("{LOCAL_CONFIG}.json")));

        if let Some(path) = custom_config {
            // 3. Custom config, format picked by extension
            figment = match path.extension().and_then(|ext| ext.to_str()) {
                Some("json") => figment.merge(Json::file(path)),
                _ => figment.merge(Toml::file(path)),
            };
        }

        // 4. Environment variables, nested with "__"
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        if let Some(cli) = cli_overrides {
            // 5. CLI (highest priority)
            tracing::trace!("CONFIG LOAD: Applying CLI overrides");
            figment = figment.merge(Serialized::defaults(cli));
        }
        figment
    }

    /// Load, extract and validate the configuration.
    pub fn load<T: Serialize>(custom_config: Option<&Path>, cli_overrides: Option<T>) -> Result<Self> {
        if let Some(path) = custom_config
            && !path.is_file()
        {
            anyhow::bail!("Config file {} not found", path.display());
        }

        let config: BenchConfig = Self::figment(custom_config, cli_overrides)
            .extract()
            .context("Failed to parse configuration")?;
        config.validate()?;

        tracing::debug!(
            "Loaded config: {} {:?} items, {} threads, {} permits",
            config.workload.count,
            config.workload.source,
            config.experiment.threads,
            config.experiment.permits
        );
        Ok(config)
    }

    /// Load with defaults, local files and environment only.
    pub fn load_default() -> Result<Self> {
        Self::load(None, None::<&()>)
    }
}
