//! CLI argument parsing and command dispatch

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use config_resolver::config::ResolverConfig;

use crate::commands;

/// Config Resolver - Resolve in-repo CI job configuration for commit sets
#[derive(Parser, Debug)]
#[command(name = "config-resolver")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Resolver configuration file (YAML)
    #[arg(long, global = true, value_name = "FILE", env = "CONFIG_RESOLVER_CONFIG")]
    config: Option<PathBuf>,

    /// Maximum number of resolutions kept in memory
    #[arg(long, global = true, value_name = "N")]
    cache_capacity: Option<usize>,

    /// The root directory for git mirrors and worktrees.
    ///
    /// If not provided, it defaults to the system's cache directory
    /// (e.g., `~/.cache/config-resolver` on Linux).
    #[arg(long, global = true, value_name = "DIR", env = "CONFIG_RESOLVER_CACHE")]
    cache_root: Option<PathBuf>,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve the job configuration of one commit set
    Resolve(commands::resolve::ResolveArgs),

    /// Resolve JSON-lines requests concurrently against one shared cache
    Batch(commands::batch::BatchArgs),

    /// Compile the job configuration of a local directory
    CheckConfig(commands::check_config::CheckConfigArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        // RUST_LOG still wins when set
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&self.log_level))
            .format_timestamp_millis()
            .init();

        let config = self.resolver_config()?;
        match self.command {
            Commands::Resolve(args) => commands::resolve::execute(args, &config),
            Commands::Batch(args) => commands::batch::execute(args, &config),
            Commands::CheckConfig(args) => commands::check_config::execute(args, &config),
        }
    }

    /// Configuration file values with command-line overrides applied.
    fn resolver_config(&self) -> Result<ResolverConfig> {
        let mut config = match &self.config {
            Some(path) => ResolverConfig::load(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => ResolverConfig::default(),
        };
        if let Some(capacity) = self.cache_capacity {
            config.cache_capacity = capacity;
        }
        if let Some(root) = &self.cache_root {
            config.cache_root = root.clone();
        }
        config.validate()?;
        Ok(config)
    }
}
