//! # Service Configuration
//!
//! `ResolverConfig` is read from a YAML file. Every field is optional and
//! falls back to the defaults below, so an empty file is a valid
//! configuration:
//!
//! ```yaml
//! cache_capacity: 1000          # completed resolutions kept in memory
//! resolution_timeout_secs: 60   # bound on fetch + compile, 0 disables
//! cache_root: ~/.cache/config-resolver
//! compiler:
//!   config_file: .ci.yaml
//!   config_dir: .ci
//!   job_defaults:
//!     timeout: 2h
//! ```

use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::compiler::CompilerConfig;
use crate::defaults::{
    default_cache_root, DEFAULT_CACHE_CAPACITY, DEFAULT_RESOLUTION_TIMEOUT_SECS,
};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    /// Maximum number of resolution results kept in the store
    pub cache_capacity: usize,
    /// Per-resolution bound in seconds; 0 means unbounded
    pub resolution_timeout_secs: u64,
    /// Root of the git mirrors and temporary worktrees
    pub cache_root: PathBuf,
    pub compiler: CompilerConfig,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            resolution_timeout_secs: DEFAULT_RESOLUTION_TIMEOUT_SECS,
            cache_root: default_cache_root(),
            compiler: CompilerConfig::default(),
        }
    }
}

impl ResolverConfig {
    /// Parse a configuration from YAML. An empty document yields the defaults.
    pub fn parse(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Option<Self> = serde_yaml::from_str(yaml).map_err(|e| Error::Config {
            message: format!("invalid configuration: {}", e),
            hint: None,
        })?;
        Ok(config.unwrap_or_default())
    }

    /// Read and parse the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {}", path.display(), e),
            hint: Some("pass an existing file with --config".to_string()),
        })?;
        Self::parse(&content)
    }

    /// Check values that deserialize fine but cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            return Err(Error::Config {
                message: "cache_capacity must be at least 1".to_string(),
                hint: None,
            });
        }
        if self.cache_root.as_os_str().is_empty() {
            return Err(Error::Config {
                message: "cache_root must not be empty".to_string(),
                hint: None,
            });
        }
        if self.compiler.config_file.trim().is_empty() {
            return Err(Error::Config {
                message: "compiler.config_file must not be empty".to_string(),
                hint: None,
            });
        }
        if self.compiler.config_dir.trim().is_empty() {
            return Err(Error::Config {
                message: "compiler.config_dir must not be empty".to_string(),
                hint: None,
            });
        }
        Ok(())
    }

    pub fn capacity(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.cache_capacity).ok_or_else(|| Error::Config {
            message: "cache_capacity must be at least 1".to_string(),
            hint: None,
        })
    }

    /// The per-resolution bound, or `None` when disabled.
    pub fn resolution_timeout(&self) -> Option<Duration> {
        match self.resolution_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
