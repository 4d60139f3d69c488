//! # Check-Config Command Implementation
//!
//! Compiles the job configuration found in a local directory with the
//! configured compiler, without touching git. Useful to validate a change to
//! `.ci.yaml` (or `.ci/`) before pushing it.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use config_resolver::compiler::{ConfigCompiler, InRepoCompiler};
use config_resolver::config::ResolverConfig;
use config_resolver::tree::Tree;

/// Compile the job configuration of a local directory
#[derive(Args, Debug)]
pub struct CheckConfigArgs {
    /// Repository checkout to read
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub dir: PathBuf,
}

/// Execute the `check-config` command.
pub fn execute(args: CheckConfigArgs, config: &ResolverConfig) -> Result<()> {
    let tree = Tree::load_dir(&args.dir)
        .with_context(|| format!("Failed to read {}", args.dir.display()))?;
    let compiler = InRepoCompiler::new(config.compiler.clone());
    let job_set = compiler.compile(&tree)?;

    println!(
        "Configuration OK: {} presubmit(s), {} postsubmit(s)",
        job_set.presubmits.len(),
        job_set.postsubmits.len()
    );
    super::print_job_set(&job_set);
    Ok(())
}
