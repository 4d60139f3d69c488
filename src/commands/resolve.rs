//! # Resolve Command Implementation
//!
//! Resolves one commit set (a base ref plus optional overlay refs) of a
//! repository and prints the resulting job names, or the full result as JSON.

use anyhow::{Context, Result};
use clap::Args;

use config_resolver::api::{self, ResolveRequest, ResolveResponse};
use config_resolver::config::ResolverConfig;
use config_resolver::resolver::Resolver;

/// Resolve the job configuration of one commit set
#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Organization URL, e.g. https://github.com/acme
    #[arg(long, value_name = "URL")]
    pub org: String,

    /// Repository name within the organization
    #[arg(long, value_name = "NAME")]
    pub repo: String,

    /// Base commit SHA or ref
    #[arg(long, value_name = "REF")]
    pub base: String,

    /// Commit SHA or ref to merge on top of the base (repeatable)
    #[arg(long = "overlay", value_name = "REF")]
    pub overlays: Vec<String>,

    /// Give up waiting after this many milliseconds
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Print the response as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute the `resolve` command.
pub fn execute(args: ResolveArgs, config: &ResolverConfig) -> Result<()> {
    let resolver = Resolver::from_config(config).context("Failed to set up resolver")?;
    let request = ResolveRequest {
        org_url: args.org,
        repo: args.repo,
        base_ref: args.base,
        overlay_refs: args.overlays,
        timeout_ms: args.timeout_ms,
    };

    let response = api::handle(&resolver, &request);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    }

    match response {
        ResolveResponse::Ok(result) => {
            if !args.json {
                println!(
                    "Resolved {}/{} at {}",
                    request.org_url.trim_end_matches('/'),
                    request.repo,
                    result.source_commits.join(" + ")
                );
                super::print_job_set(&result.job_set);
            }
            Ok(())
        }
        ResolveResponse::Error(descriptor) => {
            anyhow::bail!("{} ({})", descriptor.message, descriptor.kind)
        }
    }
}
