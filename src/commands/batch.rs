//! # Batch Command Implementation
//!
//! Reads one JSON `ResolveRequest` per line, resolves all of them concurrently
//! against a single shared resolver and writes one JSON `ResolveResponse` per
//! line, in input order. Requests for the same commit set share one fetch.
//!
//! A request that fails (or cannot be parsed) produces an error response; the
//! command itself only fails on I/O problems.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use log::info;
use rayon::prelude::*;

use config_resolver::api::{self, ErrorDescriptor, ResolveRequest, ResolveResponse};
use config_resolver::config::ResolverConfig;
use config_resolver::error::Error;
use config_resolver::resolver::Resolver;

/// Resolve JSON-lines requests concurrently
#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Request file; reads stdin when omitted
    #[arg(long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Number of requests resolved at the same time
    #[arg(long, value_name = "N")]
    pub jobs: Option<usize>,
}

/// Execute the `batch` command.
pub fn execute(args: BatchArgs, config: &ResolverConfig) -> Result<()> {
    let reader: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };
    let lines = reader
        .lines()
        .collect::<io::Result<Vec<_>>>()
        .context("Failed to read requests")?;
    let lines: Vec<String> = lines
        .into_iter()
        .filter(|line| !line.trim().is_empty())
        .collect();

    let resolver = Resolver::from_config(config).context("Failed to set up resolver")?;

    let mut pool = rayon::ThreadPoolBuilder::new();
    if let Some(jobs) = args.jobs {
        pool = pool.num_threads(jobs);
    }
    let pool = pool.build().context("Failed to start worker pool")?;

    info!("resolving {} request(s)", lines.len());
    let responses: Vec<String> = pool.install(|| {
        lines
            .par_iter()
            .map(|line| render(&respond(&resolver, line)))
            .collect()
    });

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for response in &responses {
        writeln!(out, "{}", response)?;
    }
    out.flush()?;

    let stats = resolver.stats()?;
    eprintln!(
        "{} request(s): {} hit(s), {} miss(es), {} fetch(es), {} joined, {} failure(s), {} cached",
        responses.len(),
        stats.hits + stats.late_hits,
        stats.misses.saturating_sub(stats.late_hits),
        stats.flights_started,
        stats.flights_joined,
        stats.failures,
        stats.cached_entries
    );
    Ok(())
}

fn respond(resolver: &Resolver, line: &str) -> ResolveResponse {
    match serde_json::from_str::<ResolveRequest>(line) {
        Ok(request) => api::handle(resolver, &request),
        Err(e) => ResolveResponse::Error(ErrorDescriptor::from(&Error::from(e))),
    }
}

fn render(response: &ResolveResponse) -> String {
    serde_json::to_string(response).unwrap_or_else(|e| {
        let descriptor = ErrorDescriptor::from(&Error::from(e));
        // A descriptor is two strings and always serializes
        serde_json::to_string(&ResolveResponse::Error(descriptor)).unwrap_or_default()
    })
}
