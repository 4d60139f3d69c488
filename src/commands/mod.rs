//! # CLI Command Implementations
//!
//! Each subcommand of the `config-resolver` command-line tool lives in its
//! own file and contains:
//! - An `Args` struct that defines the command-specific arguments and options,
//!   derived using `clap`.
//! - An `execute` function that takes the parsed `Args` plus the resolved
//!   service configuration and calls into the `config_resolver` library.

pub mod batch;
pub mod check_config;
pub mod resolve;

use config_resolver::compiler::JobSet;

/// Print job names grouped by kind.
pub(crate) fn print_job_set(job_set: &JobSet) {
    if job_set.is_empty() {
        println!("No jobs configured.");
        return;
    }
    for (kind, jobs) in [
        ("presubmits", &job_set.presubmits),
        ("postsubmits", &job_set.postsubmits),
    ] {
        if jobs.is_empty() {
            continue;
        }
        println!("{}:", kind);
        for job in jobs {
            println!("  {}", job.name);
        }
    }
}
