//! The value a resolution produces

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::compiler::JobSet;

/// Compiled job set of one tree state plus where and when it came from.
///
/// Shared between callers as `Arc<ResolutionResult>` and never mutated after
/// it has been built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub job_set: JobSet,
    pub resolved_at: DateTime<Utc>,
    /// Base commit first, then the overlay commits in canonical order
    pub source_commits: Vec<String>,
}

impl ResolutionResult {
    pub fn new(job_set: JobSet, source_commits: Vec<String>) -> Self {
        Self {
            job_set,
            resolved_at: Utc::now(),
            source_commits,
        }
    }
}
