//! Request and response types for callers outside the process.
//!
//! These are the JSON shapes the `batch` command reads and writes, one per
//! line. Symbolic refs in a request are turned into commit SHAs through the
//! resolver's provider before a cache key is built.

use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::key::RepositoryIdentity;
use crate::resolver::Resolver;
use crate::result::ResolutionResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveRequest {
    /// Organization URL, e.g. `https://github.com/acme`
    pub org_url: String,
    pub repo: String,
    /// Base commit SHA or a ref such as `main`
    pub base_ref: String,
    #[serde(default)]
    pub overlay_refs: Vec<String>,
    /// How long the caller is willing to wait; absent means no bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub kind: String,
    pub message: String,
}

impl From<&Error> for ErrorDescriptor {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Either the resolution or why there is none; never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveResponse {
    Ok(ResolutionResult),
    Error(ErrorDescriptor),
}

impl ResolveResponse {
    pub fn is_ok(&self) -> bool {
        matches!(self, ResolveResponse::Ok(_))
    }
}

impl From<Result<ResolutionResult>> for ResolveResponse {
    fn from(result: Result<ResolutionResult>) -> Self {
        match result {
            Ok(resolution) => ResolveResponse::Ok(resolution),
            Err(err) => ResolveResponse::Error(ErrorDescriptor::from(&err)),
        }
    }
}

/// Resolve one request against `resolver`.
pub fn handle(resolver: &Resolver, request: &ResolveRequest) -> ResolveResponse {
    resolve_request(resolver, request).into()
}

fn resolve_request(resolver: &Resolver, request: &ResolveRequest) -> Result<ResolutionResult> {
    let identity = RepositoryIdentity::from_org_url(&request.org_url, &request.repo)?;

    let mut refs = Vec::with_capacity(request.overlay_refs.len() + 1);
    refs.push(request.base_ref.clone());
    refs.extend(request.overlay_refs.iter().cloned());
    if let Some(empty) = refs.iter().position(|r| r.trim().is_empty()) {
        let field = if empty == 0 { "base_ref" } else { "overlay_refs" };
        return Err(Error::InvalidKeyInput {
            field: field.to_string(),
            message: "ref must not be empty".to_string(),
        });
    }

    let shas = resolver.provider().resolve_refs(&identity, &refs)?;
    let lookup = |r: &String| {
        shas.get(r).cloned().ok_or_else(|| Error::FetchFailure {
            url: identity.clone_url(),
            message: format!("ref '{}' was not resolved", r),
            hint: None,
        })
    };
    let base = lookup(&request.base_ref)?;
    let overlays = request
        .overlay_refs
        .iter()
        .map(lookup)
        .collect::<Result<Vec<_>>>()?;
    debug!(
        "request for {} resolved to {} + {} overlay(s)",
        identity,
        base,
        overlays.len()
    );

    let wait = request.timeout_ms.map(Duration::from_millis);
    let result = resolver.resolve_with_timeout(&identity, &base, &overlays, wait)?;
    Ok(ResolutionResult::clone(&result))
}
