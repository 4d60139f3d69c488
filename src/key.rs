//! Cache keys for resolution requests
//!
//! A [`CacheKey`] names one combined tree state: a repository, a base commit and
//! a set of overlay commits layered on top of it. The overlay commits have set
//! semantics, so `[a, b]`, `[b, a]` and `[a, b, a]` all produce the same key.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// URL schemes a repository provider endpoint may use.
const ALLOWED_SCHEMES: &[&str] = &["http", "https", "ssh", "git", "file"];

/// Identifies which provider endpoint and logical repository a request targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepositoryIdentity {
    provider_base_url: String,
    organization: String,
    repository: String,
}

impl RepositoryIdentity {
    /// Create a validated identity.
    ///
    /// `provider_base_url` must be an absolute URL with a supported scheme; a
    /// trailing slash is dropped. `organization` and `repository` must be
    /// non-empty and free of whitespace. The organization may contain `/` for
    /// nested groups, the repository may not.
    pub fn new(provider_base_url: &str, organization: &str, repository: &str) -> Result<Self> {
        let base = provider_base_url.trim();
        if base.is_empty() {
            return Err(Error::invalid_key("provider_base_url", "must not be empty"));
        }
        let parsed = Url::parse(base)
            .map_err(|e| Error::invalid_key("provider_base_url", e.to_string()))?;
        if !ALLOWED_SCHEMES.contains(&parsed.scheme()) {
            return Err(Error::invalid_key(
                "provider_base_url",
                format!("unsupported scheme '{}'", parsed.scheme()),
            ));
        }

        let organization = organization.trim_matches('/');
        validate_segment("organization", organization)?;
        let repository = repository.trim_end_matches(".git");
        validate_segment("repository", repository)?;
        if repository.contains('/') {
            return Err(Error::invalid_key("repository", "must not contain '/'"));
        }

        Ok(Self {
            provider_base_url: base.trim_end_matches('/').to_string(),
            organization: organization.to_string(),
            repository: repository.to_string(),
        })
    }

    /// Build an identity from an organization URL such as
    /// `https://git.example.com/platform` and a repository name.
    ///
    /// The last path segment of the URL becomes the organization, everything
    /// before it the provider base URL.
    pub fn from_org_url(org_url: &str, repository: &str) -> Result<Self> {
        let trimmed = org_url.trim().trim_end_matches('/');
        let parsed =
            Url::parse(trimmed).map_err(|e| Error::invalid_key("org_url", e.to_string()))?;
        let organization = parsed
            .path()
            .trim_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default();
        let base = match trimmed.strip_suffix(organization) {
            Some(base) if !organization.is_empty() => base,
            _ => {
                return Err(Error::invalid_key(
                    "org_url",
                    "must end with an organization path segment",
                ))
            }
        };
        Self::new(base, organization, repository)
    }

    pub fn provider_base_url(&self) -> &str {
        &self.provider_base_url
    }

    pub fn organization(&self) -> &str {
        &self.organization
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// The URL a provider clones or fetches from.
    pub fn clone_url(&self) -> String {
        format!(
            "{}/{}/{}",
            self.provider_base_url, self.organization, self.repository
        )
    }
}

impl fmt::Display for RepositoryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.clone_url())
    }
}

fn validate_segment(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::invalid_key(field, "must not be empty"));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(Error::invalid_key(field, "must not contain whitespace"));
    }
    Ok(())
}

/// Returns true if `candidate` looks like a full SHA-1 or SHA-256 commit id.
pub fn is_commit_sha(candidate: &str) -> bool {
    matches!(candidate.len(), 40 | 64) && candidate.chars().all(|c| c.is_ascii_hexdigit())
}

/// Validate a commit id and normalize it to lowercase.
pub fn normalize_sha(field: &str, candidate: &str) -> Result<String> {
    let trimmed = candidate.trim();
    if trimmed.is_empty() {
        return Err(Error::invalid_key(field, "must not be empty"));
    }
    if !is_commit_sha(trimmed) {
        return Err(Error::invalid_key(
            field,
            format!("'{}' is not a 40 or 64 digit hex commit id", trimmed),
        ));
    }
    Ok(trimmed.to_ascii_lowercase())
}

/// Canonical cache key for one (repository, base, overlay set) combination.
///
/// Equality and hashing only see the canonical form: a validated identity, a
/// lowercase base SHA and the sorted, de-duplicated overlay SHAs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    identity: RepositoryIdentity,
    base_sha: String,
    overlay_shas: Vec<String>,
}

impl CacheKey {
    pub fn identity(&self) -> &RepositoryIdentity {
        &self.identity
    }

    pub fn base_sha(&self) -> &str {
        &self.base_sha
    }

    /// Overlay SHAs in canonical (sorted, unique) order.
    pub fn overlay_shas(&self) -> &[String] {
        &self.overlay_shas
    }

    /// Base SHA followed by the overlay SHAs.
    pub fn commits(&self) -> Vec<String> {
        std::iter::once(self.base_sha.clone())
            .chain(self.overlay_shas.iter().cloned())
            .collect()
    }

    /// Short form for log lines and thread names.
    pub fn short(&self) -> String {
        let mut out = format!(
            "{}/{}@{}",
            self.identity.organization,
            self.identity.repository,
            &self.base_sha[..8]
        );
        for sha in &self.overlay_shas {
            out.push('+');
            out.push_str(&sha[..8]);
        }
        out
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}/{}@{}",
            self.identity.provider_base_url,
            self.identity.organization,
            self.identity.repository,
            self.base_sha
        )?;
        if !self.overlay_shas.is_empty() {
            write!(f, "+{}", self.overlay_shas.join(","))?;
        }
        Ok(())
    }
}

/// Derive the canonical key for a resolution request.
///
/// Overlay SHAs are validated, lowercased, de-duplicated and sorted, so any two
/// collections holding the same set of commits produce identical keys.
pub fn build_key<S: AsRef<str>>(
    identity: &RepositoryIdentity,
    base_sha: &str,
    overlay_shas: &[S],
) -> Result<CacheKey> {
    let base_sha = normalize_sha("base_sha", base_sha)?;
    let overlay_shas = overlay_shas
        .iter()
        .map(|sha| normalize_sha("overlay_shas", sha.as_ref()))
        .collect::<Result<BTreeSet<_>>>()?
        .into_iter()
        .collect();

    Ok(CacheKey {
        identity: identity.clone(),
        base_sha,
        overlay_shas,
    })
}
