//! # Repository Providers
//!
//! A [`RepositoryProvider`] turns a repository identity plus a set of commits
//! into a [`Tree`]: the base commit checked out with every overlay commit
//! merged on top. It also resolves symbolic refs (branches, change refs) to
//! commit SHAs so requests can be keyed by immutable commits.
//!
//! [`GitProvider`] is the production implementation. It keeps one bare mirror
//! per repository under the cache root and builds each tree in a throwaway
//! worktree that borrows the mirror's objects:
//!
//! ```text
//! <cache_root>/mirrors/<hash>-<repo>.git     shared, updated under a per-repo lock
//! <cache_root>/worktrees/<hash>-<n>          one per resolution, removed afterwards
//! ```
//!
//! The git commands themselves sit behind the [`GitOperations`] trait so the
//! provider's sequencing can be tested without a git binary.
//!
//! Every failure leaving the provider is a [`Error::FetchFailure`], whether it
//! came from git, the filesystem under the cache root or a poisoned lock.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::key::{is_commit_sha, RepositoryIdentity};
use crate::tree::Tree;

/// Source of repository contents.
pub trait RepositoryProvider: Send + Sync {
    /// Resolve each of `refs` to a commit SHA.
    ///
    /// Refs that already are commit SHAs map to themselves. A ref the remote
    /// does not know is a `FetchFailure`.
    fn resolve_refs(
        &self,
        identity: &RepositoryIdentity,
        refs: &[String],
    ) -> Result<BTreeMap<String, String>>;

    /// Materialize `base_sha` with every commit of `overlay_shas` merged on
    /// top, in the given order.
    fn fetch_and_checkout(
        &self,
        identity: &RepositoryIdentity,
        base_sha: &str,
        overlay_shas: &[String],
    ) -> Result<Tree>;
}

/// Trait for git operations - allows mocking in tests
pub trait GitOperations: Send + Sync {
    /// List remote refs matching `patterns` as (ref, sha) pairs.
    fn ls_remote(&self, url: &str, patterns: &[String]) -> Result<Vec<(String, String)>>;

    /// Make sure the mirror at `mirror` exists and holds every commit in `shas`.
    fn update_mirror(&self, url: &str, mirror: &Path, shas: &[String]) -> Result<()>;

    /// Create a worktree at `worktree` from `mirror` with `base_sha` checked out.
    fn prepare_worktree(&self, url: &str, mirror: &Path, worktree: &Path, base_sha: &str)
        -> Result<()>;

    /// Merge `sha` into the worktree's HEAD.
    fn merge(&self, url: &str, worktree: &Path, sha: &str) -> Result<()>;
}

/// The default implementation of `GitOperations`, which uses the system's
/// `git` command.
pub struct DefaultGitOperations;

impl GitOperations for DefaultGitOperations {
    fn ls_remote(&self, url: &str, patterns: &[String]) -> Result<Vec<(String, String)>> {
        crate::git::ls_remote(url, patterns)
    }

    fn update_mirror(&self, url: &str, mirror: &Path, shas: &[String]) -> Result<()> {
        crate::git::init_mirror(url, mirror)?;
        crate::git::fetch_commits(url, mirror, shas)
    }

    fn prepare_worktree(
        &self,
        url: &str,
        mirror: &Path,
        worktree: &Path,
        base_sha: &str,
    ) -> Result<()> {
        crate::git::shared_clone(url, mirror, worktree)?;
        crate::git::checkout(url, worktree, base_sha)
    }

    fn merge(&self, url: &str, worktree: &Path, sha: &str) -> Result<()> {
        crate::git::merge(url, worktree, sha)
    }
}

/// Removes a worktree directory when dropped, whatever the outcome.
struct WorktreeGuard(PathBuf);

impl Drop for WorktreeGuard {
    fn drop(&mut self) {
        if self.0.exists() {
            if let Err(e) = fs::remove_dir_all(&self.0) {
                warn!("failed to remove worktree {}: {}", self.0.display(), e);
            }
        }
    }
}

/// Provider backed by git mirrors under a cache root.
pub struct GitProvider {
    cache_root: PathBuf,
    git_ops: Box<dyn GitOperations>,
    /// Held only while some resolution is updating that mirror
    mirror_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
    worktree_seq: AtomicU64,
    /// Restricts the loaded tree to these paths; `None` loads everything
    load_paths: Option<Vec<String>>,
}

impl GitProvider {
    /// Create a provider using the system git binary.
    pub fn new(cache_root: PathBuf) -> Self {
        Self::with_operations(cache_root, Box::new(DefaultGitOperations))
    }

    /// Create a provider with custom git operations (useful for testing)
    pub fn with_operations(cache_root: PathBuf, git_ops: Box<dyn GitOperations>) -> Self {
        Self {
            cache_root,
            git_ops,
            mirror_locks: Mutex::new(HashMap::new()),
            worktree_seq: AtomicU64::new(0),
            load_paths: None,
        }
    }

    /// Only load these repository-relative files or directories from each
    /// checkout.
    pub fn with_load_paths<S: Into<String>>(
        mut self,
        paths: impl IntoIterator<Item = S>,
    ) -> Self {
        self.load_paths = Some(paths.into_iter().map(Into::into).collect());
        self
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    fn mirror_lock(&self, mirror: &Path) -> Result<Arc<Mutex<()>>> {
        let mut locks = self
            .mirror_locks
            .lock()
            .map_err(|_| Error::poisoned("mirror lock table"))?;
        Ok(Arc::clone(locks.entry(mirror.to_path_buf()).or_default()))
    }

    /// Drop the table entry for `mirror` once no other resolution holds it.
    fn release_mirror_lock(&self, mirror: &Path, lock: Arc<Mutex<()>>) -> Result<()> {
        let mut locks = self
            .mirror_locks
            .lock()
            .map_err(|_| Error::poisoned("mirror lock table"))?;
        // One reference in the table, one here
        if Arc::strong_count(&lock) == 2 {
            locks.remove(mirror);
        }
        Ok(())
    }

    fn update_mirror(&self, url: &str, mirror: &Path, wanted: &[String]) -> Result<()> {
        let lock = self.mirror_lock(mirror)?;
        let updated = match lock.lock() {
            Ok(_guard) => self.git_ops.update_mirror(url, mirror, wanted),
            Err(_) => Err(Error::poisoned("repository mirror")),
        };
        self.release_mirror_lock(mirror, lock)?;
        updated
    }

    fn checkout_tree(
        &self,
        identity: &RepositoryIdentity,
        url: &str,
        base_sha: &str,
        overlay_shas: &[String],
    ) -> Result<Tree> {
        let mirror = crate::git::mirror_path(&self.cache_root, url);

        let mut wanted = Vec::with_capacity(overlay_shas.len() + 1);
        wanted.push(base_sha.to_string());
        wanted.extend(overlay_shas.iter().cloned());
        self.update_mirror(url, &mirror, &wanted)?;

        let worktree = WorktreeGuard(self.next_worktree(url));
        self.git_ops
            .prepare_worktree(url, &mirror, &worktree.0, base_sha)?;
        for sha in overlay_shas {
            self.git_ops.merge(url, &worktree.0, sha)?;
        }

        debug!(
            "checked out {} with {} overlay(s) at {}",
            identity,
            overlay_shas.len(),
            worktree.0.display()
        );
        match &self.load_paths {
            Some(paths) => Tree::load_paths(&worktree.0, paths),
            None => Tree::load_dir(&worktree.0),
        }
    }

    fn next_worktree(&self, url: &str) -> PathBuf {
        let mut hasher = DefaultHasher::new();
        url.hash(&mut hasher);
        let seq = self.worktree_seq.fetch_add(1, Ordering::Relaxed);
        self.cache_root.join("worktrees").join(format!(
            "{:016x}-{}-{}",
            hasher.finish(),
            std::process::id(),
            seq
        ))
    }
}

/// Fold any provider-side error into the `FetchFailure` kind callers see.
fn as_fetch_failure(url: &str, err: Error) -> Error {
    match err {
        Error::FetchFailure { .. } => err,
        Error::Io(ref io) => Error::FetchFailure {
            url: url.to_string(),
            message: io.to_string(),
            hint: Some("check that the cache root is a writable directory".to_string()),
        },
        other => Error::FetchFailure {
            url: url.to_string(),
            message: other.to_string(),
            hint: None,
        },
    }
}

/// Pick the SHA for `requested` out of ls-remote output.
///
/// An exact ref name wins, then a branch, then a tag, then any ref ending in
/// `/<requested>`.
fn pick_ref<'a>(requested: &str, listed: &'a [(String, String)]) -> Option<&'a str> {
    let exact = |name: &str| {
        listed
            .iter()
            .find(|(r, _)| r == name)
            .map(|(_, sha)| sha.as_str())
    };
    exact(requested)
        .or_else(|| exact(&format!("refs/heads/{}", requested)))
        // Annotated tags list their peeled commit under `^{}`
        .or_else(|| exact(&format!("refs/tags/{}^{{}}", requested)))
        .or_else(|| exact(&format!("refs/tags/{}", requested)))
        .or_else(|| {
            let suffix = format!("/{}", requested);
            listed
                .iter()
                .find(|(r, _)| r.ends_with(&suffix))
                .map(|(_, sha)| sha.as_str())
        })
}

impl RepositoryProvider for GitProvider {
    fn resolve_refs(
        &self,
        identity: &RepositoryIdentity,
        refs: &[String],
    ) -> Result<BTreeMap<String, String>> {
        let mut resolved = BTreeMap::new();
        let mut symbolic = Vec::new();
        for r in refs {
            if is_commit_sha(r) {
                resolved.insert(r.clone(), r.to_ascii_lowercase());
            } else {
                symbolic.push(r.clone());
            }
        }
        if symbolic.is_empty() {
            return Ok(resolved);
        }

        let url = identity.clone_url();
        let listed = self
            .git_ops
            .ls_remote(&url, &symbolic)
            .map_err(|e| as_fetch_failure(&url, e))?;
        for name in symbolic {
            let sha = pick_ref(&name, &listed).ok_or_else(|| Error::FetchFailure {
                url: url.clone(),
                message: format!("ref '{}' not found", name),
                hint: None,
            })?;
            debug!("resolved {} to {}", name, sha);
            resolved.insert(name, sha.to_string());
        }
        Ok(resolved)
    }

    fn fetch_and_checkout(
        &self,
        identity: &RepositoryIdentity,
        base_sha: &str,
        overlay_shas: &[String],
    ) -> Result<Tree> {
        let url = identity.clone_url();
        self.checkout_tree(identity, &url, base_sha, overlay_shas)
            .map_err(|e| as_fetch_failure(&url, e))
    }
}
