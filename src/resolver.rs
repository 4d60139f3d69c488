//! # Resolver Frontend
//!
//! The entry point for resolving a repository state to its job set. A
//! [`Resolver`] owns the store, the coordinator and the two collaborators that
//! do the actual work:
//!
//! ```text
//! resolve ─► build_key ─► store hit? ── yes ─► shared result
//!                              │
//!                              no
//!                              ▼
//!                         coordinator ─► provider.fetch_and_checkout ─► compiler.compile
//! ```
//!
//! A `Resolver` is `Send + Sync` and meant to be shared by every request
//! thread of the process.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use serde::Serialize;

use crate::compiler::{ConfigCompiler, InRepoCompiler};
use crate::config::ResolverConfig;
use crate::coordinator::{Coordinator, ResultStore};
use crate::error::Result;
use crate::key::{build_key, CacheKey, RepositoryIdentity};
use crate::repository::{GitProvider, RepositoryProvider};
use crate::result::ResolutionResult;
use crate::store::BoundedStore;

/// Counters describing how requests were served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    /// Requests answered by the frontend store lookup
    pub hits: u64,
    /// Requests handed to the coordinator
    pub misses: u64,
    /// Misses answered from the store by the coordinator's re-check
    pub late_hits: u64,
    pub flights_started: u64,
    pub flights_joined: u64,
    pub failures: u64,
    pub evictions: u64,
    pub cached_entries: usize,
    pub in_flight: usize,
}

pub struct Resolver {
    provider: Arc<dyn RepositoryProvider>,
    compiler: Arc<dyn ConfigCompiler>,
    coordinator: Coordinator,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Resolver {
    pub fn new(
        provider: Arc<dyn RepositoryProvider>,
        compiler: Arc<dyn ConfigCompiler>,
        capacity: NonZeroUsize,
        resolution_timeout: Option<Duration>,
    ) -> Self {
        let store: Arc<ResultStore> = Arc::new(BoundedStore::new(capacity));
        Self {
            provider,
            compiler,
            coordinator: Coordinator::new(store, resolution_timeout),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Build a resolver with the git provider and in-repo compiler described
    /// by `config`.
    pub fn from_config(config: &ResolverConfig) -> Result<Self> {
        config.validate()?;
        // The compiler never looks outside its two configuration locations
        let provider = GitProvider::new(config.cache_root.clone()).with_load_paths([
            config.compiler.config_file.clone(),
            config.compiler.config_dir.clone(),
        ]);
        Ok(Self::new(
            Arc::new(provider),
            Arc::new(InRepoCompiler::new(config.compiler.clone())),
            config.capacity()?,
            config.resolution_timeout(),
        ))
    }

    pub fn provider(&self) -> &Arc<dyn RepositoryProvider> {
        &self.provider
    }

    /// Resolve the job set for `base_sha` with `overlay_shas` merged on top,
    /// waiting as long as the computation takes.
    pub fn resolve<S: AsRef<str>>(
        &self,
        identity: &RepositoryIdentity,
        base_sha: &str,
        overlay_shas: &[S],
    ) -> Result<Arc<ResolutionResult>> {
        self.resolve_with_timeout(identity, base_sha, overlay_shas, None)
    }

    /// Like [`Resolver::resolve`], but gives up after `wait` with
    /// `Error::Timeout`. The computation itself keeps running and still
    /// populates the store.
    pub fn resolve_with_timeout<S: AsRef<str>>(
        &self,
        identity: &RepositoryIdentity,
        base_sha: &str,
        overlay_shas: &[S],
        wait: Option<Duration>,
    ) -> Result<Arc<ResolutionResult>> {
        let key = build_key(identity, base_sha, overlay_shas)?;

        if let Some(cached) = self.coordinator.store().get(&key)? {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("cache hit for {}", key.short());
            return Ok(cached);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let provider = Arc::clone(&self.provider);
        let compiler = Arc::clone(&self.compiler);
        self.coordinator.resolve(key, wait, move |key: &CacheKey| {
            let tree =
                provider.fetch_and_checkout(key.identity(), key.base_sha(), key.overlay_shas())?;
            let job_set = compiler.compile(&tree)?;
            Ok(ResolutionResult::new(job_set, key.commits()))
        })
    }

    pub fn stats(&self) -> Result<ResolverStats> {
        let coordinator = self.coordinator.stats();
        Ok(ResolverStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            late_hits: coordinator.late_hits,
            flights_started: coordinator.flights_started,
            flights_joined: coordinator.flights_joined,
            failures: coordinator.failures,
            evictions: coordinator.evictions,
            cached_entries: self.coordinator.store().len()?,
            in_flight: coordinator.in_flight,
        })
    }
}
