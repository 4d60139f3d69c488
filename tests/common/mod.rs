//! Shared test utilities for integration and E2E tests.
//!
//! This module provides mock collaborators, fixtures and helper functions to
//! reduce duplication across test files.
//!
//! ## Usage
//!
//! Add `mod common;` to your test file, then use the helpers:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! let provider = Arc::new(MockProvider::new(configs::TWO_PRESUBMITS));
//! let resolver = resolver_with(provider.clone(), 16);
//! ```

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use config_resolver::compiler::InRepoCompiler;
use config_resolver::error::{Error, Result};
use config_resolver::key::RepositoryIdentity;
use config_resolver::repository::RepositoryProvider;
use config_resolver::resolver::Resolver;
use config_resolver::tree::Tree;

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    #[allow(unused_imports)]
    pub use assert_cmd::cargo::cargo_bin_cmd;
    #[allow(unused_imports)]
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use assert_fs::TempDir;
    #[allow(unused_imports)]
    pub use predicates::prelude::*;

    pub use super::configs;
    pub use super::{identity, resolver_with, sha, Gate, MockProvider};
}

/// Common job configuration snippets for testing.
pub mod configs {
    /// Two presubmits, one postsubmit.
    pub const TWO_PRESUBMITS: &str = r#"
presubmits:
  - name: unit
    command: [make, test]
  - name: lint
    command: [make, lint]
postsubmits:
  - name: deploy
    command: [make, deploy]
"#;

    /// Same job listed twice.
    pub const DUPLICATE: &str = r#"
presubmits:
  - name: unit
  - name: unit
"#;

    /// Not YAML at all.
    pub const INVALID_YAML: &str = "presubmits: [unclosed";
}

/// A valid 40-digit SHA built from one repeated hex digit and a number.
///
/// `sha('a', 7)` is `aaaa...0007`.
pub fn sha(fill: char, n: usize) -> String {
    let suffix = format!("{:04x}", n);
    let mut s: String = std::iter::repeat(fill).take(40 - suffix.len()).collect();
    s.push_str(&suffix);
    s
}

pub fn identity() -> RepositoryIdentity {
    RepositoryIdentity::new("https://git.example.com", "platform", "infra")
        .expect("valid identity")
}

pub fn resolver_with(provider: Arc<MockProvider>, capacity: usize) -> Resolver {
    Resolver::new(
        provider,
        Arc::new(InRepoCompiler::default()),
        NonZeroUsize::new(capacity).expect("non-zero capacity"),
        None,
    )
}

/// A latch that holds fetches until opened.
#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    pub fn wait(&self) {
        let guard = self.open.lock().unwrap();
        let _open = self.cond.wait_while(guard, |open| !*open).unwrap();
    }

    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.cond.notify_all();
    }
}

/// Repository provider serving one configurable `.ci.yaml` for every commit
/// set, counting fetches.
pub struct MockProvider {
    config: Mutex<String>,
    fail_with: Mutex<Option<String>>,
    fetches: AtomicUsize,
    gate: Option<Arc<Gate>>,
    fetched: Mutex<Vec<Vec<String>>>,
}

impl MockProvider {
    pub fn new(config: &str) -> Self {
        Self {
            config: Mutex::new(config.to_string()),
            fail_with: Mutex::new(None),
            fetches: AtomicUsize::new(0),
            gate: None,
            fetched: Mutex::new(Vec::new()),
        }
    }

    /// Block every fetch until `gate` opens.
    pub fn gated(config: &str, gate: Arc<Gate>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(config)
        }
    }

    pub fn set_config(&self, config: &str) {
        *self.config.lock().unwrap() = config.to_string();
    }

    /// Make fetches fail with `message`, or succeed again with `None`.
    pub fn set_failure(&self, message: Option<&str>) {
        *self.fail_with.lock().unwrap() = message.map(str::to_string);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Commit lists passed to `fetch_and_checkout`, in call order.
    pub fn fetched(&self) -> Vec<Vec<String>> {
        self.fetched.lock().unwrap().clone()
    }
}

impl RepositoryProvider for MockProvider {
    fn resolve_refs(
        &self,
        _identity: &RepositoryIdentity,
        refs: &[String],
    ) -> Result<BTreeMap<String, String>> {
        refs.iter()
            .map(|r| {
                let resolved = match r.as_str() {
                    "main" => sha('a', 0),
                    other if other.starts_with("refs/changes/") => {
                        sha('c', other.len())
                    }
                    other if other.len() == 40 => other.to_string(),
                    other => {
                        return Err(Error::FetchFailure {
                            url: "mock".to_string(),
                            message: format!("ref '{}' not found", other),
                            hint: None,
                        })
                    }
                };
                Ok((r.clone(), resolved))
            })
            .collect()
    }

    fn fetch_and_checkout(
        &self,
        identity: &RepositoryIdentity,
        base_sha: &str,
        overlay_shas: &[String],
    ) -> Result<Tree> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let mut commits = vec![base_sha.to_string()];
        commits.extend(overlay_shas.iter().cloned());
        self.fetched.lock().unwrap().push(commits);

        if let Some(gate) = &self.gate {
            gate.wait();
        }
        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(Error::FetchFailure {
                url: identity.clone_url(),
                message,
                hint: None,
            });
        }
        let config = self.config.lock().unwrap().clone();
        Ok(Tree::new().with_file(".ci.yaml", config))
    }
}

/// Returns true if network-dependent tests should be skipped.
pub fn should_skip_network_tests() -> bool {
    std::env::var("SKIP_NETWORK_TESTS").is_ok()
}

/// Run git in `dir`, panicking with its stderr on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args([
            "-c",
            "user.name=Test",
            "-c",
            "user.email=test@example.com",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Commit every file in `dir` with `message` and return the new HEAD SHA.
pub fn commit_all(dir: &Path, message: &str) -> String {
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "--quiet", "-m", message]);
    git(dir, &["rev-parse", "HEAD"])
}
