//! # Config Resolver Library
//!
//! This library resolves the in-repo CI job configuration of a repository at a
//! given commit set: a base commit with zero or more overlay commits (pending
//! changes) merged on top. Results are cached in memory, and concurrent
//! requests for the same commit set share a single fetch and compile.
//!
//! ## Quick Example
//!
//! ```
//! use config_resolver::compiler::{ConfigCompiler, InRepoCompiler};
//! use config_resolver::key::{build_key, RepositoryIdentity};
//! use config_resolver::tree::Tree;
//!
//! // Overlay order does not matter for the cache key
//! let repo = RepositoryIdentity::new("https://github.com", "acme", "infra").unwrap();
//! let base = "a".repeat(40);
//! let (o1, o2) = ("b".repeat(40), "c".repeat(40));
//! let k1 = build_key(&repo, &base, &[&o1, &o2]).unwrap();
//! let k2 = build_key(&repo, &base, &[&o2, &o1]).unwrap();
//! assert_eq!(k1, k2);
//!
//! // Compile the job configuration of an in-memory tree
//! let tree = Tree::new().with_file(".ci.yaml", "presubmits:\n  - name: unit\n");
//! let jobs = InRepoCompiler::default().compile(&tree).unwrap();
//! assert_eq!(jobs.presubmits[0].name, "unit");
//! ```
//!
//! ## Core Concepts
//!
//! - **Cache keys (`key`)**: A canonical form of {repository, base commit,
//!   set of overlay commits}.
//! - **Bounded store (`store`)**: A size-bounded LRU map of completed results.
//! - **Coordinator (`coordinator`)**: Single-flight execution, so one fetch
//!   and compile per key no matter how many callers ask at once.
//! - **Resolver (`resolver`)**: The frontend tying key building, store lookup
//!   and the coordinator together.
//! - **Providers (`repository`, `git`)**: Fetch commits and materialize the
//!   merged tree, backed by git mirrors on disk.
//! - **Compiler (`compiler`)**: Turns a tree into a job set.
//! - **Boundary types (`api`)**: JSON request/response shapes for callers
//!   outside the process.

pub mod api;
pub mod compiler;
pub mod config;
pub mod coordinator;
pub mod defaults;
pub mod error;
pub mod git;
pub mod key;
pub mod repository;
pub mod resolver;
pub mod result;
pub mod store;
pub mod tree;

#[cfg(test)]
mod key_proptest;
#[cfg(test)]
mod store_proptest;
