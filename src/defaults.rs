//! Built-in settings used when neither the resolver config file nor the
//! command line provides a value.

use std::path::PathBuf;

/// Resolved commit sets kept before the least recently used one is evicted.
///
/// Each entry is one base commit plus one overlay set for one repository, so
/// this is roughly the number of open changes a busy CI frontend revisits.
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// How long one fetch, checkout, merge and compile may run before every
/// caller waiting on it gets `ResolutionTimedOut`.
pub const DEFAULT_RESOLUTION_TIMEOUT_SECS: u64 = 60;

/// Directory under which git mirrors and scratch worktrees are kept.
///
/// This is `config-resolver` inside the user's cache directory (for example
/// `~/.cache/config-resolver` on Linux). Without a cache directory, a relative
/// `.config-resolver-cache/config-resolver` is used so mirrors still survive
/// between runs in the same working directory.
pub fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".config-resolver-cache"))
        .join("config-resolver")
}
