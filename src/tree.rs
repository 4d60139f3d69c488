//! In-memory snapshot of a checked-out repository tree
//!
//! A [`Tree`] is the handle a repository provider returns from
//! `fetch_and_checkout` and the only input a configuration compiler sees. Paths
//! are stored as `/`-separated strings relative to the repository root, in a
//! sorted map, so iteration order is deterministic.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use glob::Pattern;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Files of one tree state, keyed by repository-relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    files: BTreeMap<String, Vec<u8>>,
}

impl Tree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a working directory from disk, skipping the `.git` directory.
    pub fn load_dir(root: &Path) -> Result<Self> {
        Self::load_filtered(root, |_| true)
    }

    /// Load only the given repository-relative paths from a working directory.
    ///
    /// Each entry of `paths` names a file or a directory; a directory is loaded
    /// recursively. Directories that cannot contain a wanted path are never
    /// entered.
    pub fn load_paths<S: AsRef<str>>(root: &Path, paths: &[S]) -> Result<Self> {
        let wanted: Vec<&str> = paths
            .iter()
            .map(|p| p.as_ref().trim_start_matches("./").trim_matches('/'))
            .filter(|p| !p.is_empty())
            .collect();
        Self::load_filtered(root, |relative| {
            wanted.iter().any(|want| {
                relative == *want
                    || is_below(relative, want)
                    || is_below(want, relative)
            })
        })
    }

    fn load_filtered(root: &Path, keep: impl Fn(&str) -> bool) -> Result<Self> {
        let mut tree = Tree::new();

        let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            if entry.file_name() == ".git" {
                return false;
            }
            keep(&relative_key(root, entry.path()))
        });

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let key = relative_key(root, entry.path());
            tree.insert(key, fs::read(entry.path())?);
        }

        Ok(tree)
    }

    /// Add or replace a file
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) {
        let path = path.into();
        let path = path.trim_start_matches("./").trim_start_matches('/').to_string();
        self.files.insert(path, content.into());
    }

    /// Builder-style variant of [`Tree::insert`].
    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.insert(path, content);
        self
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// Read a file as UTF-8.
    ///
    /// Returns `Ok(None)` if the file does not exist.
    pub fn read_to_string(&self, path: &str) -> Result<Option<String>> {
        match self.files.get(path) {
            None => Ok(None),
            Some(bytes) => String::from_utf8(bytes.clone())
                .map(Some)
                .map_err(|e| Error::CompileFailure {
                    path: Some(path.to_string()),
                    message: format!("file is not valid UTF-8: {}", e),
                }),
        }
    }

    /// Paths matching a glob pattern, in sorted order.
    pub fn glob(&self, pattern: &str) -> Result<Vec<&str>> {
        let pattern = Pattern::new(pattern)?;
        Ok(self
            .files
            .keys()
            .filter(|path| pattern.matches(path))
            .map(String::as_str)
            .collect())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterate over all files as (path, content) pairs in path order.
    pub fn files(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(p, c)| (p.as_str(), c.as_slice()))
    }
}

/// `path` relative to `root`, as a `/`-separated key.
fn relative_key(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn is_below(path: &str, dir: &str) -> bool {
    path.strip_prefix(dir)
        .is_some_and(|rest| rest.starts_with('/'))
}
