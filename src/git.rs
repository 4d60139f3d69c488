//! Thin wrappers around the system `git` binary
//!
//! Using the system command means authentication works the way it does for
//! the user running the service:
//! - SSH keys from ~/.ssh/
//! - Git credential helpers
//! - Personal access tokens
//! - Any authentication configured in ~/.gitconfig

use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::process::Command;

use log::debug;

use crate::error::{Error, Result};

/// Identity used for the merge commits created when layering overlays.
const MERGE_IDENTITY: [&str; 4] = [
    "-c",
    "user.name=config-resolver",
    "-c",
    "user.email=config-resolver@localhost",
];

/// Prefix of the refs that pin fetched commits inside a mirror.
const KEEP_REF_PREFIX: &str = "refs/resolver/keep";

fn auth_hint(stderr: &str) -> Option<String> {
    if stderr.contains("Authentication failed")
        || stderr.contains("Permission denied")
        || stderr.contains("Could not read from remote repository")
    {
        Some(
            "make sure the service has access to the repository: an SSH key in \
             ssh-agent, configured git credentials or a personal access token"
                .to_string(),
        )
    } else {
        None
    }
}

/// Run git with `args`, optionally inside `dir`, returning stdout.
///
/// Failures become `FetchFailure` attributed to `url`.
fn run(url: &str, dir: Option<&Path>, args: &[&str]) -> Result<String> {
    let mut command = Command::new("git");
    if let Some(dir) = dir {
        command.arg("-C").arg(dir);
    }
    command.args(args);
    // Never block on an interactive credential prompt
    command.env("GIT_TERMINAL_PROMPT", "0");
    debug!("git {}", args.join(" "));

    let output = command.output().map_err(|e| Error::FetchFailure {
        url: url.to_string(),
        message: format!("failed to run git: {}", e),
        hint: Some("is git installed and on PATH?".to_string()),
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(Error::FetchFailure {
            url: url.to_string(),
            message: format!("git {} failed: {}", args.first().unwrap_or(&""), stderr),
            hint: auth_hint(&stderr),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Directory of the bare mirror for `url` under `cache_root`.
pub fn mirror_path(cache_root: &Path, url: &str) -> PathBuf {
    // Hash the URL for a filesystem-safe directory name
    let mut hasher = DefaultHasher::new();
    url.hash(&mut hasher);
    let name = url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("repo")
        .replace(|c: char| !c.is_ascii_alphanumeric() && c != '-' && c != '_', "-");
    cache_root
        .join("mirrors")
        .join(format!("{:016x}-{}.git", hasher.finish(), name))
}

/// List remote refs matching `patterns` as (ref, sha) pairs.
pub fn ls_remote(url: &str, patterns: &[String]) -> Result<Vec<(String, String)>> {
    let mut args = vec!["ls-remote", "--", url];
    args.extend(patterns.iter().map(String::as_str));
    let stdout = run(url, None, &args)?;

    Ok(stdout
        .lines()
        .filter_map(|line| {
            // Format: <sha>\t<ref>
            let (sha, name) = line.split_once('\t')?;
            Some((name.to_string(), sha.to_string()))
        })
        .collect())
}

/// Create an empty bare mirror of `url` at `dir` unless one already exists.
pub fn init_mirror(url: &str, dir: &Path) -> Result<()> {
    if dir.join("HEAD").exists() {
        return Ok(());
    }
    if let Some(parent) = dir.parent() {
        fs::create_dir_all(parent)?;
    }
    let dir_str = dir.to_string_lossy();
    run(url, None, &["init", "--bare", "--quiet", &dir_str])?;
    run(url, Some(dir), &["remote", "add", "origin", url])?;
    Ok(())
}

/// Returns true if the repository at `dir` has commit `sha`.
pub fn has_commit(dir: &Path, sha: &str) -> bool {
    let spec = format!("{}^{{commit}}", sha);
    Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(["cat-file", "-e", &spec])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Fetch `shas` into the mirror at `dir` and pin them with keep refs.
///
/// Fetching by SHA needs server support; when the server refuses, all branch,
/// change and pull refs are fetched instead and the SHAs looked up locally.
pub fn fetch_commits(url: &str, dir: &Path, shas: &[String]) -> Result<()> {
    let missing: Vec<&str> = shas
        .iter()
        .map(String::as_str)
        .filter(|sha| !has_commit(dir, sha))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    let mut args = vec!["fetch", "--quiet", "--no-tags", "origin"];
    args.extend(missing.iter().copied());
    if let Err(by_sha) = run(url, Some(dir), &args) {
        debug!("fetch by SHA from {} refused, fetching refs: {}", url, by_sha);
        run(
            url,
            Some(dir),
            &[
                "fetch",
                "--quiet",
                "--no-tags",
                "origin",
                "+refs/heads/*:refs/heads/*",
                "+refs/changes/*:refs/changes/*",
                "+refs/pull/*:refs/pull/*",
            ],
        )?;
    }

    for sha in &missing {
        if !has_commit(dir, sha) {
            return Err(Error::FetchFailure {
                url: url.to_string(),
                message: format!("commit {} not found", sha),
                hint: Some("check that the commit has been pushed".to_string()),
            });
        }
        let keep_ref = format!("{}/{}", KEEP_REF_PREFIX, sha);
        run(url, Some(dir), &["update-ref", &keep_ref, sha])?;
    }
    Ok(())
}

/// Clone the mirror at `mirror` into `worktree`, borrowing its objects
/// through alternates instead of copying them.
pub fn shared_clone(url: &str, mirror: &Path, worktree: &Path) -> Result<()> {
    if worktree.exists() {
        fs::remove_dir_all(worktree)?;
    }
    if let Some(parent) = worktree.parent() {
        fs::create_dir_all(parent)?;
    }
    let mirror_str = mirror.to_string_lossy();
    let worktree_str = worktree.to_string_lossy();
    run(
        url,
        None,
        &[
            "clone",
            "--shared",
            "--no-checkout",
            "--quiet",
            &mirror_str,
            &worktree_str,
        ],
    )?;
    Ok(())
}

/// Check out `sha` as a detached HEAD.
pub fn checkout(url: &str, worktree: &Path, sha: &str) -> Result<()> {
    run(url, Some(worktree), &["checkout", "--quiet", "--detach", sha])?;
    Ok(())
}

/// Merge `sha` into the current HEAD of `worktree`.
pub fn merge(url: &str, worktree: &Path, sha: &str) -> Result<()> {
    let mut args: Vec<&str> = MERGE_IDENTITY.to_vec();
    args.extend(["merge", "--no-edit", "--no-ff", "--quiet", sha]);
    run(url, Some(worktree), &args).map_err(|e| match e {
        Error::FetchFailure { url, message, .. } => Error::FetchFailure {
            url,
            message: format!("could not merge {}: {}", sha, message),
            hint: Some("the overlay commits do not merge cleanly onto the base".to_string()),
        },
        other => other,
    })?;
    Ok(())
}
