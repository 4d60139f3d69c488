//! # Error Handling
//!
//! This module defines the centralized error type for the resolver. It uses the
//! `thiserror` library to build a single `Error` enum covering every failure mode
//! a caller can observe, with contextual fields to aid debugging.
//!
//! ## Key Components
//!
//! - **`Error`**: The main enum. The resolution-facing variants are
//!   `InvalidKeyInput`, `FetchFailure`, `CompileFailure`, `Timeout` and
//!   `ResolutionTimedOut`; the remaining variants cover configuration, I/O and
//!   parsing problems in the surrounding service.
//!
//! - **`Result<T>`**: A type alias for `std::result::Result<T, Error>`.
//!
//! ## Fan-out
//!
//! One failed resolution is delivered to every caller waiting on it, so `Error`
//! is `Clone`. Foreign error types that are not `Clone` themselves (I/O, YAML,
//! JSON, glob) are held behind an `Arc`.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

fn hint_suffix(hint: &Option<String>) -> String {
    hint.as_ref()
        .map(|h| format!("\n  hint: {}", h))
        .unwrap_or_default()
}

/// Main error type for resolver operations
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// A repository identity or commit SHA was malformed. Raised before any I/O.
    #[error("Invalid key input for {field}: {message}")]
    InvalidKeyInput { field: String, message: String },

    /// The repository provider could not resolve refs or retrieve objects.
    ///
    /// Covers network, authentication and not-found failures.
    #[error("Fetch failure for {url}: {message}{}", hint_suffix(hint))]
    FetchFailure {
        url: String,
        message: String,
        /// Optional hint for how to resolve the fetch issue
        hint: Option<String>,
    },

    /// The checked-out tree did not produce a valid job set.
    #[error("Compile failure{}: {message}", path.as_ref().map(|p| format!(" in {}", p)).unwrap_or_default())]
    CompileFailure {
        /// Repository-relative file that failed, when known
        path: Option<String>,
        message: String,
    },

    /// A caller stopped waiting for a shared computation that was still running.
    #[error("Timed out after {waited:?} waiting for resolution of {key}")]
    Timeout { key: String, waited: Duration },

    /// The fetch and compile chain for a key ran past the resolution bound.
    #[error("Resolution of {key} exceeded the {limit:?} limit")]
    ResolutionTimedOut { key: String, limit: Duration },

    /// A resolution worker died without producing an outcome.
    #[error("Internal error: {message}")]
    Internal { message: String },

    /// The service configuration is invalid.
    #[error("Configuration error: {message}{}", hint_suffix(hint))]
    Config {
        message: String,
        /// Optional hint for how to fix the configuration
        hint: Option<String>,
    },

    /// An I/O error, wrapped from `std::io::Error` or a failed directory walk.
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(Arc<serde_yaml::Error>),

    /// A JSON (de)serialization error, wrapped from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(Arc<serde_json::Error>),

    /// A glob pattern error, wrapped from `glob::PatternError`.
    #[error("Glob pattern error: {0}")]
    Glob(Arc<glob::PatternError>),

    /// An error indicating that a mutex has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },
}

impl Error {
    /// Stable, machine-readable name of the variant.
    ///
    /// Used as the `kind` of an error descriptor at the network boundary.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidKeyInput { .. } => "invalid_key_input",
            Error::FetchFailure { .. } => "fetch_failure",
            Error::CompileFailure { .. } => "compile_failure",
            Error::Timeout { .. } => "timeout",
            Error::ResolutionTimedOut { .. } => "resolution_timed_out",
            Error::Internal { .. } => "internal",
            Error::Config { .. } => "config",
            Error::Io(_) => "io",
            Error::Yaml(_) => "yaml",
            Error::Json(_) => "json",
            Error::Glob(_) => "glob",
            Error::LockPoisoned { .. } => "lock_poisoned",
        }
    }

    pub(crate) fn invalid_key(field: &str, message: impl Into<String>) -> Self {
        Error::InvalidKeyInput {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn poisoned(context: &str) -> Self {
        Error::LockPoisoned {
            context: context.to_string(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        Error::Io(Arc::new(err.into()))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Yaml(Arc::new(err))
    }
}

impl From<glob::PatternError> for Error {
    fn from(err: glob::PatternError) -> Self {
        Error::Glob(Arc::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(Arc::new(err))
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
