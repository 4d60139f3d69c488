//! # In-Repo Configuration Compiler
//!
//! Turns the job configuration stored inside a checked-out tree into a
//! structured [`JobSet`]. The compiler is a pure function of the tree content
//! and its static defaults, which is what makes a compiled result safe to cache
//! under the commits that produced the tree.
//!
//! ## Layout
//!
//! A repository keeps its jobs either in a single file (`.ci.yaml` by default)
//! or in a directory of YAML files (`.ci/` by default), never both. Every
//! document may carry a `presubmits` and a `postsubmits` list:
//!
//! ```yaml
//! presubmits:
//!   - name: unit
//!     always_run: true
//!     spec:
//!       containers:
//!         - image: alpine
//! ```
//!
//! Apart from `name`, a job is kept as an opaque mapping; the schema of the
//! job body belongs to the orchestrator consuming the result.

use std::collections::{BTreeMap, BTreeSet};

use glob::Pattern;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::error::{Error, Result};
use crate::tree::Tree;

/// Turns a checked-out tree into a job set.
///
/// Implementations must be deterministic: the same tree always compiles to the
/// same job set (or the same error).
pub trait ConfigCompiler: Send + Sync {
    fn compile(&self, tree: &Tree) -> Result<JobSet>;
}

/// One CI job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    /// Everything except `name`, including merged defaults.
    #[serde(flatten)]
    pub spec: Mapping,
}

impl Job {
    /// Look up a top-level field of the job body.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.spec.get(key)
    }
}

/// Compiled job configuration of one tree state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSet {
    #[serde(default)]
    pub presubmits: Vec<Job>,
    #[serde(default)]
    pub postsubmits: Vec<Job>,
}

impl JobSet {
    pub fn is_empty(&self) -> bool {
        self.presubmits.is_empty() && self.postsubmits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.presubmits.len() + self.postsubmits.len()
    }

    pub fn presubmit(&self, name: &str) -> Option<&Job> {
        self.presubmits.iter().find(|job| job.name == name)
    }

    pub fn postsubmit(&self, name: &str) -> Option<&Job> {
        self.postsubmits.iter().find(|job| job.name == name)
    }
}

/// Where the compiler looks for job configuration and which static defaults it
/// merges into every job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    /// Single-file form, relative to the repository root
    pub config_file: String,
    /// Directory form, relative to the repository root
    pub config_dir: String,
    /// Fields added to every job that does not set them itself
    pub job_defaults: BTreeMap<String, Value>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            config_file: ".ci.yaml".to_string(),
            config_dir: ".ci".to_string(),
            job_defaults: BTreeMap::new(),
        }
    }
}

/// Raw shape of one configuration document.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigDocument {
    #[serde(default)]
    presubmits: Vec<Mapping>,
    #[serde(default)]
    postsubmits: Vec<Mapping>,
}

/// The default compiler, reading the in-repo layout described in the module
/// docs.
#[derive(Debug, Clone, Default)]
pub struct InRepoCompiler {
    config: CompilerConfig,
}

impl InRepoCompiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Configuration files to read, in the order they are merged.
    fn config_paths<'a>(&'a self, tree: &'a Tree) -> Result<Vec<&'a str>> {
        let dir = Pattern::escape(self.config.config_dir.trim_end_matches('/'));
        let mut dir_files = tree.glob(&format!("{}/**/*.yaml", dir))?;
        dir_files.extend(tree.glob(&format!("{}/**/*.yml", dir))?);
        dir_files.sort_unstable();
        let has_file = tree.contains(&self.config.config_file);

        match (has_file, dir_files.is_empty()) {
            (true, false) => Err(Error::CompileFailure {
                path: None,
                message: format!(
                    "found both {} and {}/; use only one of them",
                    self.config.config_file, self.config.config_dir
                ),
            }),
            (true, true) => Ok(vec![self.config.config_file.as_str()]),
            (false, _) => Ok(dir_files),
        }
    }

    fn parse_document(path: &str, content: &str) -> Result<ConfigDocument> {
        let compile_err = |message: String| Error::CompileFailure {
            path: Some(path.to_string()),
            message,
        };
        let value: Value = serde_yaml::from_str(content).map_err(|e| compile_err(e.to_string()))?;
        if value.is_null() {
            return Ok(ConfigDocument::default());
        }
        serde_yaml::from_value(value).map_err(|e| compile_err(e.to_string()))
    }

    fn build_job(&self, path: &str, mut raw: Mapping) -> Result<Job> {
        let name = match raw.remove("name") {
            Some(Value::String(name)) if !name.trim().is_empty() => name,
            Some(_) => {
                return Err(Error::CompileFailure {
                    path: Some(path.to_string()),
                    message: "job name must be a non-empty string".to_string(),
                })
            }
            None => {
                return Err(Error::CompileFailure {
                    path: Some(path.to_string()),
                    message: "job is missing a name".to_string(),
                })
            }
        };

        for (key, value) in &self.config.job_defaults {
            if !raw.contains_key(key.as_str()) {
                raw.insert(Value::String(key.clone()), value.clone());
            }
        }

        Ok(Job { name, spec: raw })
    }

    fn collect(
        &self,
        kind: &str,
        path: &str,
        raw_jobs: Vec<Mapping>,
        seen: &mut BTreeSet<String>,
        out: &mut Vec<Job>,
    ) -> Result<()> {
        for raw in raw_jobs {
            let job = self.build_job(path, raw)?;
            if !seen.insert(job.name.clone()) {
                return Err(Error::CompileFailure {
                    path: Some(path.to_string()),
                    message: format!("duplicate {} name '{}'", kind, job.name),
                });
            }
            out.push(job);
        }
        Ok(())
    }
}

impl ConfigCompiler for InRepoCompiler {
    fn compile(&self, tree: &Tree) -> Result<JobSet> {
        let mut job_set = JobSet::default();
        let mut presubmit_names = BTreeSet::new();
        let mut postsubmit_names = BTreeSet::new();

        for path in self.config_paths(tree)? {
            let Some(content) = tree.read_to_string(path)? else {
                continue;
            };
            let document = Self::parse_document(path, &content)?;
            self.collect(
                "presubmit",
                path,
                document.presubmits,
                &mut presubmit_names,
                &mut job_set.presubmits,
            )?;
            self.collect(
                "postsubmit",
                path,
                document.postsubmits,
                &mut postsubmit_names,
                &mut job_set.postsubmits,
            )?;
        }

        job_set.presubmits.sort_by(|a, b| a.name.cmp(&b.name));
        job_set.postsubmits.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(job_set)
    }
}
