//! Per-run state shared by the pipeline stages.

use crate::artifact::{Artifact, Platform, Registry};
use crate::config::ProjectConfig;
use crate::error::{ReleaseError, Result};
use crate::template::{self, Fields, Value};
use camino::Utf8Path;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread;

/// Everything a stage needs to know about the current release.
#[derive(Debug, Clone)]
pub struct Context {
    /// Project configuration.
    pub config: ProjectConfig,
    /// Release version, without a leading `v`.
    pub version: String,
    /// Git tag of the release.
    pub tag: String,
    /// Resolved project environment, exposed to templates as `.Env`.
    pub env: BTreeMap<String, String>,
    /// Artifacts of this run.
    pub artifacts: Arc<Registry>,
    /// Worker count for concurrent digests and commands.
    pub parallelism: usize,
}

impl Context {
    /// Creates a context with an empty registry.
    ///
    /// Project `env` entries are rendered in order, so a value may refer to
    /// an earlier entry through `.Env`.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::InvalidEnvEntry`] for entries without `=` and
    /// template errors from rendering them.
    pub fn new(config: ProjectConfig, version: impl Into<String>) -> Result<Self> {
        let release: String = version.into();
        let parallelism = match config.parallelism {
            0 => thread::available_parallelism().map_or(1, NonZeroUsize::get),
            n => n,
        };
        let mut context = Self {
            tag: format!("v{release}"),
            version: release,
            env: BTreeMap::new(),
            artifacts: Arc::new(Registry::new()),
            parallelism,
            config,
        };
        context.env = resolve_env(&context.config.env, |env| context.fields_with_env(env))?;
        Ok(context)
    }

    /// Overrides the release tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Shares an existing registry.
    #[must_use]
    pub fn with_registry(mut self, artifacts: Arc<Registry>) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// Fields for project-level templates.
    #[must_use]
    pub fn fields(&self) -> Fields {
        self.fields_with_env(&self.env)
    }

    fn fields_with_env(&self, env: &BTreeMap<String, String>) -> Fields {
        let mut fields = Fields::new();
        fields.insert("ProjectName".to_owned(), Value::from(self.config.project_name.as_str()));
        fields.insert("Version".to_owned(), Value::from(self.version.as_str()));
        fields.insert("Tag".to_owned(), Value::from(self.tag.as_str()));
        fields.insert("Env".to_owned(), Value::from(env.clone()));
        fields
    }

    /// Fields for templates rendered once per artifact.
    #[must_use]
    pub fn artifact_fields(&self, artifact: &Artifact) -> Fields {
        self.target_fields(
            artifact.name(),
            artifact.path(),
            artifact.id().as_deref(),
            artifact.platform(),
        )
    }

    /// Fields for templates rendered once per target, which may be an extra
    /// file rather than a registered artifact.
    #[must_use]
    pub fn target_fields(
        &self,
        name: &str,
        path: &Utf8Path,
        id: Option<&str>,
        platform: Option<&Platform>,
    ) -> Fields {
        let mut fields = self.fields();
        let (os, arch) = platform.map_or(("", ""), |p| (p.os.as_str(), p.arch.as_str()));
        fields.insert("ArtifactName".to_owned(), Value::from(name));
        fields.insert("ArtifactPath".to_owned(), Value::from(path.as_str()));
        fields.insert("ArtifactID".to_owned(), Value::from(id.unwrap_or_default()));
        fields.insert("Os".to_owned(), Value::from(os));
        fields.insert("Arch".to_owned(), Value::from(arch));
        fields
    }
}

/// Splits a `KEY=value` entry.
pub(crate) fn split_env_entry(entry: &str) -> Result<(&str, &str)> {
    match entry.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => Err(ReleaseError::InvalidEnvEntry {
            entry: entry.to_owned(),
        }),
    }
}

fn resolve_env(
    entries: &[String],
    fields_for: impl Fn(&BTreeMap<String, String>) -> Fields,
) -> Result<BTreeMap<String, String>> {
    let mut env = BTreeMap::new();
    for entry in entries {
        let rendered = template::render(entry, &fields_for(&env))?;
        let (key, value) = split_env_entry(&rendered)?;
        env.insert(key.to_owned(), value.to_owned());
    }
    Ok(env)
}
