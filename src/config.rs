//! Release configuration consumed by the checksum and publish stages.
//!
//! Configuration is normally produced by an outer loader; the structures here
//! deserialise from TOML so that embedders and tests can describe a project
//! declaratively:
//!
//! ```
//! use shipwright::config::ProjectConfig;
//!
//! let config = ProjectConfig::from_toml_str(
//!     r#"
//!     project_name = "demo"
//!
//!     [[publishers]]
//!     name = "upload"
//!     cmd = "curl -T {{ .ArtifactPath }} https://example.invalid/"
//!     "#,
//! )
//! .expect("valid configuration");
//! assert_eq!(config.dist.as_str(), "dist");
//! assert_eq!(config.publishers.len(), 1);
//! ```

use crate::error::{ReleaseError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::fs;

fn default_dist() -> Utf8PathBuf {
    Utf8PathBuf::from("dist")
}

/// Top-level project configuration.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    /// Project name exposed to templates as `.ProjectName`.
    pub project_name: String,
    /// Directory manifests are written to.
    pub dist: Utf8PathBuf,
    /// Project environment as ordered `KEY=value` templates.
    pub env: Vec<String>,
    /// Checksum stage settings.
    pub checksum: ChecksumConfig,
    /// Publishers, run in declaration order.
    pub publishers: Vec<PublisherConfig>,
    /// Worker count for concurrent digests and publisher commands.
    /// Zero selects the available parallelism of the host.
    pub parallelism: usize,
    /// Kill publisher commands that run longer than this many seconds.
    pub timeout_secs: Option<u64>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            project_name: String::new(),
            dist: default_dist(),
            env: Vec::new(),
            checksum: ChecksumConfig::default(),
            publishers: Vec::new(),
            parallelism: 0,
            timeout_secs: None,
        }
    }
}

impl ProjectConfig {
    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::Config`] when the text is not valid
    /// configuration.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|err| ReleaseError::Config {
            reason: err.to_string(),
        })
    }

    /// Reads and parses the TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns the I/O error when the file cannot be read, or
    /// [`ReleaseError::Config`] when it does not parse.
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        log::debug!("loaded configuration from {path}");
        Self::from_toml_str(&text)
    }
}

/// Settings of the checksum stage.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ChecksumConfig {
    /// Manifest file name template.
    pub name_template: String,
    /// Digest algorithm name, `sha256` when empty.
    pub algorithm: String,
    /// Restrict the manifest to artifacts with these ids.
    pub ids: Vec<String>,
    /// Additional files to list in the manifest.
    pub extra_files: Vec<ExtraFile>,
    /// Skip the stage entirely.
    pub disable: bool,
    /// Write one checksum file per artifact instead of a single manifest.
    pub split: bool,
}

/// One custom publisher.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PublisherConfig {
    /// Label used in logs.
    pub name: String,
    /// Publish only artifacts with these ids, whatever their type.
    pub ids: Vec<String>,
    /// Template rendering to `true` to skip this publisher.
    pub disable: String,
    /// Working directory template.
    pub dir: String,
    /// Command line template.
    pub cmd: String,
    /// Extra `KEY=value` templates layered over the inherited environment.
    pub env: Vec<String>,
    /// Also publish checksum manifests.
    pub checksum: bool,
    /// Also publish signatures and certificates.
    pub signature: bool,
    /// Additional files to publish.
    pub extra_files: Vec<ExtraFile>,
}

/// A glob of additional files with an optional rename template.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ExtraFile {
    /// Glob pattern, relative to the working directory.
    pub glob: String,
    /// Template for the published name; the file's base name when empty.
    pub name_template: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_configuration_uses_defaults() {
        let config = ProjectConfig::from_toml_str("").expect("empty config");
        assert_eq!(config, ProjectConfig::default());
        assert_eq!(config.dist, Utf8PathBuf::from("dist"));
        assert!(!config.checksum.disable);
    }

    #[test]
    fn parses_a_full_publisher() {
        let config = ProjectConfig::from_toml_str(
            r#"
            project_name = "demo"
            env = ["TOKEN=abc"]
            timeout_secs = 30

            [checksum]
            algorithm = "sha512"
            split = true

            [[publishers]]
            name = "upload"
            ids = ["pkg"]
            disable = "{{ isEnvSet \"DRY_RUN\" }}"
            dir = "{{ dir .ArtifactPath }}"
            cmd = "upload {{ .ArtifactName }}"
            env = ["API=1"]
            checksum = true
            extra_files = [{ glob = "./LICENSE", name_template = "LICENSE.txt" }]
            "#,
        )
        .expect("valid config");

        assert_eq!(config.timeout_secs, Some(30));
        assert!(config.checksum.split);
        let publisher = config.publishers.first().expect("one publisher");
        assert_eq!(publisher.ids, ["pkg"]);
        assert!(publisher.checksum);
        assert!(!publisher.signature);
        assert_eq!(
            publisher.extra_files,
            [ExtraFile {
                glob: "./LICENSE".to_owned(),
                name_template: "LICENSE.txt".to_owned(),
            }]
        );
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = ProjectConfig::from_toml_str("projectname = \"typo\"").expect_err("unknown");
        assert!(matches!(err, ReleaseError::Config { .. }));
    }

    #[test]
    fn load_reports_missing_files_as_io() {
        let err = ProjectConfig::load(Utf8Path::new("/no/such/shipwright.toml"))
            .expect_err("missing file");
        assert!(err.is_not_found());
    }
}
