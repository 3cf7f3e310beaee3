//! Release-artifact pipeline core.
//!
//! This crate keeps the registry of artifacts produced during a release run
//! and provides the two stages that consume it: checksum manifests and
//! custom publishers. Configuration values are text templates rendered
//! against the project, the release version, the environment and, where
//! relevant, the artifact being processed.
//!
//! # Modules
//!
//! - [`artifact`] - Artifact records, selection filters and the registry
//! - [`checksums`] - Checksum manifest stage with refreshable manifests
//! - [`config`] - Project, checksum and publisher configuration
//! - [`context`] - Per-run state shared by the stages
//! - [`digest`] - Streaming file digests
//! - [`error`] - Error types
//! - [`extra_files`] - Expansion of extra-file globs
//! - [`publish`] - Custom publisher execution
//! - [`stage`] - The stage contract and a minimal driver
//! - [`template`] - Text templates with Go-compatible errors

pub mod artifact;
pub mod checksums;
pub mod config;
pub mod context;
pub mod digest;
pub mod error;
pub mod extra_files;
mod parallel;
pub mod publish;
pub mod stage;
pub mod template;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;

pub use artifact::{Artifact, ArtifactType, Filter, Registry};
pub use checksums::ChecksumStage;
pub use context::Context;
pub use error::{ReleaseError, Result};
pub use publish::PublishStage;
pub use stage::{Outcome, Stage, run_stage};
