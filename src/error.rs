//! Error types for the release pipeline core.
//!
//! Template and I/O failures are wrapped transparently so that their messages
//! and identities survive intact: consumers match on template error strings,
//! and callers test I/O failures for "not found" or "permission denied".

use crate::template::TemplateError;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the registry, the checksum stage, and the publisher engine.
#[derive(Debug, Error)]
pub enum ReleaseError {
    /// A template failed to parse or execute.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// An extra-files glob matched nothing on disk.
    #[error("globbing failed for pattern {pattern}: matching \"{pattern}\": file does not exist")]
    GlobNoMatch {
        /// The pattern exactly as configured.
        pattern: String,
    },

    /// An extra-files glob could not be compiled or walked.
    #[error("globbing failed for pattern {pattern}: {reason}")]
    InvalidGlob {
        /// The pattern exactly as configured.
        pattern: String,
        /// Description of the glob failure.
        reason: String,
    },

    /// The configured checksum algorithm is not supported.
    #[error("invalid checksum algorithm: {name}")]
    UnknownAlgorithm {
        /// The rejected algorithm identifier.
        name: String,
    },

    /// An I/O operation failed; the original error is preserved.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// A publisher command exited unsuccessfully.
    #[error("publishing: {program} failed: {status}: {stderr}")]
    PublishFailed {
        /// The program as it appeared in the rendered command line.
        program: String,
        /// Exit description, e.g. `exit status 1`.
        status: String,
        /// Captured standard error, trimmed.
        stderr: String,
    },

    /// A publisher command could not be started.
    #[error("publishing: {program} failed to start: {source}")]
    Spawn {
        /// The program that failed to start.
        program: String,
        /// The underlying spawn error.
        #[source]
        source: io::Error,
    },

    /// A publisher command ran past its deadline and was killed.
    #[error("publishing: {program} timed out after {timeout:?}")]
    CommandTimedOut {
        /// The program that was killed.
        program: String,
        /// The configured timeout.
        timeout: Duration,
    },

    /// A rendered command line rendered to nothing.
    #[error("publishing: {publisher}: command is empty")]
    EmptyCommand {
        /// Name of the publisher whose command was empty.
        publisher: String,
    },

    /// A rendered command line could not be split into words.
    #[error("publishing: invalid command line {command:?}: {reason}")]
    InvalidCommand {
        /// The rendered command line.
        command: String,
        /// Description of the splitting failure.
        reason: String,
    },

    /// An environment entry is not of the form `KEY=value`.
    #[error("invalid environment entry {entry:?}: expected KEY=value")]
    InvalidEnvEntry {
        /// The offending entry after rendering.
        entry: String,
    },

    /// The project configuration could not be parsed.
    #[error("invalid configuration: {reason}")]
    Config {
        /// Description of the parse error.
        reason: String,
    },

    /// JSON serialisation of the artifact listing failed.
    #[error("failed to serialise artifacts: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReleaseError {
    /// Returns the underlying I/O error kind, if this is an I/O failure.
    #[must_use]
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::Io(err) => Some(err.kind()),
            _ => None,
        }
    }

    /// Returns `true` when the failure is a missing file or directory.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.io_kind() == Some(io::ErrorKind::NotFound)
    }

    /// Returns `true` when the failure is a permission error.
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        self.io_kind() == Some(io::ErrorKind::PermissionDenied)
    }
}

/// Result type alias using [`ReleaseError`].
pub type Result<T> = std::result::Result<T, ReleaseError>;
