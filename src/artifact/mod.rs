//! Artifact records and the predicates used to select them.
//!
//! An [`Artifact`] describes one produced output of a release run. Its name,
//! path and type are fixed at construction; the [`Extras`] attached to it
//! may change while the run progresses (the checksum stage records digests
//! and attaches a refresher to the manifests it writes).

pub mod registry;

pub use registry::Registry;

use crate::error::Result;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Kind of a produced artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactType {
    /// A compiled binary that is not uploaded on its own.
    Binary,
    /// A binary uploaded as-is.
    UploadableBinary,
    /// An archive that is not uploaded on its own.
    Archive,
    /// An archive ready for upload.
    UploadableArchive,
    /// A `.deb`, `.rpm` or `.apk` package.
    LinuxPackage,
    /// A checksum manifest.
    Checksum,
    /// A detached signature.
    Signature,
    /// A signing certificate.
    Certificate,
    /// A pushed container image.
    DockerImage,
    /// A multi-platform image manifest.
    DockerManifest,
}

impl ArtifactType {
    /// Types whose files are listed in the checksum manifest.
    pub const CHECKSUMMABLE: &'static [Self] = &[
        Self::Binary,
        Self::UploadableBinary,
        Self::Archive,
        Self::UploadableArchive,
        Self::LinuxPackage,
    ];

    /// Types a publisher targets when no ids are configured.
    pub const PUBLISHABLE: &'static [Self] = &[
        Self::UploadableArchive,
        Self::UploadableBinary,
        Self::LinuxPackage,
        Self::DockerImage,
        Self::DockerManifest,
    ];

    /// The type name as it appears in listings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Binary => "Binary",
            Self::UploadableBinary => "UploadableBinary",
            Self::Archive => "Archive",
            Self::UploadableArchive => "UploadableArchive",
            Self::LinuxPackage => "LinuxPackage",
            Self::Checksum => "Checksum",
            Self::Signature => "Signature",
            Self::Certificate => "Certificate",
            Self::DockerImage => "DockerImage",
            Self::DockerManifest => "DockerManifest",
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target operating system and architecture of an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    /// Operating system, e.g. `linux`.
    pub os: String,
    /// Architecture, e.g. `amd64`.
    pub arch: String,
}

/// Regenerates the content of a derived artifact from its recorded inputs.
pub trait Refresher: Send + Sync + fmt::Debug {
    /// Recomputes and rewrites the artifact's content.
    ///
    /// # Errors
    ///
    /// Returns an error when an input cannot be read or the output cannot be
    /// written.
    fn refresh(&self) -> Result<()>;
}

/// Mutable metadata attached to an artifact.
#[derive(Debug, Clone, Default)]
pub struct Extras {
    /// Configuration-time identifier matched by `ids` filters.
    pub id: Option<String>,
    /// Digest recorded by the checksum stage, as `<algorithm>:<hex>`.
    pub checksum: Option<String>,
    /// Regeneration hook for derived artifacts.
    pub refresh: Option<Arc<dyn Refresher>>,
    /// Anything else a producer wants to record.
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// One produced output of the release run.
#[derive(Debug)]
pub struct Artifact {
    name: String,
    path: Utf8PathBuf,
    platform: Option<Platform>,
    kind: ArtifactType,
    extra: RwLock<Extras>,
}

impl Artifact {
    /// Creates an artifact with empty extras.
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<Utf8PathBuf>, kind: ArtifactType) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            platform: None,
            kind,
            extra: RwLock::new(Extras::default()),
        }
    }

    /// Sets the configuration-time id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.extras_mut().id = Some(id.into());
        self
    }

    /// Sets the target platform.
    #[must_use]
    pub fn with_platform(mut self, os: impl Into<String>, arch: impl Into<String>) -> Self {
        self.platform = Some(Platform {
            os: os.into(),
            arch: arch.into(),
        });
        self
    }

    /// Records an arbitrary metadata value.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extras_mut().metadata.insert(key.into(), value);
        self
    }

    /// Attaches a regeneration hook.
    #[must_use]
    pub fn with_refresher(mut self, refresher: Arc<dyn Refresher>) -> Self {
        self.extras_mut().refresh = Some(refresher);
        self
    }

    fn extras_mut(&mut self) -> &mut Extras {
        self.extra.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_extra(&self) -> RwLockReadGuard<'_, Extras> {
        self.extra.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_extra(&self) -> RwLockWriteGuard<'_, Extras> {
        self.extra.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Location of the artifact's content.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Target platform, when known.
    #[must_use]
    pub const fn platform(&self) -> Option<&Platform> {
        self.platform.as_ref()
    }

    /// Artifact type.
    #[must_use]
    pub const fn kind(&self) -> ArtifactType {
        self.kind
    }

    /// Configuration-time id, if one was recorded.
    #[must_use]
    pub fn id(&self) -> Option<String> {
        self.read_extra().id.clone()
    }

    /// Digest recorded by the checksum stage.
    #[must_use]
    pub fn checksum(&self) -> Option<String> {
        self.read_extra().checksum.clone()
    }

    /// Records a digest as `<algorithm>:<hex>`.
    pub fn set_checksum(&self, checksum: impl Into<String>) {
        self.write_extra().checksum = Some(checksum.into());
    }

    /// Looks up a metadata value.
    #[must_use]
    pub fn metadata(&self, key: &str) -> Option<serde_json::Value> {
        self.read_extra().metadata.get(key).cloned()
    }

    /// Records or replaces a metadata value.
    pub fn set_metadata(&self, key: impl Into<String>, value: serde_json::Value) {
        self.write_extra().metadata.insert(key.into(), value);
    }

    /// A copy of the current extras.
    #[must_use]
    pub fn extras(&self) -> Extras {
        self.read_extra().clone()
    }

    /// Returns `true` when a regeneration hook is attached.
    #[must_use]
    pub fn is_refreshable(&self) -> bool {
        self.read_extra().refresh.is_some()
    }

    /// Runs the attached regeneration hook; does nothing when none is set.
    ///
    /// # Errors
    ///
    /// Propagates the hook's error unchanged.
    pub fn refresh(&self) -> Result<()> {
        let hook = self.read_extra().refresh.clone();
        hook.map_or(Ok(()), |refresher| {
            log::debug!("refreshing {}", self.name);
            refresher.refresh()
        })
    }
}

/// A predicate over artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Artifacts of exactly this type.
    ByType(ArtifactType),
    /// Artifacts of any of these types.
    ByTypes(Vec<ArtifactType>),
    /// Artifacts whose id is one of these.
    ByIds(Vec<String>),
    /// Artifacts matching every inner filter.
    And(Vec<Filter>),
    /// Artifacts matching at least one inner filter.
    Or(Vec<Filter>),
}

impl Filter {
    /// Returns `true` if `artifact` satisfies the filter.
    #[must_use]
    pub fn matches(&self, artifact: &Artifact) -> bool {
        match self {
            Self::ByType(kind) => artifact.kind() == *kind,
            Self::ByTypes(kinds) => kinds.contains(&artifact.kind()),
            Self::ByIds(ids) => artifact
                .id()
                .is_some_and(|id| ids.iter().any(|wanted| *wanted == id)),
            Self::And(filters) => filters.iter().all(|filter| filter.matches(artifact)),
            Self::Or(filters) => filters.iter().any(|filter| filter.matches(artifact)),
        }
    }
}
