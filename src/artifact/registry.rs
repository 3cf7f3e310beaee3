//! Thread-safe, ordered store of the artifacts produced by one release run.

use super::{Artifact, ArtifactType};
use crate::error::Result;
use camino::Utf8Path;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::sync::{Arc, PoisonError, RwLock};

/// Artifacts of one run, in insertion order.
///
/// Stages share the registry through an `Arc` and may add to it while other
/// stages read it.
#[derive(Debug, Default)]
pub struct Registry {
    items: RwLock<Vec<Arc<Artifact>>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `artifact` and returns a shared handle to it. No deduplication.
    pub fn add(&self, artifact: Artifact) -> Arc<Artifact> {
        let shared = Arc::new(artifact);
        log::trace!("adding {} ({})", shared.name(), shared.kind());
        self.items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&shared));
        shared
    }

    /// A snapshot of every artifact in insertion order.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<Artifact>> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Artifacts satisfying `predicate`, in insertion order.
    #[must_use]
    pub fn filter(&self, predicate: impl Fn(&Artifact) -> bool) -> Vec<Arc<Artifact>> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|artifact| predicate(artifact))
            .cloned()
            .collect()
    }

    /// Calls `visitor` for each artifact in order, stopping at the first error.
    ///
    /// The visitor runs over a snapshot, so it may add to the registry.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `visitor`.
    pub fn visit(&self, mut visitor: impl FnMut(&Arc<Artifact>) -> Result<()>) -> Result<()> {
        self.list().iter().try_for_each(|artifact| visitor(artifact))
    }

    /// Number of registered artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` when nothing has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes a JSON listing of every artifact to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub fn write_json(&self, path: &Utf8Path) -> Result<()> {
        let artifacts = self.list();
        let records: Vec<ArtifactRecord<'_>> =
            artifacts.iter().map(|artifact| ArtifactRecord::from(&**artifact)).collect();
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &records)?;
        log::debug!("wrote {} artifacts to {path}", records.len());
        Ok(())
    }
}

#[derive(Serialize)]
struct ArtifactRecord<'a> {
    name: &'a str,
    path: &'a Utf8Path,
    #[serde(skip_serializing_if = "Option::is_none")]
    goos: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    goarch: Option<String>,
    #[serde(rename = "type")]
    kind: ArtifactType,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    extra: serde_json::Map<String, serde_json::Value>,
}

impl<'a> From<&'a Artifact> for ArtifactRecord<'a> {
    fn from(artifact: &'a Artifact) -> Self {
        let extras = artifact.extras();
        Self {
            name: artifact.name(),
            path: artifact.path(),
            goos: artifact.platform().map(|platform| platform.os.clone()),
            goarch: artifact.platform().map(|platform| platform.arch.clone()),
            kind: artifact.kind(),
            id: extras.id,
            checksum: extras.checksum,
            extra: extras.metadata.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReleaseError;
    use crate::artifact::Filter;
    use camino::Utf8PathBuf;
    use std::thread;

    fn registry_with(names: &[(&str, ArtifactType)]) -> Registry {
        let registry = Registry::new();
        for (name, kind) in names {
            registry.add(Artifact::new(*name, format!("dist/{name}"), *kind));
        }
        registry
    }

    #[test]
    fn keeps_insertion_order_and_duplicates() {
        let registry = registry_with(&[
            ("b", ArtifactType::Archive),
            ("a", ArtifactType::Binary),
            ("b", ArtifactType::Archive),
        ]);
        let names: Vec<String> = registry.list().iter().map(|a| a.name().to_owned()).collect();
        assert_eq!(names, ["b", "a", "b"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn filter_preserves_order() {
        let registry = registry_with(&[
            ("pkg", ArtifactType::LinuxPackage),
            ("bin", ArtifactType::Binary),
            ("tar", ArtifactType::UploadableArchive),
        ]);
        let filter = Filter::ByTypes(ArtifactType::PUBLISHABLE.to_vec());
        let names: Vec<String> = registry
            .filter(|artifact| filter.matches(artifact))
            .iter()
            .map(|a| a.name().to_owned())
            .collect();
        assert_eq!(names, ["pkg", "tar"]);
    }

    #[test]
    fn visit_stops_at_first_error() {
        let registry = registry_with(&[
            ("one", ArtifactType::Binary),
            ("two", ArtifactType::Binary),
            ("three", ArtifactType::Binary),
        ]);
        let mut seen = Vec::new();
        let result = registry.visit(|artifact| {
            seen.push(artifact.name().to_owned());
            if artifact.name() == "two" {
                return Err(ReleaseError::Config {
                    reason: "stop".to_owned(),
                });
            }
            Ok(())
        });
        assert!(matches!(result, Err(ReleaseError::Config { .. })));
        assert_eq!(seen, ["one", "two"]);
    }

    #[test]
    fn visitor_may_add_artifacts() {
        let registry = registry_with(&[("one", ArtifactType::Binary)]);
        registry
            .visit(|artifact| {
                registry.add(Artifact::new(
                    format!("{}.sig", artifact.name()),
                    "dist/one.sig",
                    ArtifactType::Signature,
                ));
                Ok(())
            })
            .expect("visit");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn concurrent_adds_are_all_kept() {
        let registry = Registry::new();
        thread::scope(|scope| {
            for worker in 0..8 {
                let registry = &registry;
                scope.spawn(move || {
                    for index in 0..25 {
                        registry.add(Artifact::new(
                            format!("{worker}-{index}"),
                            "dist/x",
                            ArtifactType::Binary,
                        ));
                        let _ = registry.list();
                    }
                });
            }
        });
        assert_eq!(registry.len(), 200);
    }

    #[test]
    fn write_json_lists_every_artifact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = Utf8PathBuf::from_path_buf(dir.path().join("artifacts.json"))
            .expect("utf-8 temp path");
        let registry = Registry::new();
        registry.add(
            Artifact::new("demo.deb", "dist/demo.deb", ArtifactType::LinuxPackage)
                .with_id("pkg")
                .with_platform("linux", "amd64"),
        );

        registry.write_json(&path).expect("write json");

        let written = std::fs::read_to_string(&path).expect("read json");
        let value: serde_json::Value = serde_json::from_str(&written).expect("parse json");
        assert_eq!(
            value,
            serde_json::json!([{
                "name": "demo.deb",
                "path": "dist/demo.deb",
                "goos": "linux",
                "goarch": "amd64",
                "type": "LinuxPackage",
                "id": "pkg",
            }])
        );
    }
}
