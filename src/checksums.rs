//! Checksum manifests over the release artifacts.
//!
//! The stage digests every checksummable artifact (and any configured extra
//! files), writes a manifest of `<hex>  <name>` lines into the dist
//! directory and registers the manifest as a [`ArtifactType::Checksum`]
//! artifact. In split mode each source gets its own file holding only the
//! hex digest. The manifest keeps a recipe of its inputs so that it can be
//! rewritten later through [`Artifact::refresh`], for example after a
//! signing stage has modified one of the sources.
//!
//! Lines are ordered by display name, ties broken by path, so the manifest
//! does not depend on the order producer stages registered their outputs.

use crate::artifact::{Artifact, ArtifactType, Filter, Refresher};
use crate::context::Context;
use crate::digest::Algorithm;
use crate::error::{ReleaseError, Result};
use crate::extra_files;
use crate::parallel;
use crate::stage::{Outcome, Stage};
use crate::template::{self, Value};
use camino::Utf8PathBuf;
use std::fmt;
use std::fs::File;
use std::io::Write as _;
use std::sync::Arc;

const DEFAULT_NAME_TEMPLATE: &str = "{{ .ProjectName }}_{{ .Version }}_checksums.txt";
const DEFAULT_SPLIT_NAME_TEMPLATE: &str = "{{ .ArtifactName }}.{{ .Algorithm }}";
const DEFAULT_ALGORITHM: &str = "sha256";

/// Writes checksum manifests for the release artifacts.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChecksumStage;

impl fmt::Display for ChecksumStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("calculating checksums")
    }
}

impl Stage for ChecksumStage {
    fn defaults(&self, ctx: &mut Context) -> Result<()> {
        let checksum = &mut ctx.config.checksum;
        if checksum.name_template.is_empty() {
            checksum.name_template = if checksum.split {
                DEFAULT_SPLIT_NAME_TEMPLATE
            } else {
                DEFAULT_NAME_TEMPLATE
            }
            .to_owned();
        }
        if checksum.algorithm.is_empty() {
            checksum.algorithm = DEFAULT_ALGORITHM.to_owned();
        }
        Ok(())
    }

    fn skip(&self, ctx: &Context) -> bool {
        ctx.config.checksum.disable
    }

    fn run(&self, ctx: &Context) -> Result<Outcome> {
        let config = &ctx.config.checksum;
        let algorithm_name = if config.algorithm.is_empty() {
            DEFAULT_ALGORITHM
        } else {
            config.algorithm.as_str()
        };
        let algorithm: Algorithm = algorithm_name.parse()?;

        let mut sources = collect_sources(ctx)?;
        if sources.is_empty() {
            return Ok(Outcome::Skipped("no artifacts to checksum".to_owned()));
        }
        sources.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.path.cmp(&b.path)));

        if config.split {
            write_split(ctx, algorithm, sources)?;
        } else {
            write_combined(ctx, algorithm, sources)?;
        }
        Ok(Outcome::Completed)
    }
}

/// One file listed in a manifest.
#[derive(Debug, Clone)]
struct Source {
    name: String,
    path: Utf8PathBuf,
    /// The registered artifact, absent for extra files.
    artifact: Option<Arc<Artifact>>,
}

fn collect_sources(ctx: &Context) -> Result<Vec<Source>> {
    let config = &ctx.config.checksum;
    let by_type = Filter::ByTypes(ArtifactType::CHECKSUMMABLE.to_vec());
    let filter = if config.ids.is_empty() {
        by_type
    } else {
        Filter::And(vec![by_type, Filter::ByIds(config.ids.clone())])
    };

    let mut sources: Vec<Source> = ctx
        .artifacts
        .filter(|artifact| filter.matches(artifact))
        .into_iter()
        .map(|artifact| Source {
            name: artifact.name().to_owned(),
            path: artifact.path().to_owned(),
            artifact: Some(artifact),
        })
        .collect();
    let extras = extra_files::resolve(&ctx.fields(), &config.extra_files)?;
    sources.extend(extras.into_iter().map(|file| Source {
        name: file.name,
        path: file.path,
        artifact: None,
    }));
    Ok(sources)
}

fn write_combined(ctx: &Context, algorithm: Algorithm, sources: Vec<Source>) -> Result<()> {
    let name = template::render(&ctx.config.checksum.name_template, &ctx.fields())?;
    let recipe = ManifestRecipe {
        sources,
        algorithm,
        destination: ctx.config.dist.join(&name),
        workers: ctx.parallelism,
        layout: Layout::Lines,
    };
    recipe.write()?;
    log::info!("wrote {} checksums to {}", recipe.sources.len(), recipe.destination);

    let path = recipe.destination.clone();
    ctx.artifacts
        .add(Artifact::new(name, path, ArtifactType::Checksum).with_refresher(Arc::new(recipe)));
    Ok(())
}

fn write_split(ctx: &Context, algorithm: Algorithm, sources: Vec<Source>) -> Result<()> {
    for source in sources {
        let mut fields = source.artifact.as_ref().map_or_else(
            || ctx.target_fields(&source.name, &source.path, None, None),
            |artifact| ctx.artifact_fields(artifact),
        );
        fields.insert("Algorithm".to_owned(), Value::from(algorithm.as_str()));
        let name = template::render(&ctx.config.checksum.name_template, &fields)?;

        let recipe = ManifestRecipe {
            sources: vec![source],
            algorithm,
            destination: ctx.config.dist.join(&name),
            workers: 1,
            layout: Layout::DigestOnly,
        };
        recipe.write()?;
        log::debug!("wrote {}", recipe.destination);

        let path = recipe.destination.clone();
        ctx.artifacts
            .add(Artifact::new(name, path, ArtifactType::Checksum).with_refresher(Arc::new(recipe)));
    }
    Ok(())
}

/// How a manifest lays out its digests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    /// One `<hex>  <name>` line per source.
    Lines,
    /// The bare digest of a single source.
    DigestOnly,
}

/// Inputs of a manifest, kept so the manifest can be regenerated.
#[derive(Debug)]
struct ManifestRecipe {
    sources: Vec<Source>,
    algorithm: Algorithm,
    destination: Utf8PathBuf,
    workers: usize,
    layout: Layout,
}

impl ManifestRecipe {
    /// Digests every source and rewrites the manifest.
    ///
    /// Digests are also recorded on the source artifacts. I/O errors are
    /// returned unchanged.
    fn write(&self) -> Result<()> {
        let digests = parallel::try_map(&self.sources, self.workers, |source| {
            self.algorithm
                .digest_file(&source.path)
                .map_err(ReleaseError::from)
        })?;

        let mut content = String::new();
        for (source, digest) in self.sources.iter().zip(&digests) {
            match self.layout {
                Layout::Lines => content.push_str(&format!("{digest}  {}\n", source.name)),
                Layout::DigestOnly => content.push_str(digest),
            }
            if let Some(artifact) = &source.artifact {
                artifact.set_checksum(format!("{}:{digest}", self.algorithm));
            }
        }

        let mut file = File::create(&self.destination)?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }
}

impl Refresher for ManifestRecipe {
    fn refresh(&self) -> Result<()> {
        log::debug!("refreshing checksums in {}", self.destination);
        self.write()
    }
}
