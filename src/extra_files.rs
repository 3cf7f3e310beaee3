//! Expansion of configured extra-file globs.

use crate::config::ExtraFile;
use crate::error::{ReleaseError, Result};
use crate::template::{self, Fields};
use camino::{Utf8Path, Utf8PathBuf};

/// A file matched by an extra-files glob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    /// Name to publish or list the file under.
    pub name: String,
    /// Location on disk.
    pub path: Utf8PathBuf,
}

/// Expands `files` against the filesystem.
///
/// Results follow declaration order, with the matches of one pattern sorted.
/// Directories are skipped. When two matches resolve to the same name the
/// later path wins.
///
/// # Errors
///
/// Returns [`ReleaseError::GlobNoMatch`] when a pattern matches no file,
/// [`ReleaseError::InvalidGlob`] when it cannot be compiled, and template
/// errors from rendering a `name_template`.
pub fn resolve(fields: &Fields, files: &[ExtraFile]) -> Result<Vec<ResolvedFile>> {
    let mut resolved: Vec<ResolvedFile> = Vec::new();
    for file in files {
        let name_override = if file.name_template.is_empty() {
            None
        } else {
            Some(template::render(&file.name_template, fields)?)
        };
        for path in expand(&file.glob)? {
            let name = name_override
                .clone()
                .unwrap_or_else(|| path.file_name().unwrap_or(path.as_str()).to_owned());
            insert(&mut resolved, ResolvedFile { name, path });
        }
    }
    Ok(resolved)
}

fn insert(resolved: &mut Vec<ResolvedFile>, file: ResolvedFile) {
    if let Some(existing) = resolved.iter_mut().find(|existing| existing.name == file.name) {
        log::warn!(
            "overriding extra file {} ({}) with {}",
            existing.name,
            existing.path,
            file.path
        );
        *existing = file;
        return;
    }
    resolved.push(file);
}

fn expand(pattern: &str) -> Result<Vec<Utf8PathBuf>> {
    let invalid = |reason: String| ReleaseError::InvalidGlob {
        pattern: pattern.to_owned(),
        reason,
    };
    let walker = glob::glob(pattern).map_err(|err| invalid(err.to_string()))?;
    let mut matches = Vec::new();
    for entry in walker {
        let found = entry.map_err(glob::GlobError::into_error)?;
        let path = Utf8PathBuf::from_path_buf(found)
            .map_err(|raw| invalid(format!("non UTF-8 path {}", raw.display())))?;
        if is_file(&path) {
            matches.push(path);
        }
    }
    if matches.is_empty() {
        return Err(ReleaseError::GlobNoMatch {
            pattern: pattern.to_owned(),
        });
    }
    matches.sort();
    log::debug!("extra files {pattern} matched {} files", matches.len());
    Ok(matches)
}

fn is_file(path: &Utf8Path) -> bool {
    path.metadata().is_ok_and(|meta| meta.is_file())
}
