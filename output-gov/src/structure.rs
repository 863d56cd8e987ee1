//! Canonical `{preview, artifacts/, manifest}` layout for multi-output jobs.
//!
//! ```text
//! <root>/
//!   preview.<ext>       copy of the selected artifact
//!   artifacts/          copies of every artifact, original names
//!   manifest.json
//! ```
//!
//! The source directory is only read; cleaning it up is the caller's job.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::artifact::{OutputArtifact, collect_artifacts};
use crate::error::{PackagingError, Stage};
use crate::manifest::{ARTIFACTS_DIR, MANIFEST_FILE_NAME, Manifest, ManifestSource};

/// Picks the preview among the collected artifacts. Returning `None` falls
/// back to the first artifact.
pub type PreviewSelector =
    Arc<dyn Fn(&[OutputArtifact]) -> Option<&OutputArtifact> + Send + Sync>;

pub fn preview_selector<F>(select: F) -> PreviewSelector
where
    F: Fn(&[OutputArtifact]) -> Option<&OutputArtifact> + Send + Sync + 'static,
{
    Arc::new(select)
}

#[derive(Debug, Clone)]
pub struct CanonicalStructure {
    pub root: PathBuf,
    pub preview_path: PathBuf,
    pub artifacts_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub artifacts: Vec<OutputArtifact>,
    pub manifest: Manifest,
}

/// File name of the preview for a given artifact: `preview.<original ext>`.
pub fn preview_name(artifact: &OutputArtifact) -> String {
    match Path::new(&artifact.name).extension() {
        Some(ext) => format!("preview.{}", ext.to_string_lossy()),
        None => "preview".to_string(),
    }
}

pub fn select_preview<'a>(
    artifacts: &'a [OutputArtifact],
    selector: Option<&PreviewSelector>,
) -> Option<&'a OutputArtifact> {
    selector
        .and_then(|select| select(artifacts))
        .or_else(|| artifacts.first())
}

/// Builds the canonical structure for `source_dir` under `root`.
///
/// `root` is created if needed; leftovers from an earlier attempt are
/// removed first so the artifact count always matches what is on disk.
pub fn build_canonical_structure(
    source_dir: &Path,
    root: &Path,
    source: &ManifestSource<'_>,
    selector: Option<&PreviewSelector>,
    with_details: bool,
) -> Result<CanonicalStructure, PackagingError> {
    let artifacts = collect_artifacts(source_dir)?;
    let preview = select_preview(&artifacts, selector)
        .cloned()
        .ok_or_else(|| PackagingError::NoArtifacts {
            dir: source_dir.to_path_buf(),
        })?;

    if root.exists() {
        log::warn!("Structure: removing stale staging {}", root.display());
        std::fs::remove_dir_all(root).map_err(|e| PackagingError::io(Stage::Materialize, root, e))?;
    }
    let artifacts_dir = root.join(ARTIFACTS_DIR);
    std::fs::create_dir_all(&artifacts_dir)
        .map_err(|e| PackagingError::io(Stage::Materialize, &artifacts_dir, e))?;

    for artifact in &artifacts {
        let dest = artifacts_dir.join(&artifact.name);
        std::fs::copy(&artifact.path, &dest)
            .map_err(|e| PackagingError::io(Stage::Materialize, &artifact.path, e))?;
    }
    let preview_file = preview_name(&preview);
    let preview_path = root.join(&preview_file);
    std::fs::copy(&preview.path, &preview_path)
        .map_err(|e| PackagingError::io(Stage::Materialize, &preview.path, e))?;

    let on_disk = count_files(&artifacts_dir)?;
    if on_disk != artifacts.len() {
        return Err(PackagingError::io(
            Stage::Materialize,
            &artifacts_dir,
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "{} files in artifacts, {} collected",
                    on_disk,
                    artifacts.len()
                ),
            ),
        ));
    }

    let manifest = Manifest::build(source, &preview_file, &artifacts, with_details);
    manifest.write_to(root)?;
    log::debug!(
        "Structure: {} artifacts staged in {}, preview {}",
        artifacts.len(),
        root.display(),
        preview_file
    );

    Ok(CanonicalStructure {
        root: root.to_path_buf(),
        preview_path,
        artifacts_dir,
        manifest_path: root.join(MANIFEST_FILE_NAME),
        artifacts,
        manifest,
    })
}

fn count_files(dir: &Path) -> Result<usize, PackagingError> {
    let entries =
        std::fs::read_dir(dir).map_err(|e| PackagingError::io(Stage::Materialize, dir, e))?;
    let mut count = 0;
    for entry in entries {
        let entry = entry.map_err(|e| PackagingError::io(Stage::Materialize, dir, e))?;
        if entry.path().is_file() {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
#[path = "structure_test.rs"]
mod structure_test;
