//! Archive format contract and final serialization.
//!
//! Two uncompressed tar containers exist, told apart by extension alone:
//! `.tar` for a plain directory bundle and `.cxpkg` for a governed package
//! (canonical layout with a manifest). Compressed and zip-style extensions are
//! never produced; a requested name ending in one is rewritten.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::classifier::{Classification, ReasonCode, classify_output};
use crate::config::PackagingConfig;
use crate::error::{PackagingError, Stage};
use crate::hints;
use crate::manifest::{MANIFEST_FILE_NAME, Manifest, ManifestMetadata, ManifestSource, TaskType};
use crate::natural::natural_cmp;
use crate::structure::{CanonicalStructure, PreviewSelector, build_canonical_structure};

pub const PLAIN_EXTENSION: &str = "tar";
pub const PACKAGE_EXTENSION: &str = "cxpkg";

/// Container suffixes that are never produced. Compound suffixes come first so
/// `x.tar.gz` loses `.tar.gz`, not only `.gz`.
pub const FORBIDDEN_SUFFIXES: &[&str] = &[
    ".tar.gz", ".tar.bz2", ".tar.xz", ".tar.zst", ".tgz", ".tbz2", ".txz", ".zip", ".gz", ".bz2",
    ".xz", ".zst", ".7z", ".rar",
];

const FALLBACK_STEM: &str = "output";

fn strip_suffix_ci<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
    let split = name.len().checked_sub(suffix.len())?;
    if !name.is_char_boundary(split) {
        return None;
    }
    let (stem, tail) = name.split_at(split);
    tail.eq_ignore_ascii_case(suffix).then_some(stem)
}

/// Removes every trailing container suffix, sanctioned or not.
fn container_stem(name: &str) -> &str {
    let sanctioned = [".tar", ".cxpkg"];
    let mut stem = name.trim();
    loop {
        let next = FORBIDDEN_SUFFIXES
            .iter()
            .chain(sanctioned.iter())
            .find_map(|suffix| strip_suffix_ci(stem, suffix));
        match next {
            Some(s) => stem = s,
            None => return stem,
        }
    }
}

fn with_extension(base_name: &str, extension: &str) -> String {
    let stem = container_stem(base_name);
    let stem = if stem.is_empty() { FALLBACK_STEM } else { stem };
    format!("{}.{}", stem, extension)
}

/// Governed name for a plain archive. Idempotent.
pub fn archive_filename(base_name: &str) -> String {
    with_extension(base_name, PLAIN_EXTENSION)
}

/// Governed name for a canonical-structure package. Idempotent.
pub fn package_filename(base_name: &str) -> String {
    with_extension(base_name, PACKAGE_EXTENSION)
}

/// True for names produced by this module (either container kind).
pub fn is_archive_name(name: &str) -> bool {
    strip_suffix_ci(name, ".tar").is_some() || strip_suffix_ci(name, ".cxpkg").is_some()
}

fn governed_path(output_path: &Path, rename: fn(&str) -> String) -> PathBuf {
    let name = output_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    output_path.with_file_name(rename(&name))
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Job identifiers become file names; keep them to one path component.
fn safe_stem(job_id: &str) -> String {
    let stem: String = job_id
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    stem.trim_start_matches('.').to_string()
}

/// Writes a tar container to a temporary file beside `output_path` and only
/// renames it into place once complete.
fn write_atomically<F>(output_path: &Path, fill: F) -> Result<(), PackagingError>
where
    F: FnOnce(&mut tar::Builder<&mut NamedTempFile>) -> std::io::Result<()>,
{
    let serialize_err = |e| PackagingError::io(Stage::Serialize, output_path, e);
    let dir = parent_dir(output_path);
    let mut tmp = NamedTempFile::new_in(dir).map_err(serialize_err)?;
    {
        let mut builder = tar::Builder::new(&mut tmp);
        fill(&mut builder).map_err(serialize_err)?;
        builder.finish().map_err(serialize_err)?;
    }
    tmp.flush().map_err(serialize_err)?;
    tmp.as_file().sync_all().map_err(serialize_err)?;
    tmp.persist(output_path)
        .map_err(|e| serialize_err(e.error))?;
    Ok(())
}

/// Per-job packaging inputs, from the job context.
#[derive(Clone, Default)]
pub struct PackageOptions {
    pub job_id: String,
    pub engine: String,
    pub source_format: String,
    pub output_format: String,
    pub task_type: Option<TaskType>,
    pub metadata: Option<ManifestMetadata>,
    pub preview_selector: Option<PreviewSelector>,
}

impl fmt::Debug for PackageOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageOptions")
            .field("job_id", &self.job_id)
            .field("engine", &self.engine)
            .field("source_format", &self.source_format)
            .field("output_format", &self.output_format)
            .field("task_type", &self.task_type)
            .field("metadata", &self.metadata)
            .field("preview_selector", &self.preview_selector.is_some())
            .finish()
    }
}

impl PackageOptions {
    pub fn new(
        job_id: impl Into<String>,
        engine: impl Into<String>,
        source_format: impl Into<String>,
        output_format: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            engine: engine.into(),
            source_format: source_format.into(),
            output_format: output_format.into(),
            ..Default::default()
        }
    }

    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = Some(task_type);
        self
    }

    pub fn with_metadata(mut self, metadata: ManifestMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_preview_selector(mut self, selector: PreviewSelector) -> Self {
        self.preview_selector = Some(selector);
        self
    }

    fn manifest_source(&self) -> ManifestSource<'_> {
        ManifestSource {
            job_id: &self.job_id,
            engine: &self.engine,
            source_format: &self.source_format,
            output_format: &self.output_format,
            task_type: self.task_type,
            metadata: self.metadata.as_ref(),
        }
    }
}

/// A persisted governed package.
#[derive(Debug, Clone)]
pub struct PackageOutcome {
    pub package_path: PathBuf,
    pub manifest: Manifest,
    /// Canonical structure the package was built from, until cleaned up.
    pub staging_dir: Option<PathBuf>,
}

impl PackageOutcome {
    /// Removes the staging directory. Call once the package is confirmed.
    pub fn cleanup_staging(&mut self) -> std::io::Result<()> {
        if let Some(dir) = self.staging_dir.take() {
            if dir.exists() {
                std::fs::remove_dir_all(&dir)?;
            }
        }
        Ok(())
    }
}

pub struct Packager {
    config: PackagingConfig,
}

impl Packager {
    pub fn new(config: PackagingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PackagingConfig {
        &self.config
    }

    /// Serializes `source_dir` into a plain `.tar`.
    ///
    /// The output name is governed by [`archive_filename`]. `filter` decides
    /// which files go in; by default existing archives of either kind are left
    /// out. Hidden entries and symlinks are always skipped.
    pub fn create_plain_archive(
        &self,
        source_dir: &Path,
        output_path: &Path,
        filter: Option<&dyn Fn(&Path) -> bool>,
    ) -> Result<PathBuf, PackagingError> {
        if !source_dir.is_dir() {
            return Err(PackagingError::io(
                Stage::Collect,
                source_dir,
                std::io::Error::new(std::io::ErrorKind::NotFound, "source directory not found"),
            ));
        }
        let output = governed_path(output_path, archive_filename);
        let output_abs = std::path::absolute(&output).unwrap_or_else(|_| output.clone());

        let mut entries = Vec::new();
        let walker = WalkDir::new(source_dir)
            .min_depth(1)
            .sort_by(|a, b| {
                natural_cmp(
                    &a.file_name().to_string_lossy(),
                    &b.file_name().to_string_lossy(),
                )
            })
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));
        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(source_dir).to_path_buf();
                PackagingError::io(Stage::Collect, path, e.into())
            })?;
            let path = entry.path();
            if entry.path_is_symlink() {
                log::debug!("Packager: skipping symlink {}", path.display());
                continue;
            }
            if entry.file_type().is_file() {
                let abs = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
                if abs == output_abs {
                    continue;
                }
                let keep = match filter {
                    Some(f) => f(path),
                    None => !is_archive_name(&entry.file_name().to_string_lossy()),
                };
                if !keep {
                    log::debug!("Packager: skipping {}", path.display());
                    continue;
                }
            }
            let rel = path
                .strip_prefix(source_dir)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| PathBuf::from(entry.file_name()));
            entries.push((path.to_path_buf(), rel, entry.file_type().is_dir()));
        }

        write_atomically(&output, |builder| {
            for (path, rel, is_dir) in &entries {
                if *is_dir {
                    builder.append_dir(rel, path)?;
                } else {
                    builder.append_path_with_name(path, rel)?;
                }
            }
            Ok(())
        })?;
        log::info!(
            "Packager: plain archive {} ({} entries)",
            output.display(),
            entries.len()
        );
        Ok(output)
    }

    /// Classifies, builds the canonical structure and manifest, then
    /// serializes it as a `.cxpkg` at the governed form of `output_path`.
    ///
    /// Either a complete package exists at the returned path or nothing was
    /// written there. On failure the staging directory is left for inspection.
    pub fn create_governed_package(
        &self,
        source_dir: &Path,
        output_path: &Path,
        options: &PackageOptions,
    ) -> Result<PackageOutcome, PackagingError> {
        let classification = classify_output(source_dir);
        self.ensure_multi(source_dir, &classification)?;

        let output = governed_path(output_path, package_filename);
        let staging = self.staging_dir_for(&output);
        let structure = build_canonical_structure(
            source_dir,
            &staging,
            &options.manifest_source(),
            options.preview_selector.as_ref(),
            self.config.record_artifact_details,
        )?;

        write_atomically(&output, |builder| append_structure(builder, &structure))?;
        log::info!(
            "Packager: job {} packaged {} artifacts into {}",
            options.job_id,
            structure.manifest.artifact_count,
            output.display()
        );

        let mut outcome = PackageOutcome {
            package_path: output,
            manifest: structure.manifest,
            staging_dir: Some(staging),
        };
        if self.config.remove_staging {
            if let Err(e) = outcome.cleanup_staging() {
                log::warn!("Packager: staging cleanup failed: {}", e);
            }
        }
        Ok(outcome)
    }

    /// Entry point for finished jobs. `None` means the job has a single output
    /// and nothing was packaged.
    pub fn auto_package(
        &self,
        output_dir: &Path,
        options: &PackageOptions,
    ) -> Result<Option<PackageOutcome>, PackagingError> {
        let classification = classify_output(output_dir);
        log::info!(
            "Packager: job {} classified {} ({}): {}",
            options.job_id,
            if classification.is_multi { "multi-output" } else { "single-output" },
            classification.code,
            classification.reason
        );
        if !classification.is_multi {
            return Ok(None);
        }

        let names: Vec<String> = classification
            .files
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        if let Some(hint) = hints::detect_naming(&names) {
            log::debug!(
                "Packager: job {} naming looks like {:?} (suggested task type {})",
                options.job_id,
                hint.kind,
                hint.kind.task_type()
            );
        }

        let stem = match safe_stem(&options.job_id) {
            s if s.is_empty() => FALLBACK_STEM.to_string(),
            s => s,
        };
        let output = output_dir.join(package_filename(&stem));
        self.create_governed_package(output_dir, &output, options)
            .map(Some)
    }

    fn ensure_multi(
        &self,
        source_dir: &Path,
        classification: &Classification,
    ) -> Result<(), PackagingError> {
        if matches!(
            classification.code,
            ReasonCode::MissingDirectory | ReasonCode::Unreadable
        ) {
            let kind = match classification.code {
                ReasonCode::MissingDirectory => std::io::ErrorKind::NotFound,
                _ => std::io::ErrorKind::Other,
            };
            return Err(PackagingError::io(
                Stage::Classify,
                source_dir,
                std::io::Error::new(kind, classification.reason.clone()),
            ));
        }
        match classification.file_count {
            0 => Err(PackagingError::NoArtifacts {
                dir: source_dir.to_path_buf(),
            }),
            n if !classification.is_multi => Err(PackagingError::NotMultiOutput {
                dir: source_dir.to_path_buf(),
                file_count: n,
            }),
            _ => Ok(()),
        }
    }

    fn staging_dir_for(&self, package: &Path) -> PathBuf {
        let stem = package
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| FALLBACK_STEM.to_string());
        let root = match &self.config.staging_root {
            Some(root) => root.clone(),
            None => parent_dir(package).to_path_buf(),
        };
        root.join(format!(".{}.staging", stem))
    }
}

impl Default for Packager {
    fn default() -> Self {
        Self::new(PackagingConfig::default())
    }
}

/// Manifest first, then the preview, then the artifacts in manifest order.
fn append_structure<W: Write>(
    builder: &mut tar::Builder<W>,
    structure: &CanonicalStructure,
) -> std::io::Result<()> {
    builder.append_path_with_name(&structure.manifest_path, MANIFEST_FILE_NAME)?;
    builder.append_path_with_name(&structure.preview_path, &structure.manifest.preview)?;
    let dir_name = Path::new(&structure.manifest.artifacts_dir);
    builder.append_dir(dir_name, &structure.artifacts_dir)?;
    for name in &structure.manifest.artifacts {
        builder.append_path_with_name(structure.artifacts_dir.join(name), dir_name.join(name))?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "archive_test.rs"]
mod archive_test;
