//! Manifest describing a governed package.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::OutputArtifact;
use crate::error::{PackagingError, Stage, UnknownTaskType};

pub const MANIFEST_FILE_NAME: &str = "manifest.json";
pub const MANIFEST_VERSION: &str = "1.0";
pub const PLATFORM: &str = "convertx";
pub const PACKAGING_FORMAT: &str = "archive";
pub const ARTIFACTS_DIR: &str = "artifacts";

/// Keys owned by the manifest itself. Caller metadata never overrides them.
pub const RESERVED_KEYS: &[&str] = &[
    "platform",
    "manifest_version",
    "task_type",
    "job_id",
    "engine",
    "source_format",
    "output_format",
    "preview",
    "artifacts_dir",
    "artifact_count",
    "artifacts",
    "artifact_details",
    "packaging",
    "created_at",
];

const TYPED_METADATA_KEYS: &[&str] = &["frame_rate", "resolution", "page_count", "dpi", "shard_count"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    SingleOutput,
    #[default]
    MultiOutput,
    Sequence,
    Batch,
    Split,
    Pages,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::SingleOutput => "single-output",
            TaskType::MultiOutput => "multi-output",
            TaskType::Sequence => "sequence",
            TaskType::Batch => "batch",
            TaskType::Split => "split",
            TaskType::Pages => "pages",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = UnknownTaskType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single-output" => Ok(TaskType::SingleOutput),
            "multi-output" => Ok(TaskType::MultiOutput),
            "sequence" => Ok(TaskType::Sequence),
            "batch" => Ok(TaskType::Batch),
            "split" => Ok(TaskType::Split),
            "pages" => Ok(TaskType::Pages),
            other => Err(UnknownTaskType(other.to_string())),
        }
    }
}

/// Optional per-domain metadata. Unknown keys are kept in `extra` and
/// written verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<f64>,
    // "1920x1080"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dpi: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard_count: Option<u32>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ManifestMetadata {
    pub fn is_empty(&self) -> bool {
        self.frame_rate.is_none()
            && self.resolution.is_none()
            && self.page_count.is_none()
            && self.dpi.is_none()
            && self.shard_count.is_none()
            && self.extra.is_empty()
    }

    /// Drops extra keys that would collide with reserved or typed keys.
    fn sanitized(mut self) -> Self {
        self.extra.retain(|key, _| {
            let reserved = RESERVED_KEYS.contains(&key.as_str())
                || TYPED_METADATA_KEYS.contains(&key.as_str());
            if reserved {
                log::warn!("Manifest: ignoring metadata key {} (reserved)", key);
            }
            !reserved
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactDetail {
    pub name: String,
    pub format: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub platform: String,
    pub manifest_version: String,
    pub task_type: TaskType,
    pub job_id: String,
    pub engine: String,
    pub source_format: String,
    pub output_format: String,
    pub preview: String,
    pub artifacts_dir: String,
    pub artifact_count: usize,
    /// Artifact file names in packaging order.
    pub artifacts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_details: Option<Vec<ArtifactDetail>>,
    pub packaging: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub metadata: ManifestMetadata,
}

/// Inputs to [`Manifest::build`] that come from the job rather than the files.
#[derive(Debug, Clone, Default)]
pub struct ManifestSource<'a> {
    pub job_id: &'a str,
    pub engine: &'a str,
    pub source_format: &'a str,
    pub output_format: &'a str,
    pub task_type: Option<TaskType>,
    pub metadata: Option<&'a ManifestMetadata>,
}

impl Manifest {
    /// `artifacts` are the files just materialized, in order.
    pub fn build(
        source: &ManifestSource<'_>,
        preview: &str,
        artifacts: &[OutputArtifact],
        with_details: bool,
    ) -> Self {
        let artifact_details = with_details.then(|| {
            artifacts
                .iter()
                .map(|a| ArtifactDetail {
                    name: a.name.clone(),
                    format: a.format.clone(),
                    size: a.size,
                    created_at: a.created_at,
                })
                .collect()
        });
        Self {
            platform: PLATFORM.to_string(),
            manifest_version: MANIFEST_VERSION.to_string(),
            task_type: source.task_type.unwrap_or_default(),
            job_id: source.job_id.to_string(),
            engine: source.engine.to_string(),
            source_format: source.source_format.to_ascii_lowercase(),
            output_format: source.output_format.to_ascii_lowercase(),
            preview: preview.to_string(),
            artifacts_dir: ARTIFACTS_DIR.to_string(),
            artifact_count: artifacts.len(),
            artifacts: artifacts.iter().map(|a| a.name.clone()).collect(),
            artifact_details,
            packaging: PACKAGING_FORMAT.to_string(),
            created_at: Utc::now(),
            metadata: source.metadata.cloned().unwrap_or_default().sanitized(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Writes `manifest.json` into `dir`.
    pub fn write_to(&self, dir: &Path) -> Result<(), PackagingError> {
        let path = dir.join(MANIFEST_FILE_NAME);
        let json = self.to_json().map_err(|source| PackagingError::Manifest {
            stage: Stage::Materialize,
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, json).map_err(|e| PackagingError::io(Stage::Materialize, &path, e))
    }

    pub fn read_from(path: &Path) -> Result<Self, PackagingError> {
        let raw = std::fs::read(path).map_err(|e| PackagingError::io(Stage::Collect, path, e))?;
        serde_json::from_slice(&raw).map_err(|source| PackagingError::Manifest {
            stage: Stage::Collect,
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads the manifest straight out of a governed package, without
    /// extracting anything else.
    pub fn read_from_package(package: &Path) -> Result<Self, PackagingError> {
        let io_err = |e| PackagingError::io(Stage::Collect, package, e);
        let file = std::fs::File::open(package).map_err(io_err)?;
        let mut archive = tar::Archive::new(file);
        for entry in archive.entries().map_err(io_err)? {
            let mut entry = entry.map_err(io_err)?;
            let is_manifest = entry
                .path()
                .map(|p| p.as_ref() == Path::new(MANIFEST_FILE_NAME))
                .unwrap_or(false);
            if !is_manifest {
                continue;
            }
            let mut raw = Vec::new();
            entry.read_to_end(&mut raw).map_err(io_err)?;
            return serde_json::from_slice(&raw).map_err(|source| PackagingError::Manifest {
                stage: Stage::Collect,
                path: package.join(MANIFEST_FILE_NAME),
                source,
            });
        }
        Err(io_err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "package has no manifest.json",
        )))
    }
}

#[cfg(test)]
#[path = "manifest_test.rs"]
mod manifest_test;
