use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Pipeline stage a packaging failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Classify,
    Collect,
    SelectPreview,
    Materialize,
    Serialize,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Classify => "classify",
            Stage::Collect => "collect",
            Stage::SelectPreview => "select-preview",
            Stage::Materialize => "materialize",
            Stage::Serialize => "serialize",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum PackagingError {
    /// The directory held no eligible files after exclusion filtering.
    #[error("select-preview: no artifacts in {}", dir.display())]
    NoArtifacts { dir: PathBuf },

    /// A canonical structure was requested for a job with a single output.
    #[error("classify: {} holds {file_count} output file, nothing to package", dir.display())]
    NotMultiOutput { dir: PathBuf, file_count: usize },

    #[error("{stage}: {}: {source}", path.display())]
    Io {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage}: manifest {}: {source}", path.display())]
    Manifest {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl PackagingError {
    pub(crate) fn io(stage: Stage, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PackagingError::Io {
            stage,
            path: path.into(),
            source,
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            PackagingError::NoArtifacts { .. } => Stage::SelectPreview,
            PackagingError::NotMultiOutput { .. } => Stage::Classify,
            PackagingError::Io { stage, .. } => *stage,
            PackagingError::Manifest { stage, .. } => *stage,
        }
    }
}

/// Why a job did not deliver a result.
///
/// Conversion failures come from the external tool; packaging failures mean the
/// tool produced output but it could not be delivered.
#[derive(Error, Debug)]
pub enum JobFailure {
    #[error("conversion failed: {0}")]
    Conversion(String),

    #[error("packaging failed: {0}")]
    Packaging(#[from] PackagingError),
}

impl JobFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            JobFailure::Conversion(_) => "conversion_failed",
            JobFailure::Packaging(_) => "packaging_failed",
        }
    }
}

/// A task type name outside the closed set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown task type: {0}")]
pub struct UnknownTaskType(pub String);

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
