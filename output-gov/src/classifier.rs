//! Single vs multi-output classification.
//!
//! File count is the only trigger. Naming patterns vary per tool and are only
//! used as hints (see [`crate::hints`]). A tool that writes a log file next to
//! its single real output is therefore classified multi-output.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::artifact::eligible_files;
use crate::natural::natural_cmp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonCode {
    MissingDirectory,
    Unreadable,
    Empty,
    Single,
    Multiple,
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReasonCode::MissingDirectory => "missing_directory",
            ReasonCode::Unreadable => "unreadable",
            ReasonCode::Empty => "empty",
            ReasonCode::Single => "single",
            ReasonCode::Multiple => "multiple",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct Classification {
    pub is_multi: bool,
    pub file_count: usize,
    pub code: ReasonCode,
    pub reason: String,
    /// Eligible files, in natural name order.
    pub files: Vec<PathBuf>,
}

impl Classification {
    fn not_multi(code: ReasonCode, reason: String) -> Self {
        Self {
            is_multi: false,
            file_count: 0,
            code,
            reason,
            files: Vec::new(),
        }
    }
}

/// Classifies a finished job's output directory. Never fails: a missing or
/// unreadable directory is "not multi, zero files".
pub fn classify_output(dir: &Path) -> Classification {
    if !dir.is_dir() {
        return Classification::not_multi(
            ReasonCode::MissingDirectory,
            format!("output directory {} does not exist", dir.display()),
        );
    }

    let mut files = match eligible_files(dir) {
        Ok(files) => files,
        Err(e) => {
            log::warn!("Classifier: cannot read {}: {}", dir.display(), e);
            return Classification::not_multi(
                ReasonCode::Unreadable,
                format!("output directory {} is unreadable: {}", dir.display(), e),
            );
        }
    };
    files.sort_by(|a, b| {
        natural_cmp(
            &a.file_name().unwrap_or_default().to_string_lossy(),
            &b.file_name().unwrap_or_default().to_string_lossy(),
        )
    });

    let file_count = files.len();
    let (is_multi, code, reason) = match file_count {
        0 => (false, ReasonCode::Empty, "no output files".to_string()),
        1 => (false, ReasonCode::Single, "single output file".to_string()),
        n => (
            true,
            ReasonCode::Multiple,
            format!("{} output files detected", n),
        ),
    };

    Classification {
        is_multi,
        file_count,
        code,
        reason,
        files,
    }
}
