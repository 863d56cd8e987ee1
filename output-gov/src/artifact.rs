use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::archive::is_archive_name;
use crate::error::{PackagingError, Stage};
use crate::manifest::MANIFEST_FILE_NAME;
use crate::natural::natural_cmp;

/// One physical output file of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputArtifact {
    pub name: String,
    pub path: PathBuf,
    /// Lowercase extension without the dot; empty when the file has none.
    pub format: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, serde_json::Value>>,
}

impl OutputArtifact {
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        // some filesystems do not record a birth time
        let created = meta
            .created()
            .or_else(|_| meta.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        Ok(Self {
            format: format_of(&name),
            name,
            path,
            size: meta.len(),
            created_at: created,
            metadata: None,
        })
    }
}

/// Lowercase extension of a file name, without the dot.
pub fn format_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Whether a file name can count as a job output.
///
/// Hidden files, manifests and archives from a previous packaging run are not
/// outputs.
pub fn is_eligible_name(name: &str) -> bool {
    !name.starts_with('.') && name != MANIFEST_FILE_NAME && !is_archive_name(name)
}

/// Eligible regular files directly inside `dir`, unsorted.
pub(crate) fn eligible_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if is_eligible_name(&name.to_string_lossy()) {
            files.push(entry.path());
        }
    }
    Ok(files)
}

/// Collects the eligible artifacts of `dir`, ordered by [`natural_cmp`] on the
/// file name.
pub fn collect_artifacts(dir: &Path) -> Result<Vec<OutputArtifact>, PackagingError> {
    let files = eligible_files(dir).map_err(|e| PackagingError::io(Stage::Collect, dir, e))?;
    let mut artifacts = files
        .iter()
        .map(|p| OutputArtifact::from_path(p).map_err(|e| PackagingError::io(Stage::Collect, p, e)))
        .collect::<Result<Vec<_>, _>>()?;
    artifacts.sort_by(|a, b| natural_cmp(&a.name, &b.name));
    log::debug!(
        "Collect: {} artifacts in {}",
        artifacts.len(),
        dir.display()
    );
    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eligible_names() {
        assert!(is_eligible_name("a.png"));
        assert!(is_eligible_name("README"));
        assert!(!is_eligible_name(".DS_Store"));
        assert!(!is_eligible_name("manifest.json"));
        assert!(!is_eligible_name("job.tar"));
        assert!(!is_eligible_name("job.cxpkg"));
        // only our own containers are excluded
        assert!(is_eligible_name("slides.zip"));
    }

    #[test]
    fn test_collect_sorted_with_details() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("item_10.PNG"), b"0123456789")?;
        std::fs::write(dir.path().join("item_2.png"), b"ab")?;
        std::fs::write(dir.path().join("item_1.png"), b"a")?;
        std::fs::write(dir.path().join(".hidden"), b"x")?;
        std::fs::write(dir.path().join("manifest.json"), b"{}")?;
        std::fs::create_dir(dir.path().join("nested"))?;

        let artifacts = collect_artifacts(dir.path())?;
        let names: Vec<_> = artifacts.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["item_1.png", "item_2.png", "item_10.PNG"]);
        assert_eq!(artifacts[2].format, "png");
        assert_eq!(artifacts[2].size, 10);
        assert!(artifacts[0].path.is_absolute());
        Ok(())
    }

    #[test]
    fn test_collect_missing_dir_is_collect_error() {
        let err = collect_artifacts(Path::new("/nonexistent/job-out")).unwrap_err();
        assert_eq!(err.stage(), Stage::Collect);
    }
}
