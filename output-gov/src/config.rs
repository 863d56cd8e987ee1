use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

/// Top-level configuration, passed explicitly to [`crate::ArgGovernor`] and
/// [`crate::Packager`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub governance: GovernanceConfig,
    pub packaging: PackagingConfig,
}

impl Config {
    /// Loads a JSON config file. Missing keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    /// Extensions (lowercase, no dot) treated as still-image targets.
    pub image_formats: Vec<String>,
    /// Value passed to `-color_range` when full range is forced.
    pub color_range: String,
    /// Options appended to scale filters so input/output range is explicit.
    pub range_options: String,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            // gif is left out: it is an animated target
            image_formats: [
                "png", "jpg", "jpeg", "bmp", "tif", "tiff", "webp", "avif", "ico", "tga", "ppm",
                "pgm", "jxl",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            color_range: "pc".to_string(),
            range_options: "in_range=auto:out_range=full".to_string(),
        }
    }
}

impl GovernanceConfig {
    pub fn is_image_format(&self, format: &str) -> bool {
        let format = format.trim_start_matches('.');
        self.image_formats
            .iter()
            .any(|f| f.eq_ignore_ascii_case(format))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PackagingConfig {
    /// Where canonical structures are staged. None = hidden directory next to
    /// the package.
    pub staging_root: Option<PathBuf>,
    /// Remove the staging directory once the package has been persisted.
    pub remove_staging: bool,
    /// Record per-artifact size/format/timestamps in the manifest.
    pub record_artifact_details: bool,
}

impl Default for PackagingConfig {
    fn default() -> Self {
        Self {
            staging_root: None,
            remove_staging: false,
            record_artifact_details: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_image_formats() {
        let config = GovernanceConfig::default();
        assert!(config.is_image_format("png"));
        assert!(config.is_image_format("JPG"));
        assert!(config.is_image_format(".webp"));
        assert!(!config.is_image_format("gif"));
        assert!(!config.is_image_format("mp4"));
    }

    #[test]
    fn test_partial_json_keeps_defaults() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "governance": { "color_range": "jpeg" }, "packaging": { "remove_staging": true } }"#,
        )?;

        let config = Config::from_file(&path)?;
        assert_eq!(config.governance.color_range, "jpeg");
        assert_eq!(
            config.governance.range_options,
            "in_range=auto:out_range=full"
        );
        assert!(config.governance.is_image_format("png"));
        assert!(config.packaging.remove_staging);
        assert!(config.packaging.staging_root.is_none());
        Ok(())
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = Config::from_file("/nonexistent/convertx.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
