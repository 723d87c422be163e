//! Global configuration model for wigwam.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{Result, WigwamError};

/// Root configuration, loadable from a JSON file.
///
/// Missing fields fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WigwamConfig {
    /// Prefix attached to every image tag.
    pub tag_prefix: String,
    /// Catalog of fetchable data repositories.
    pub catalog_file: PathBuf,
    /// Database of workflow tests.
    pub test_file: PathBuf,
    /// Host directory holding runconfig files.
    pub runconfig_dir: PathBuf,
    /// Default cache directory for fetched data.
    pub cache_dir: PathBuf,
    /// Image providing the data fetch tool.
    pub fetch_image: String,
    /// Registry reference pulled when `fetch_image` is missing. `None`
    /// disables pulling.
    pub fetch_image_source: Option<String>,
    /// Maximum number of concurrent fetches.
    pub fetch_workers: usize,
}

impl Default for WigwamConfig {
    fn default() -> Self {
        Self {
            tag_prefix: constants::DEFAULT_TAG_PREFIX.into(),
            catalog_file: PathBuf::from(constants::DEFAULT_CATALOG_FILE),
            test_file: PathBuf::from(constants::DEFAULT_TEST_FILE),
            runconfig_dir: PathBuf::from(constants::DEFAULT_RUNCONFIG_DIR),
            cache_dir: PathBuf::from(constants::DEFAULT_CACHE_DIR),
            fetch_image: constants::DEFAULT_FETCH_IMAGE.into(),
            fetch_image_source: Some(constants::DEFAULT_FETCH_IMAGE_SOURCE.into()),
            fetch_workers: constants::DEFAULT_FETCH_WORKERS,
        }
    }
}

impl WigwamConfig {
    /// Loads configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON,
    /// or requests zero fetch workers.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| WigwamError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        if config.fetch_workers == 0 {
            return Err(WigwamError::Config {
                message: "fetch_workers must be at least 1".into(),
            });
        }
        Ok(config)
    }

    /// Loads configuration from `path` if given, else returns the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the given file cannot be loaded.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::from_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_constants() {
        let config = WigwamConfig::default();
        assert_eq!(config.tag_prefix, "wigwam");
        assert_eq!(config.fetch_workers, 4);
        assert_eq!(config.cache_dir, PathBuf::from("./cache"));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("wigwam.json");
        std::fs::write(&path, r#"{"tag_prefix": "nisar"}"#).expect("write");

        let config = WigwamConfig::from_file(&path).expect("load");
        assert_eq!(config.tag_prefix, "nisar");
        assert_eq!(config.fetch_image, "rover");
        assert!(config.fetch_image_source.is_some());
    }

    #[test]
    fn null_pull_source_disables_pulling() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("wigwam.json");
        std::fs::write(&path, r#"{"fetch_image_source": null}"#).expect("write");

        let config = WigwamConfig::from_file(&path).expect("load");
        assert_eq!(config.fetch_image_source, None);
    }

    #[test]
    fn zero_workers_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("wigwam.json");
        std::fs::write(&path, r#"{"fetch_workers": 0}"#).expect("write");

        let err = WigwamConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, WigwamError::Config { .. }));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = WigwamConfig::load(Some(Path::new("/nonexistent/wigwam.json"))).unwrap_err();
        assert!(matches!(err, WigwamError::Io { .. }));
    }
}
