//! Catalog of fetchable data repositories.
//!
//! The catalog file has the shape `{"data": [item, ...]}`. Item names are
//! the catalog's primary key.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use wigwam_common::error::{Result, WigwamError};

/// One data repository in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Unique repository name.
    pub name: String,
    /// Tags used for searching.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Location the files are fetched from.
    #[serde(default)]
    pub url: String,
    /// File names mapped to their content hashes.
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CatalogFile {
    data: Vec<CatalogItem>,
}

/// An in-memory catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    items: Vec<CatalogItem>,
}

impl Catalog {
    /// Builds a catalog from items.
    ///
    /// # Errors
    ///
    /// Returns `WigwamError::Config` if two items share a name.
    pub fn from_items(items: Vec<CatalogItem>) -> Result<Self> {
        let mut seen = HashSet::new();
        for item in &items {
            if !seen.insert(item.name.as_str()) {
                return Err(WigwamError::Config {
                    message: format!("duplicate catalog item: {}", item.name),
                });
            }
        }
        Ok(Self { items })
    }

    /// Parses a catalog from JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid JSON or duplicate item names.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(json)?;
        Self::from_items(file.data)
    }

    /// Loads a catalog file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| WigwamError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let catalog = Self::from_json(&content)?;
        tracing::debug!(path = %path.display(), items = catalog.len(), "loaded data catalog");
        Ok(catalog)
    }

    /// Returns all items in file order.
    #[must_use]
    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    /// Looks up an item by exact name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CatalogItem> {
        self.items.iter().find(|item| item.name == name)
    }

    /// Returns the number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"{
        "data": [
            {"name": "L0B_RRST_A", "tags": ["L0B", "RRST"], "url": "https://example.org/a",
             "files": {"a.h5": "abc123"}},
            {"name": "DEM", "tags": ["dem"], "url": "https://example.org/dem", "files": {}}
        ]
    }"#;

    #[test]
    fn parses_items() {
        let catalog = Catalog::from_json(CATALOG).unwrap();
        assert_eq!(catalog.len(), 2);
        let item = catalog.get("L0B_RRST_A").unwrap();
        assert!(item.tags.contains("RRST"));
        assert_eq!(item.files["a.h5"], "abc123");
    }

    #[test]
    fn missing_optional_fields_default() {
        let catalog = Catalog::from_json(r#"{"data": [{"name": "x"}]}"#).unwrap();
        let item = catalog.get("x").unwrap();
        assert!(item.tags.is_empty());
        assert!(item.url.is_empty());
    }

    #[test]
    fn duplicate_names_rejected() {
        let err = Catalog::from_json(r#"{"data": [{"name": "x"}, {"name": "x"}]}"#).unwrap_err();
        assert!(matches!(err, WigwamError::Config { .. }));
    }

    #[test]
    fn missing_data_key_rejected() {
        let err = Catalog::from_json(r#"{"items": []}"#).unwrap_err();
        assert!(matches!(err, WigwamError::Serialization { .. }));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("workflowdata.json");
        std::fs::write(&path, CATALOG).expect("write");

        let catalog = Catalog::load(&path).unwrap();
        assert_eq!(catalog.items()[1].name, "DEM");
    }
}
