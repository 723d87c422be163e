//! Catalog queries.
//!
//! An item matches a query if its name matches any of the name globs, or if
//! its tags contain every tag of any one of the tag sets.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use glob::Pattern;
use serde_json::{Map, Value};
use wigwam_common::error::{Result, WigwamError};

use crate::catalog::{Catalog, CatalogItem};

/// A catalog query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    /// Alternative tag sets; an item must carry all tags of one set.
    pub tags: Vec<BTreeSet<String>>,
    /// Name globs; an item must match one of them.
    pub names: Vec<String>,
    /// Match every item. Exclusive with `tags` and `names`.
    pub all: bool,
}

impl SearchQuery {
    /// A query that matches every item.
    #[must_use]
    pub fn all() -> Self {
        Self {
            all: true,
            ..Self::default()
        }
    }

    /// A query over name globs.
    #[must_use]
    pub fn by_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// A query over tag sets.
    #[must_use]
    pub fn by_tags<I, T, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags
                .into_iter()
                .map(|set| set.into_iter().map(Into::into).collect())
                .collect(),
            ..Self::default()
        }
    }

    fn compile(&self) -> Result<Vec<Pattern>> {
        if self.all && (!self.tags.is_empty() || !self.names.is_empty()) {
            return Err(WigwamError::Usage {
                message: "\"all\" cannot be combined with tag or name filters".into(),
            });
        }
        self.names
            .iter()
            .map(|name| {
                Pattern::new(name).map_err(|e| WigwamError::Usage {
                    message: format!("invalid name pattern {name:?}: {e}"),
                })
            })
            .collect()
    }
}

fn accepts(item: &CatalogItem, query: &SearchQuery, patterns: &[Pattern]) -> bool {
    query.all
        || patterns.iter().any(|pattern| pattern.matches(&item.name))
        || query.tags.iter().any(|set| set.is_subset(&item.tags))
}

/// Returns the catalog items accepted by `query`, in catalog order.
///
/// # Errors
///
/// Returns `WigwamError::Usage` if `all` is combined with other filters or a
/// name pattern is invalid.
pub fn search<'c>(catalog: &'c Catalog, query: &SearchQuery) -> Result<Vec<&'c CatalogItem>> {
    let patterns = query.compile()?;
    let found: Vec<&CatalogItem> = catalog
        .items()
        .iter()
        .filter(|item| accepts(item, query, &patterns))
        .collect();
    tracing::debug!(matches = found.len(), "catalog search");
    Ok(found)
}

/// A field of a catalog item that can be projected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogField {
    /// `name`
    Name,
    /// `tags`
    Tags,
    /// `url`
    Url,
    /// `files`
    Files,
}

impl CatalogField {
    /// Every field, in file order.
    pub const ALL: [Self; 4] = [Self::Name, Self::Tags, Self::Url, Self::Files];

    /// Returns the JSON key of the field.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Tags => "tags",
            Self::Url => "url",
            Self::Files => "files",
        }
    }

    fn value_of(self, item: &CatalogItem) -> Value {
        match self {
            Self::Name => Value::from(item.name.clone()),
            Self::Tags => Value::from(item.tags.iter().cloned().collect::<Vec<_>>()),
            Self::Url => Value::from(item.url.clone()),
            Self::Files => Value::Object(
                item.files
                    .iter()
                    .map(|(file, hash)| (file.clone(), Value::from(hash.clone())))
                    .collect(),
            ),
        }
    }
}

impl FromStr for CatalogField {
    type Err = WigwamError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|field| field.key() == s)
            .ok_or_else(|| WigwamError::Usage {
                message: format!("unknown catalog field: {s}"),
            })
    }
}

impl fmt::Display for CatalogField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Like [`search`], but projects each item onto `fields`.
///
/// # Errors
///
/// Returns the same errors as [`search`].
pub fn filtered_search(
    catalog: &Catalog,
    query: &SearchQuery,
    fields: &[CatalogField],
) -> Result<Vec<Map<String, Value>>> {
    Ok(search(catalog, query)?
        .into_iter()
        .map(|item| {
            fields
                .iter()
                .map(|field| (field.key().to_string(), field.value_of(item)))
                .collect()
        })
        .collect())
}

/// Like [`search`], but returns only item names.
///
/// # Errors
///
/// Returns the same errors as [`search`].
pub fn names_only(catalog: &Catalog, query: &SearchQuery) -> Result<Vec<String>> {
    Ok(search(catalog, query)?
        .into_iter()
        .map(|item| item.name.clone())
        .collect())
}
