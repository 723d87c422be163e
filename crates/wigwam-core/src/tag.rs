//! Prefix normalization of image tags.

use wigwam_common::types::ImageTag;

/// Attaches the process-wide prefix to image tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagResolver {
    prefix: String,
}

impl TagResolver {
    /// Creates a resolver for the given prefix.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Returns the configured prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns `tag` prefixed with `"<prefix>-"` unless it already is.
    ///
    /// Resolving an already resolved tag returns it unchanged.
    #[must_use]
    pub fn resolve(&self, tag: &str) -> ImageTag {
        if self.is_prefixed(tag) {
            ImageTag::new(tag)
        } else {
            ImageTag::new(format!("{}-{tag}", self.prefix))
        }
    }

    /// Like [`resolve`](Self::resolve), but leaves the tag untouched when
    /// `ignore_prefix` is set.
    #[must_use]
    pub fn resolve_with(&self, tag: &str, ignore_prefix: bool) -> ImageTag {
        if ignore_prefix {
            ImageTag::new(tag)
        } else {
            self.resolve(tag)
        }
    }

    fn is_prefixed(&self, tag: &str) -> bool {
        tag.strip_prefix(self.prefix.as_str())
            .is_some_and(|rest| rest.starts_with('-'))
    }
}

impl Default for TagResolver {
    fn default() -> Self {
        Self::new(wigwam_common::constants::DEFAULT_TAG_PREFIX)
    }
}
