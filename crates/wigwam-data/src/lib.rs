//! # wigwam-data
//!
//! Test input data management:
//!
//! - **Catalog**: the JSON database of fetchable data repositories
//! - **Search**: name-glob and tag-set queries over the catalog
//! - **Fetch**: bounded concurrent fetching of catalog items into a cache

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod catalog;
pub mod fetch;
pub mod search;
