//! Integration tests for catalog search and data fetching.
//!
//! These tests are implemented in:
//! `crates/wigwam-data/tests/fetch_test.rs`
//! `crates/wigwam-workflow/tests/e2e_test.rs`
//!
//! Covered scenarios:
//! - `concurrency_is_bounded_by_worker_count`: At most N fetches in flight
//! - `first_failure_is_returned`: The failing repository and its diagnostic are reported
//! - `failure_stops_dispatch_of_later_jobs`: No new fetches start after a failure
//! - `missing_fetch_image_is_pulled_and_tagged`: A missing fetch image is pulled before fetching
//! - `search_results_feed_fetch`: Tag search output drives the fetch batch
//! - `e2e_fetch_test_inputs_from_catalog`: Test inputs looked up in the catalog and fetched
