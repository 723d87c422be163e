//! Integration tests for workflow test execution.
//!
//! These tests are implemented in:
//! `crates/wigwam-workflow/tests/engine_test.rs`
//! `crates/wigwam-workflow/tests/e2e_test.rs`
//!
//! Covered scenarios:
//! - `single_test_runs_once_with_standard_mounts`: Output, runconfig, input and scratch mounts
//! - `series_runs_in_listed_order_through_nested_series`: Depth-first order across nested series
//! - `parallel_group_rejected_before_any_run`: Parallel groups fail validation
//! - `temporary_scratch_removed_after_failure`: Scratch cleanup on every exit path
//! - `escaping_series_tag_rejected_before_any_directory_is_made`: Series labels stay inside the roots
//! - `failed_single_test_report_records_failure`: Failed runs keep a report in state `Failed`
//! - `e2e_single_test_with_labeled_inputs`: Labeled inputs combined with cache lookups
//! - `e2e_series_test_shares_mounts_across_steps`: Series steps share roots with per-step subdirectories
