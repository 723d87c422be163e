//! # wigwam-workflow
//!
//! Containerized workflow tests:
//!
//! - **Test database**: `workflowtests.json` parsed into owned test trees
//! - **Commands**: workflow name to command template mapping
//! - **Engine**: validation, mounts and execution of single and series tests

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod commands;
pub mod engine;
pub mod testdb;
