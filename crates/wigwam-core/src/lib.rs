//! # wigwam-core
//!
//! Primitives shared by the build pipeline and the workflow engine:
//!
//! - **Tags**: prefix-normalized image tags
//! - **Mounts**: validated `host:container:perm` bind mounts
//! - **Scratch**: scoped scratch directories removed on every exit path
//! - **Inputs**: mapping of test input repositories to host paths

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod inputs;
pub mod mount;
pub mod scratch;
pub mod tag;
