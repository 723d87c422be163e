//! # wigwam-image
//!
//! Everything that produces container images:
//!
//! - **Backend**: the [`backend::ImageBackend`] trait and its Docker implementation
//! - **Sinks**: explicit writers that receive build and run output
//! - **Dockerfiles**: the small templates each setup and build stage uses
//! - **Setup**: package manager and URL reader detection, CUDA versions
//! - **Stages**: the tag graph of a staged build
//! - **Pipeline**: setup, clone/insert, configure, compile, install and
//!   distrib stages, plus ctest runs and lockfile exports

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod backend;
pub mod ctest;
pub mod dockerfile;
pub mod lockfile;
pub mod pipeline;
pub mod setup;
pub mod sink;
pub mod stage;
