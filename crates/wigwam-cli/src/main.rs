//! # wigwam: image build and workflow test CLI
//!
//! Builds software images stage by stage, fetches test data and runs
//! containerized workflow tests.

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod commands;
mod output;

use clap::Parser;

use crate::commands::Cli;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    commands::execute(cli)
}
