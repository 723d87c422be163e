//! CLI command definitions and dispatch.

pub mod build;
pub mod ctest;
pub mod data;
pub mod distrib;
pub mod dropin;
pub mod lockfile;
pub mod remove;
pub mod setup;
pub mod workflow;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use wigwam_common::config::WigwamConfig;
use wigwam_common::constants::TAG_PREFIX_ENV;
use wigwam_core::tag::TagResolver;
use wigwam_image::backend::{ImageBackend, detect_backend};
use wigwam_image::sink::OutputSinks;

/// wigwam: build images and run workflow tests in containers.
#[derive(Parser, Debug)]
#[command(name = "wigwam", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Prefix attached to image tags.
    #[arg(long, global = true, env = TAG_PREFIX_ENV)]
    pub prefix: Option<String>,

    /// Path to a JSON configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Also append build and workflow output to this file.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the environment images a project build starts from.
    Setup(setup::SetupArgs),
    /// Clone a GitHub repository into a new image.
    Clone(build::CloneArgs),
    /// Copy a host file or directory into a new image.
    Insert(build::InsertArgs),
    /// Configure the CMake build tree.
    #[command(alias = "config")]
    Configure(build::ConfigureArgs),
    /// Compile the configured build tree.
    Compile(build::CompileArgs),
    /// Install the compiled project.
    Install(build::InstallArgs),
    /// Run every stage from source checkout to installation.
    BuildAll(build::BuildAllArgs),
    /// Create a distributable image from an installed one.
    Distrib(distrib::DistribArgs),
    /// Run the CTest suite of an installed build.
    Test(ctest::TestArgs),
    /// Export an explicit conda lockfile from an image.
    Lockfile(lockfile::LockfileArgs),
    /// Run a workflow test on an image.
    Workflow(workflow::WorkflowArgs),
    /// Search and fetch test data.
    Data(data::DataArgs),
    /// Remove images matching tags or wildcards.
    Remove(remove::RemoveArgs),
    /// Open an interactive shell in an image.
    Dropin(dropin::DropinArgs),
}

/// Settings shared by every command.
#[derive(Debug)]
pub struct Context {
    /// Effective configuration.
    pub config: WigwamConfig,
    /// Extra output file.
    pub log_file: Option<PathBuf>,
}

impl Context {
    fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        let mut config =
            WigwamConfig::load(cli.config.as_deref()).map_err(|e| anyhow::anyhow!("{e}"))?;
        if let Some(prefix) = &cli.prefix {
            config.tag_prefix.clone_from(prefix);
        }
        tracing::debug!(prefix = %config.tag_prefix, "configuration loaded");
        Ok(Self {
            config,
            log_file: cli.log_file.clone(),
        })
    }

    /// Returns the tag resolver for the configured prefix.
    #[must_use]
    pub fn tags(&self) -> TagResolver {
        TagResolver::new(self.config.tag_prefix.clone())
    }

    /// Returns the output sinks: stderr plus the log file, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the log file cannot be opened.
    pub fn sinks(&self) -> anyhow::Result<OutputSinks> {
        let mut sinks = OutputSinks::stderr();
        if let Some(path) = &self.log_file {
            sinks.push_file(path).map_err(|e| anyhow::anyhow!("{e}"))?;
        }
        Ok(sinks)
    }

    /// Returns the container backend.
    ///
    /// # Errors
    ///
    /// Returns an error if no backend is usable on this host.
    pub fn backend(&self) -> anyhow::Result<Box<dyn ImageBackend>> {
        let backend = detect_backend();
        if !backend.is_available() {
            anyhow::bail!("docker was not found on this host");
        }
        Ok(backend)
    }
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let ctx = Context::from_cli(&cli)?;
    match cli.command {
        Command::Setup(args) => setup::execute(args, &ctx),
        Command::Clone(args) => build::execute_clone(args, &ctx),
        Command::Insert(args) => build::execute_insert(args, &ctx),
        Command::Configure(args) => build::execute_configure(args, &ctx),
        Command::Compile(args) => build::execute_compile(args, &ctx),
        Command::Install(args) => build::execute_install(args, &ctx),
        Command::BuildAll(args) => build::execute_build_all(args, &ctx),
        Command::Distrib(args) => distrib::execute(args, &ctx),
        Command::Test(args) => ctest::execute(args, &ctx),
        Command::Lockfile(args) => lockfile::execute(args, &ctx),
        Command::Workflow(args) => workflow::execute(args, &ctx),
        Command::Data(args) => data::execute(args, &ctx),
        Command::Remove(args) => remove::execute(args, &ctx),
        Command::Dropin(args) => dropin::execute(args, &ctx),
    }
}
