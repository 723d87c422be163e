//! `wigwam setup`: Build the environment images a project build starts from.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use wigwam_image::pipeline::BuildPipeline;
use wigwam_image::setup::{CudaVersion, SetupAllOptions};

use super::Context;

const DEFAULT_BASE: &str = "oraclelinux:8.4";
const DEFAULT_CUDA_VERSION: &str = "11.4";
const DEFAULT_CUDA_REPO: &str = "rhel8";
const DEFAULT_RUNTIME_ENV_FILE: &str = "env_files/lock-runtime.txt";
const DEFAULT_DEV_ENV_FILE: &str = "env_files/lock-dev.txt";

/// Arguments for the `setup` command.
#[derive(Args, Debug)]
pub struct SetupArgs {
    /// Setup stage to build.
    #[command(subcommand)]
    pub command: SetupCommand,
}

/// Setup stages.
#[derive(Subcommand, Debug)]
pub enum SetupCommand {
    /// Build every setup image, from the distribution base to the
    /// development environment.
    All(SetupAllArgs),
    /// Add the default user and the missing base tools to a distribution
    /// image.
    Init(InitArgs),
    /// CUDA runtime or compiler image.
    Cuda(CudaArgs),
    /// Conda runtime or development environment image.
    Conda(CondaArgs),
}

/// Arguments for `setup all`.
#[derive(Args, Debug)]
pub struct SetupAllArgs {
    /// Root tag. Images are tagged `<prefix>-<tag>-<stage>`.
    #[arg(short, long, default_value = "setup")]
    pub tag: String,

    /// Distribution image the stack starts from.
    #[arg(short, long, default_value = DEFAULT_BASE)]
    pub base: String,

    /// Runtime environment requirements file.
    #[arg(long, default_value = DEFAULT_RUNTIME_ENV_FILE)]
    pub runtime_env_file: PathBuf,

    /// Development environment requirements file.
    #[arg(long, default_value = DEFAULT_DEV_ENV_FILE)]
    pub dev_env_file: PathBuf,

    /// CUDA version in `<major>.<minor>` form.
    #[arg(short, long, default_value = DEFAULT_CUDA_VERSION)]
    pub cuda_version: String,

    /// NVIDIA repository of the distribution.
    #[arg(long, default_value = DEFAULT_CUDA_REPO)]
    pub cuda_repo: String,

    /// Build without the layer cache.
    #[arg(long)]
    pub no_cache: bool,
}

impl SetupAllArgs {
    fn options(&self) -> anyhow::Result<SetupAllOptions> {
        Ok(SetupAllOptions {
            tag: self.tag.clone(),
            base: self.base.clone(),
            cuda_version: CudaVersion::parse(&self.cuda_version)
                .map_err(|e| anyhow::anyhow!("{e}"))?,
            cuda_repo: self.cuda_repo.clone(),
            runtime_env_file: self.runtime_env_file.clone(),
            dev_env_file: self.dev_env_file.clone(),
            no_cache: self.no_cache,
        })
    }
}

/// Arguments for `setup init`.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Tag of the image to create.
    #[arg(short, long, default_value = "init")]
    pub tag: String,

    /// Distribution image, used without the tag prefix.
    #[arg(short, long, default_value = DEFAULT_BASE)]
    pub base: String,

    /// Build without the layer cache.
    #[arg(long)]
    pub no_cache: bool,
}

/// Arguments for `setup cuda`.
#[derive(Args, Debug)]
pub struct CudaArgs {
    /// CUDA image to build.
    #[command(subcommand)]
    pub command: CudaCommand,
}

/// CUDA images.
#[derive(Subcommand, Debug)]
pub enum CudaCommand {
    /// Install the CUDA runtime.
    Runtime(CudaRuntimeArgs),
    /// Install the CUDA compiler on a CUDA runtime image.
    Dev(CudaDevArgs),
}

/// Arguments for `setup cuda runtime`.
#[derive(Args, Debug)]
pub struct CudaRuntimeArgs {
    /// Tag of the image to create.
    #[arg(short, long, default_value = "cuda-runtime")]
    pub tag: String,

    /// Base image.
    #[arg(short, long)]
    pub base: String,

    /// CUDA version in `<major>.<minor>` form.
    #[arg(short, long, default_value = DEFAULT_CUDA_VERSION)]
    pub cuda_version: String,

    /// NVIDIA repository of the distribution.
    #[arg(long, default_value = DEFAULT_CUDA_REPO)]
    pub cuda_repo: String,

    /// Build without the layer cache.
    #[arg(long)]
    pub no_cache: bool,
}

/// Arguments for `setup cuda dev`.
#[derive(Args, Debug)]
pub struct CudaDevArgs {
    /// Tag of the image to create.
    #[arg(short, long, default_value = "cuda-dev")]
    pub tag: String,

    /// Base image.
    #[arg(short, long)]
    pub base: String,

    /// Build without the layer cache.
    #[arg(long)]
    pub no_cache: bool,
}

/// Arguments for `setup conda`.
#[derive(Args, Debug)]
pub struct CondaArgs {
    /// Conda image to build.
    #[command(subcommand)]
    pub command: CondaCommand,
}

/// Conda images.
#[derive(Subcommand, Debug)]
pub enum CondaCommand {
    /// Install micromamba and the runtime environment.
    Runtime(CondaRuntimeArgs),
    /// Add the development environment to a conda runtime image.
    Dev(CondaDevArgs),
}

/// Arguments for `setup conda runtime`.
#[derive(Args, Debug)]
pub struct CondaRuntimeArgs {
    /// Tag of the image to create.
    #[arg(short, long, default_value = "conda-runtime")]
    pub tag: String,

    /// Base image.
    #[arg(short, long)]
    pub base: String,

    /// Requirements file.
    #[arg(long, default_value = DEFAULT_RUNTIME_ENV_FILE)]
    pub env_file: PathBuf,

    /// Build without the layer cache.
    #[arg(long)]
    pub no_cache: bool,
}

/// Arguments for `setup conda dev`.
#[derive(Args, Debug)]
pub struct CondaDevArgs {
    /// Tag of the image to create.
    #[arg(short, long, default_value = "conda-dev")]
    pub tag: String,

    /// Base image.
    #[arg(short, long)]
    pub base: String,

    /// Requirements file.
    #[arg(long, default_value = DEFAULT_DEV_ENV_FILE)]
    pub env_file: PathBuf,

    /// Build without the layer cache.
    #[arg(long)]
    pub no_cache: bool,
}

/// Executes the `setup` command.
///
/// # Errors
///
/// Returns an error if the options are invalid, the base image lacks a
/// supported package manager, or a build fails.
pub fn execute(args: SetupArgs, ctx: &Context) -> anyhow::Result<()> {
    let backend = ctx.backend()?;
    let mut pipeline = BuildPipeline::new(backend.as_ref(), ctx.tags(), ctx.sinks()?);
    let (tag, result) = match args.command {
        SetupCommand::All(args) => {
            let options = args.options()?;
            let images = pipeline
                .setup_all(&options)
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            for (tag, image) in &images {
                println!("{tag}\t{image}");
            }
            return Ok(());
        }
        SetupCommand::Init(args) => {
            let result = pipeline.setup_init(&args.tag, &args.base, args.no_cache);
            (args.tag, result)
        }
        SetupCommand::Cuda(CudaArgs {
            command: CudaCommand::Runtime(args),
        }) => {
            let version = CudaVersion::parse(&args.cuda_version).map_err(|e| anyhow::anyhow!("{e}"))?;
            let result = pipeline.setup_cuda_runtime(
                &args.tag,
                &args.base,
                version,
                &args.cuda_repo,
                args.no_cache,
            );
            (args.tag, result)
        }
        SetupCommand::Cuda(CudaArgs {
            command: CudaCommand::Dev(args),
        }) => {
            let result = pipeline.setup_cuda_dev(&args.tag, &args.base, args.no_cache);
            (args.tag, result)
        }
        SetupCommand::Conda(CondaArgs {
            command: CondaCommand::Runtime(args),
        }) => {
            let result =
                pipeline.setup_conda_runtime(&args.tag, &args.base, &args.env_file, args.no_cache);
            (args.tag, result)
        }
        SetupCommand::Conda(CondaArgs {
            command: CondaCommand::Dev(args),
        }) => {
            let result =
                pipeline.setup_conda_dev(&args.tag, &args.base, &args.env_file, args.no_cache);
            (args.tag, result)
        }
    };
    let image = result.map_err(|e| anyhow::anyhow!("{e}"))?;
    println!("{}\t{image}", ctx.tags().resolve(&tag));
    Ok(())
}
