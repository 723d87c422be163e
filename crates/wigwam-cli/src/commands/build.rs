//! `wigwam clone|insert|configure|compile|install|build-all`: Staged image builds.

use std::path::PathBuf;

use clap::Args;
use wigwam_image::pipeline::{BuildAllOptions, BuildPipeline, SourceSpec};

use super::Context;

const DEFAULT_REPO: &str = "isce-framework/isce3";
const BUILD_TYPES: [&str; 4] = ["Release", "Debug", "RelWithDebInfo", "MinSizeRel"];

/// Arguments for the `clone` command.
#[derive(Args, Debug)]
pub struct CloneArgs {
    /// Tag of the image to create. Prefixed unless already prefixed.
    #[arg(short, long, default_value = "repo")]
    pub tag: String,

    /// Base image.
    #[arg(short, long)]
    pub base: String,

    /// GitHub repository in USER/REPO format.
    #[arg(long, default_value = DEFAULT_REPO)]
    pub repo: String,

    /// Branch to check out.
    #[arg(long)]
    pub branch: Option<String>,

    /// Build without the layer cache.
    #[arg(long)]
    pub no_cache: bool,
}

/// Arguments for the `insert` command.
#[derive(Args, Debug)]
pub struct InsertArgs {
    /// Tag of the image to create.
    #[arg(short, long, default_value = "file")]
    pub tag: String,

    /// Base image.
    #[arg(short, long)]
    pub base: String,

    /// Host file or directory to copy.
    #[arg(short, long)]
    pub path: PathBuf,

    /// Build without the layer cache.
    #[arg(long)]
    pub no_cache: bool,
}

/// Arguments for the `configure` command.
#[derive(Args, Debug)]
pub struct ConfigureArgs {
    /// Tag of the image to create.
    #[arg(short, long, default_value = "configured")]
    pub tag: String,

    /// Base image.
    #[arg(short, long)]
    pub base: String,

    /// CMake build type.
    #[arg(long, default_value = "Release", value_parser = BUILD_TYPES)]
    pub build_type: String,

    /// Configure without CUDA.
    #[arg(long)]
    pub no_cuda: bool,

    /// Build without the layer cache.
    #[arg(long)]
    pub no_cache: bool,
}

/// Arguments for the `compile` command.
#[derive(Args, Debug)]
pub struct CompileArgs {
    /// Tag of the image to create.
    #[arg(short, long, default_value = "compiled")]
    pub tag: String,

    /// Base image.
    #[arg(short, long)]
    pub base: String,

    /// Build without the layer cache.
    #[arg(long)]
    pub no_cache: bool,
}

/// Arguments for the `install` command.
#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Tag of the image to create.
    #[arg(short, long, default_value = "installed")]
    pub tag: String,

    /// Base image.
    #[arg(short, long)]
    pub base: String,

    /// Build without the layer cache.
    #[arg(long)]
    pub no_cache: bool,
}

/// Arguments for the `build-all` command.
#[derive(Args, Debug)]
pub struct BuildAllArgs {
    /// Root tag. Stage images are tagged `<prefix>-<tag>-<stage>`.
    #[arg(short, long, default_value = "build")]
    pub tag: String,

    /// Base image of the source stage.
    #[arg(short, long, default_value = "setup-mamba-dev")]
    pub base: String,

    /// GitHub repository in USER/REPO format.
    #[arg(long, default_value = DEFAULT_REPO, conflicts_with = "copy_path")]
    pub repo: String,

    /// Branch to check out.
    #[arg(long, conflicts_with = "copy_path")]
    pub branch: Option<String>,

    /// Host path to copy instead of cloning a repository.
    #[arg(short = 'p', long, value_name = "FILEPATH")]
    pub copy_path: Option<PathBuf>,

    /// CMake build type.
    #[arg(long, default_value = "Release", value_parser = BUILD_TYPES)]
    pub build_type: String,

    /// Configure without CUDA.
    #[arg(long)]
    pub no_cuda: bool,

    /// Build without the layer cache.
    #[arg(long)]
    pub no_cache: bool,
}

impl BuildAllArgs {
    fn options(&self) -> anyhow::Result<BuildAllOptions> {
        let repo = self.copy_path.is_none().then_some(self.repo.as_str());
        let source = SourceSpec::from_options(repo, self.copy_path.as_deref(), self.branch.as_deref())
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        Ok(BuildAllOptions {
            tag: self.tag.clone(),
            base: self.base.clone(),
            source,
            build_type: self.build_type.clone(),
            no_cuda: self.no_cuda,
            no_cache: self.no_cache,
        })
    }
}

fn report(tag: &str, ctx: &Context, image: &impl std::fmt::Display) {
    println!("{}\t{image}", ctx.tags().resolve(tag));
}

/// Executes the `clone` command.
///
/// # Errors
///
/// Returns an error if the repository is malformed or the build fails.
pub fn execute_clone(args: CloneArgs, ctx: &Context) -> anyhow::Result<()> {
    let backend = ctx.backend()?;
    let mut pipeline = BuildPipeline::new(backend.as_ref(), ctx.tags(), ctx.sinks()?);
    let image = pipeline
        .clone_repo(&args.tag, &args.base, &args.repo, args.branch.as_deref(), args.no_cache)
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    report(&args.tag, ctx, &image);
    Ok(())
}

/// Executes the `insert` command.
///
/// # Errors
///
/// Returns an error if the path does not exist or the build fails.
pub fn execute_insert(args: InsertArgs, ctx: &Context) -> anyhow::Result<()> {
    let backend = ctx.backend()?;
    let mut pipeline = BuildPipeline::new(backend.as_ref(), ctx.tags(), ctx.sinks()?);
    let image = pipeline
        .insert(&args.tag, &args.base, &args.path, args.no_cache)
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    report(&args.tag, ctx, &image);
    Ok(())
}

/// Executes the `configure` command.
///
/// # Errors
///
/// Returns an error if the build fails.
pub fn execute_configure(args: ConfigureArgs, ctx: &Context) -> anyhow::Result<()> {
    let backend = ctx.backend()?;
    let mut pipeline = BuildPipeline::new(backend.as_ref(), ctx.tags(), ctx.sinks()?);
    let image = pipeline
        .configure(&args.tag, &args.base, &args.build_type, args.no_cuda, args.no_cache)
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    report(&args.tag, ctx, &image);
    Ok(())
}

/// Executes the `compile` command.
///
/// # Errors
///
/// Returns an error if the build fails.
pub fn execute_compile(args: CompileArgs, ctx: &Context) -> anyhow::Result<()> {
    let backend = ctx.backend()?;
    let mut pipeline = BuildPipeline::new(backend.as_ref(), ctx.tags(), ctx.sinks()?);
    let image = pipeline
        .compile(&args.tag, &args.base, args.no_cache)
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    report(&args.tag, ctx, &image);
    Ok(())
}

/// Executes the `install` command.
///
/// # Errors
///
/// Returns an error if the build fails.
pub fn execute_install(args: InstallArgs, ctx: &Context) -> anyhow::Result<()> {
    let backend = ctx.backend()?;
    let mut pipeline = BuildPipeline::new(backend.as_ref(), ctx.tags(), ctx.sinks()?);
    let image = pipeline
        .install(&args.tag, &args.base, args.no_cache)
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    report(&args.tag, ctx, &image);
    Ok(())
}

/// Executes the `build-all` command.
///
/// The whole plan is validated before the first image is built.
///
/// # Errors
///
/// Returns an error if the options are invalid or any stage fails.
pub fn execute_build_all(args: BuildAllArgs, ctx: &Context) -> anyhow::Result<()> {
    let options = args.options()?;
    let backend = ctx.backend()?;
    let mut pipeline = BuildPipeline::new(backend.as_ref(), ctx.tags(), ctx.sinks()?);
    let images = pipeline
        .build_all(&options)
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    for (tag, image) in &images {
        println!("{tag}\t{image}");
    }
    Ok(())
}
