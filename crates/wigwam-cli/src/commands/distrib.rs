//! `wigwam distrib`: Create a distributable image.

use clap::Args;
use wigwam_image::pipeline::BuildPipeline;

use super::Context;

/// Arguments for the `distrib` command.
#[derive(Args, Debug)]
pub struct DistribArgs {
    /// Tag of the image to create.
    #[arg(short, long, default_value = "isce3")]
    pub tag: String,

    /// Runtime base image.
    #[arg(short, long, default_value = "setup-mamba-runtime")]
    pub base: String,

    /// Image that has the project installed.
    #[arg(short, long, default_value = "build-installed")]
    pub source_tag: String,
}

/// Executes the `distrib` command.
///
/// # Errors
///
/// Returns an error if the source image is missing or the build fails.
pub fn execute(args: DistribArgs, ctx: &Context) -> anyhow::Result<()> {
    let backend = ctx.backend()?;
    let mut pipeline = BuildPipeline::new(backend.as_ref(), ctx.tags(), ctx.sinks()?);
    let image = pipeline
        .distrib(&args.tag, &args.base, &args.source_tag)
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    println!("{}\t{image}", ctx.tags().resolve(&args.tag));
    Ok(())
}
