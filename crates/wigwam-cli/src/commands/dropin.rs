//! `wigwam dropin`: Interactive shell in a disposable container.

use clap::Args;

use super::Context;

/// Arguments for the `dropin` command.
#[derive(Args, Debug)]
pub struct DropinArgs {
    /// Tag or ID of the image. Tags are prefixed unless already prefixed.
    #[arg(value_name = "IMAGE_TAG")]
    pub tag: String,
}

/// Executes the `dropin` command.
///
/// # Errors
///
/// Returns an error if the image does not exist or the shell cannot start.
pub fn execute(args: DropinArgs, ctx: &Context) -> anyhow::Result<()> {
    let backend = ctx.backend()?;
    let tag = ctx.tags().resolve(&args.tag);
    let image = backend
        .image_id(tag.as_str())
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    tracing::info!(tag = %tag, image = %image, "starting drop-in session");
    backend
        .drop_in(tag.as_str(), &[])
        .map_err(|e| anyhow::anyhow!("{e}"))
}
