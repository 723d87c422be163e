//! `wigwam remove`: Remove images by tag or wildcard.

use clap::Args;

use super::Context;

/// Arguments for the `remove` command.
#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Image tags or wildcards. Prefixed unless already prefixed.
    #[arg(value_name = "IMAGE_TAG", required = true)]
    pub tags: Vec<String>,

    /// Force removal of images used by containers.
    #[arg(short, long)]
    pub force: bool,

    /// Use the patterns as given, without the prefix. Matches images of
    /// every project, so wildcards remove more than expected.
    #[arg(long)]
    pub ignore_prefix: bool,
}

/// Executes the `remove` command.
///
/// # Errors
///
/// Returns an error if listing or removing images fails.
pub fn execute(args: RemoveArgs, ctx: &Context) -> anyhow::Result<()> {
    let backend = ctx.backend()?;
    let tags = ctx.tags();
    let mut total = 0;
    for pattern in &args.tags {
        let search = tags.resolve_with(pattern, args.ignore_prefix);
        let removed = backend
            .remove(search.as_str(), args.force)
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        if removed.is_empty() {
            eprintln!("No images found matching pattern {search}.");
        }
        for id in &removed {
            println!("{id}");
        }
        total += removed.len();
    }
    tracing::info!(removed = total, "image removal completed");
    Ok(())
}
