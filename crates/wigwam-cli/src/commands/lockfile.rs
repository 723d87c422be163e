//! `wigwam lockfile`: Export an explicit conda lockfile from an image.

use std::path::PathBuf;

use clap::Args;
use wigwam_image::lockfile::DEFAULT_ENV_NAME;
use wigwam_image::pipeline::BuildPipeline;

use super::Context;

/// Arguments for the `lockfile` command.
#[derive(Args, Debug)]
pub struct LockfileArgs {
    /// Tag or ID of the image, used as given.
    #[arg(short, long, value_name = "IMAGE_TAG")]
    pub tag: String,

    /// Output file. Printed to stdout if omitted.
    #[arg(short, long, value_name = "FILENAME")]
    pub file: Option<PathBuf>,

    /// Environment to export.
    #[arg(long, default_value = DEFAULT_ENV_NAME, value_name = "ENVIRONMENT")]
    pub env_name: String,
}

/// Executes the `lockfile` command.
///
/// # Errors
///
/// Returns an error if the export fails or the file cannot be written.
pub fn execute(args: LockfileArgs, ctx: &Context) -> anyhow::Result<()> {
    let backend = ctx.backend()?;
    let pipeline = BuildPipeline::new(backend.as_ref(), ctx.tags(), ctx.sinks()?);
    let lockfile = pipeline
        .lockfile(&args.tag, &args.env_name)
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    match &args.file {
        Some(path) => {
            std::fs::write(path, lockfile)
                .map_err(|e| anyhow::anyhow!("cannot write {}: {e}", path.display()))?;
            tracing::info!(path = %path.display(), "lockfile written");
        }
        None => print!("{lockfile}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{Cli, Command};
    use clap::Parser;

    #[test]
    fn env_name_defaults_to_base() {
        let cli = Cli::try_parse_from(["wigwam", "lockfile", "-t", "setup-mamba-dev"]).unwrap();
        let Command::Lockfile(args) = cli.command else {
            unreachable!("expected lockfile");
        };
        assert_eq!(args.env_name, "base");
        assert!(args.file.is_none());
    }

    #[test]
    fn tag_is_required() {
        assert!(Cli::try_parse_from(["wigwam", "lockfile", "-f", "lock.txt"]).is_err());
    }
}
