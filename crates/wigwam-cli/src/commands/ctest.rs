//! `wigwam test`: Run the CTest suite of an installed build.

use std::path::PathBuf;

use clap::Args;
use wigwam_common::constants::DEFAULT_TEST_OUTPUT_DIR;
use wigwam_image::ctest::{CtestOptions, DEFAULT_REPORT_NAME};
use wigwam_image::pipeline::BuildPipeline;

use super::Context;

/// Arguments for the `test` command.
#[derive(Args, Debug)]
pub struct TestArgs {
    /// Image to test. Prefixed unless already prefixed.
    #[arg(short, long, default_value = "build-installed")]
    pub tag: String,

    /// File name of the XML test report.
    #[arg(short, long, default_value = DEFAULT_REPORT_NAME)]
    pub logfile: String,

    /// Host directory receiving the report.
    #[arg(short, long, default_value = DEFAULT_TEST_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// Let ctest compress test output.
    #[arg(long)]
    pub compress_output: bool,

    /// Do not print the output of failing tests.
    #[arg(long)]
    pub quiet_fail: bool,
}

impl TestArgs {
    fn options(&self) -> CtestOptions {
        CtestOptions {
            report_name: self.logfile.clone(),
            output_dir: self.output_dir.clone(),
            compress_output: self.compress_output,
            quiet_fail: self.quiet_fail,
        }
    }
}

/// Executes the `test` command, printing the report's path.
///
/// # Errors
///
/// Returns an error if the report name is not a plain file name, the
/// output directory cannot be created, or no report was produced.
pub fn execute(args: TestArgs, ctx: &Context) -> anyhow::Result<()> {
    let backend = ctx.backend()?;
    let mut pipeline = BuildPipeline::new(backend.as_ref(), ctx.tags(), ctx.sinks()?);
    let report = pipeline
        .ctest(&args.tag, &args.options())
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    println!("{}", report.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{Cli, Command};
    use clap::Parser;

    fn test_args(args: &[&str]) -> TestArgs {
        let argv = ["wigwam", "test"].iter().chain(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Test(args) => args,
            other => unreachable!("parsed {other:?}"),
        }
    }

    #[test]
    fn defaults_keep_output() {
        let options = test_args(&[]).options();
        assert_eq!(options, CtestOptions::default());
    }

    #[test]
    fn flags_reach_options() {
        let options = test_args(&["-t", "app", "-l", "nightly.xml", "--quiet-fail"]).options();
        assert_eq!(options.report_name, "nightly.xml");
        assert!(options.quiet_fail);
        assert!(!options.compress_output);
    }
}
