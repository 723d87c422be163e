//! `wigwam workflow`: Run a workflow test on an image.

use std::path::PathBuf;

use clap::Args;
use wigwam_core::inputs::{parse_input_args, resolve_inputs};
use wigwam_workflow::engine::{WorkflowEngine, WorkflowParams};
use wigwam_workflow::testdb::TestDatabase;

use super::Context;
use crate::output::format_report;

/// Arguments for the `workflow` command.
#[derive(Args, Debug)]
pub struct WorkflowArgs {
    /// Name of the workflow.
    #[arg(value_name = "WORKFLOW")]
    pub workflow_name: String,

    /// Name of the test on the workflow.
    #[arg(value_name = "TEST")]
    pub test: String,

    /// Tag or ID of the image to test.
    #[arg(long, value_name = "IMAGE_TAG", default_value = "isce3")]
    pub image: String,

    /// Host directory for test output.
    #[arg(short, long)]
    pub output_dir: PathBuf,

    /// Workflow test database.
    #[arg(long)]
    pub test_file: Option<PathBuf>,

    /// Directory holding the runconfig files.
    #[arg(long)]
    pub runconfig_dir: Option<PathBuf>,

    /// Input directories, as PATH or LABEL:PATH.
    #[arg(short, long, num_args = 1..)]
    pub input_dirs: Vec<String>,

    /// Cache directories searched for inputs. The configured cache is
    /// always searched last.
    #[arg(short, long, num_args = 1..)]
    pub cache_dirs: Vec<PathBuf>,

    /// Persistent scratch directory. A temporary one is used otherwise.
    #[arg(short, long)]
    pub scratch_dir: Option<PathBuf>,

    /// Print the run report as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Executes the `workflow` command.
///
/// # Errors
///
/// Returns an error if the test is unknown, inputs cannot be resolved,
/// or the workflow fails.
pub fn execute(args: WorkflowArgs, ctx: &Context) -> anyhow::Result<()> {
    let test_file = args.test_file.unwrap_or_else(|| ctx.config.test_file.clone());
    let db = TestDatabase::load(&test_file).map_err(|e| anyhow::anyhow!("{e}"))?;
    let spec = db
        .get(&args.workflow_name, &args.test)
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    let supplied = parse_input_args(&args.input_dirs).map_err(|e| anyhow::anyhow!("{e}"))?;
    let mut cache_dirs = args.cache_dirs;
    cache_dirs.push(ctx.config.cache_dir.clone());
    let inputs = resolve_inputs(&spec.inputs.requirements(), &supplied, &cache_dirs)
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    let params = WorkflowParams {
        image: args.image,
        inputs,
        output_dir: args.output_dir,
        scratch_dir: args.scratch_dir,
    };
    let runconfig_dir = args
        .runconfig_dir
        .unwrap_or_else(|| ctx.config.runconfig_dir.clone());

    let backend = ctx.backend()?;
    eprintln!(
        "Running workflow test: {} {} on image: {}",
        spec.workflow_name, spec.test_name, params.image
    );
    let mut engine = WorkflowEngine::new(backend.as_ref(), runconfig_dir).with_sinks(ctx.sinks()?);
    let report = match engine.run(&spec, &params) {
        Ok(report) => report,
        Err(err) => {
            if let Some(report) = engine.last_report() {
                eprint!("{}", format_report(report));
            }
            anyhow::bail!("{err}");
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", format_report(&report));
    }
    Ok(())
}
