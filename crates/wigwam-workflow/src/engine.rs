//! Workflow test execution.
//!
//! The engine validates a whole test tree before touching the backend,
//! prepares the standard mounts and runs each step in the workflow image.
//! Multi tests walk their series depth-first in listed order. A temporary
//! scratch directory lives exactly as long as one [`WorkflowEngine::run`]
//! call.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use wigwam_common::constants::{
    CONTAINER_INPUT_DIR, CONTAINER_OUTPUT_DIR, CONTAINER_RUNCONFIG_DIR, CONTAINER_SCRATCH_DIR,
};
use wigwam_common::error::{Result, WigwamError};
use wigwam_common::types::{ImageRef, WorkflowState};
use wigwam_core::mount::BindMount;
use wigwam_core::scratch::{ScratchDir, ensure_dir};
use wigwam_image::backend::{ImageBackend, RunRequest};
use wigwam_image::sink::OutputSinks;

use crate::commands::WorkflowCommands;
use crate::testdb::{SeriesNode, TestKind, WorkflowTestSpec};

/// Per-invocation parameters of a workflow test.
#[derive(Debug, Clone, Default)]
pub struct WorkflowParams {
    /// Image the workflow runs in.
    pub image: String,
    /// Resolved input repositories mapped to host paths.
    pub inputs: BTreeMap<String, PathBuf>,
    /// Host output directory.
    pub output_dir: PathBuf,
    /// Persistent scratch directory. A temporary one is used if unset.
    pub scratch_dir: Option<PathBuf>,
}

/// Outcome of one container run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    /// Slash-separated label path of the step within the test.
    pub label: String,
    /// Workflow whose command was run.
    pub workflow: String,
    /// Shell command run in the container.
    pub command: String,
    /// Final state of the step.
    pub state: WorkflowState,
    /// When the container was started.
    pub started_at: DateTime<Utc>,
    /// When the container exited.
    pub finished_at: Option<DateTime<Utc>>,
}

/// Summary of a workflow test run, completed or failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowReport {
    /// Workflow name.
    pub workflow: String,
    /// Test name.
    pub test: String,
    /// ID of the image the test ran in.
    pub image: ImageRef,
    /// Final state of the test.
    pub state: WorkflowState,
    /// Steps in execution order.
    pub steps: Vec<StepRecord>,
    /// Start of the run.
    pub started_at: DateTime<Utc>,
    /// End of the run.
    pub finished_at: Option<DateTime<Utc>>,
}

fn advance(state: &mut WorkflowState, next: WorkflowState) -> Result<()> {
    if !state.can_transition_to(next) {
        return Err(WigwamError::Config {
            message: format!("illegal workflow state transition {state} -> {next}"),
        });
    }
    tracing::trace!(from = %state, to = %next, "workflow state");
    *state = next;
    Ok(())
}

/// Host directories shared by every step of one test run.
struct RunRoots<'p> {
    output: PathBuf,
    scratch: PathBuf,
    runconfig: PathBuf,
    inputs: &'p BTreeMap<String, PathBuf>,
}

impl RunRoots<'_> {
    fn mounts(&self) -> Vec<BindMount> {
        let mut mounts = vec![
            BindMount::read_write(&self.output, CONTAINER_OUTPUT_DIR),
            BindMount::read_only(&self.runconfig, CONTAINER_RUNCONFIG_DIR),
        ];
        mounts.extend(self.inputs.iter().map(|(repo, path)| {
            BindMount::read_only(path, Path::new(CONTAINER_INPUT_DIR).join(repo))
        }));
        mounts.push(BindMount::read_write(&self.scratch, CONTAINER_SCRATCH_DIR));
        mounts
    }
}

/// Runs workflow tests against an image backend.
pub struct WorkflowEngine<'a> {
    backend: &'a dyn ImageBackend,
    commands: WorkflowCommands,
    runconfig_dir: PathBuf,
    sinks: OutputSinks,
    last_report: Option<WorkflowReport>,
}

impl<'a> WorkflowEngine<'a> {
    /// Creates an engine with the standard commands and no output sinks.
    #[must_use]
    pub fn new(backend: &'a dyn ImageBackend, runconfig_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            commands: WorkflowCommands::standard(),
            runconfig_dir: runconfig_dir.into(),
            sinks: OutputSinks::new(),
            last_report: None,
        }
    }

    /// Replaces the command registry.
    #[must_use]
    pub fn with_commands(mut self, commands: WorkflowCommands) -> Self {
        self.commands = commands;
        self
    }

    /// Sets the writers that receive workflow output.
    #[must_use]
    pub fn with_sinks(mut self, sinks: OutputSinks) -> Self {
        self.sinks = sinks;
        self
    }

    /// Returns the command registry.
    #[must_use]
    pub const fn commands(&self) -> &WorkflowCommands {
        &self.commands
    }

    /// Returns the report of the latest run, including a failed one.
    #[must_use]
    pub const fn last_report(&self) -> Option<&WorkflowReport> {
        self.last_report.as_ref()
    }

    /// Checks a test without running anything.
    ///
    /// # Errors
    ///
    /// - `UnknownWorkflow` if a step's workflow has no command template.
    /// - `RunconfigNotFound` if a step's runconfig is missing.
    /// - `NotImplemented` if the series contains a parallel group.
    /// - `Config` if a single test has no runconfig.
    pub fn validate(&self, spec: &WorkflowTestSpec) -> Result<()> {
        match spec.kind {
            TestKind::Single => {
                let runconfig = spec.runconfig.as_deref().ok_or_else(|| WigwamError::Config {
                    message: format!(
                        "single test {}:{} has no runconfig",
                        spec.workflow_name, spec.test_name
                    ),
                })?;
                self.validate_step(&spec.workflow_name, runconfig)
            }
            TestKind::Multi => self.validate_series(&spec.series),
        }
    }

    fn validate_series(&self, nodes: &[SeriesNode]) -> Result<()> {
        for node in nodes {
            match node {
                SeriesNode::Test {
                    workflow, runconfig, ..
                } => self.validate_step(workflow, runconfig)?,
                SeriesNode::Series { children, .. } => self.validate_series(children)?,
                SeriesNode::Parallel => {
                    return Err(WigwamError::NotImplemented {
                        feature: "parallel series steps".into(),
                    });
                }
            }
        }
        Ok(())
    }

    fn validate_step(&self, workflow: &str, runconfig: &str) -> Result<()> {
        if !self.commands.contains(workflow) {
            return Err(WigwamError::UnknownWorkflow {
                name: workflow.to_string(),
            });
        }
        let path = self.runconfig_dir.join(runconfig);
        if !path.is_file() {
            return Err(WigwamError::RunconfigNotFound { path });
        }
        Ok(())
    }

    /// Runs a workflow test.
    ///
    /// The report of a run that got as far as starting, failed or not, is
    /// kept and available from [`last_report`](Self::last_report).
    ///
    /// # Errors
    ///
    /// Returns any validation error before the backend is touched,
    /// `ImageNotFound` if the image is missing, and
    /// `WorkflowTestFailed` for the first step that fails.
    pub fn run(&mut self, spec: &WorkflowTestSpec, params: &WorkflowParams) -> Result<WorkflowReport> {
        self.last_report = None;
        self.validate(spec)?;
        let image = self.backend.image_id(&params.image)?;

        let scratch = ScratchDir::acquire(params.scratch_dir.as_deref())?;
        let runconfig = ensure_dir(&self.runconfig_dir)?;

        tracing::info!(
            workflow = %spec.workflow_name,
            test = %spec.test_name,
            kind = %spec.kind,
            image = %params.image,
            scratch = %scratch.path().display(),
            "running workflow test"
        );

        let mut report = WorkflowReport {
            workflow: spec.workflow_name.clone(),
            test: spec.test_name.clone(),
            image,
            state: WorkflowState::Pending,
            steps: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        };

        let result = self.run_test(spec, params, &scratch, runconfig, &mut report);
        report.finished_at = Some(Utc::now());
        match result {
            Ok(()) => {
                advance(&mut report.state, WorkflowState::Completed)?;
                tracing::info!(
                    workflow = %spec.workflow_name,
                    test = %spec.test_name,
                    steps = report.steps.len(),
                    "workflow test completed"
                );
                self.last_report = Some(report.clone());
                Ok(report)
            }
            Err(err) => {
                advance(&mut report.state, WorkflowState::Failed)?;
                tracing::error!(
                    workflow = %spec.workflow_name,
                    test = %spec.test_name,
                    steps = report.steps.len(),
                    error = %err,
                    "workflow test failed"
                );
                self.last_report = Some(report);
                Err(err)
            }
        }
    }

    fn run_test(
        &mut self,
        spec: &WorkflowTestSpec,
        params: &WorkflowParams,
        scratch: &ScratchDir,
        runconfig: PathBuf,
        report: &mut WorkflowReport,
    ) -> Result<()> {
        match spec.kind {
            TestKind::Single => {
                let roots = RunRoots {
                    output: ensure_dir(&params.output_dir)?,
                    scratch: scratch.path().to_path_buf(),
                    runconfig,
                    inputs: &params.inputs,
                };
                advance(&mut report.state, WorkflowState::MountsPrepared)?;
                advance(&mut report.state, WorkflowState::Running)?;
                let runconfig_name = spec.runconfig.as_deref().unwrap_or_default();
                self.run_step(
                    spec,
                    &params.image,
                    &roots,
                    (spec.test_name.as_str(), spec.workflow_name.as_str(), runconfig_name),
                    &mut report.steps,
                )
            }
            TestKind::Multi => {
                advance(&mut report.state, WorkflowState::ExpandingSeries)?;
                let relative = Path::new(&spec.workflow_name).join(&spec.test_name);
                let roots = RunRoots {
                    output: ensure_dir(&params.output_dir.join(&relative))?,
                    scratch: scratch.subdir(&relative)?,
                    runconfig,
                    inputs: &params.inputs,
                };
                self.run_series(spec, &params.image, &roots, &spec.series, Path::new(""), &mut report.steps)
            }
        }
    }

    fn run_series(
        &mut self,
        spec: &WorkflowTestSpec,
        image: &str,
        roots: &RunRoots<'_>,
        nodes: &[SeriesNode],
        prefix: &Path,
        steps: &mut Vec<StepRecord>,
    ) -> Result<()> {
        for node in nodes {
            let relative = prefix.join(node.label());
            match node {
                SeriesNode::Test {
                    workflow, runconfig, ..
                } => {
                    let _ = ensure_dir(&roots.output.join(&relative))?;
                    let _ = ensure_dir(&roots.scratch.join(&relative))?;
                    let label = relative.to_string_lossy();
                    self.run_step(
                        spec,
                        image,
                        roots,
                        (label.as_ref(), workflow.as_str(), runconfig.as_str()),
                        steps,
                    )?;
                }
                SeriesNode::Series { children, .. } => {
                    tracing::debug!(series = %relative.display(), "entering nested series");
                    self.run_series(spec, image, roots, children, &relative, steps)?;
                }
                SeriesNode::Parallel => {
                    return Err(WigwamError::NotImplemented {
                        feature: "parallel series steps".into(),
                    });
                }
            }
        }
        Ok(())
    }

    fn run_step(
        &mut self,
        spec: &WorkflowTestSpec,
        image: &str,
        roots: &RunRoots<'_>,
        (label, workflow, runconfig): (&str, &str, &str),
        steps: &mut Vec<StepRecord>,
    ) -> Result<()> {
        let mut state = WorkflowState::Pending;
        let container_runconfig = Path::new(CONTAINER_RUNCONFIG_DIR).join(runconfig);
        let command = self
            .commands
            .command_for(workflow, &container_runconfig.to_string_lossy())?;
        let request = RunRequest::new(image, command.clone())
            .with_mounts(roots.mounts())
            .with_host_user(true);
        advance(&mut state, WorkflowState::MountsPrepared)?;

        let _ = writeln!(self.sinks, "==> {workflow} {label}");
        tracing::info!(step = %label, workflow = %workflow, command = %command, "starting step");
        advance(&mut state, WorkflowState::Running)?;
        let started_at = Utc::now();
        let outcome = self.backend.run_checked(&request);
        let finished_at = Some(Utc::now());

        let failure = match outcome {
            Ok(output) => {
                let _ = self.sinks.write_all(output.stdout.as_bytes());
                let _ = self.sinks.flush();
                None
            }
            Err(WigwamError::RunFailed { diagnostic, .. }) => Some(diagnostic),
            Err(WigwamError::CommandNotFound { command }) => {
                Some(format!("command not found: {command}"))
            }
            Err(err) => return Err(err),
        };

        advance(
            &mut state,
            if failure.is_some() {
                WorkflowState::Failed
            } else {
                WorkflowState::Completed
            },
        )?;
        steps.push(StepRecord {
            label: label.to_string(),
            workflow: workflow.to_string(),
            command,
            state,
            started_at,
            finished_at,
        });

        match failure {
            None => Ok(()),
            Some(diagnostic) => {
                let _ = self.sinks.write_all(diagnostic.as_bytes());
                Err(WigwamError::WorkflowTestFailed {
                    workflow: spec.workflow_name.clone(),
                    test: spec.test_name.clone(),
                    diagnostic: format!("step {label}: {diagnostic}"),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions_advance() {
        let mut state = WorkflowState::Pending;
        advance(&mut state, WorkflowState::MountsPrepared).unwrap();
        advance(&mut state, WorkflowState::Running).unwrap();
        advance(&mut state, WorkflowState::Completed).unwrap();
        assert!(state.is_terminal());
    }

    #[test]
    fn illegal_transition_rejected() {
        let mut state = WorkflowState::Pending;
        assert!(advance(&mut state, WorkflowState::Running).is_err());
        assert_eq!(state, WorkflowState::Pending);
    }

    #[test]
    fn mounts_follow_container_layout() {
        let inputs = BTreeMap::from([("L0B_A".to_string(), PathBuf::from("/data/a"))]);
        let roots = RunRoots {
            output: PathBuf::from("/out"),
            scratch: PathBuf::from("/scratch"),
            runconfig: PathBuf::from("/rc"),
            inputs: &inputs,
        };
        let rendered: Vec<String> = roots.mounts().iter().map(BindMount::mount_string).collect();
        assert_eq!(
            rendered,
            vec![
                "/out:/tmp/output:rw",
                "/rc:/tmp/runconfig:ro",
                "/data/a:/tmp/input/L0B_A:ro",
                "/scratch:/tmp/scratch:rw",
            ]
        );
    }
}
