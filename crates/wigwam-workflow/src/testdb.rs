//! Workflow test database.
//!
//! `workflowtests.json` maps workflow names to a test type and a set of named
//! tests. Multi tests carry a series whose entries are sub-tests, nested
//! series, or `parallel` groups. Parsing turns the series into an owned
//! [`SeriesNode`] tree.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use wigwam_common::error::{Result, WigwamError};
use wigwam_core::inputs::InputRequirements;

/// Workflow name that marks a parallel group in a series.
pub const PARALLEL_WORKFLOW: &str = "parallel";

/// How a test is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestKind {
    /// One container run.
    Single,
    /// A series of sub-tests run in order.
    Multi,
}

impl FromStr for TestKind {
    type Err = WigwamError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "single" => Ok(Self::Single),
            "multi" => Ok(Self::Multi),
            other => Err(WigwamError::UnrecognizedTestType {
                test_type: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Multi => write!(f, "multi"),
        }
    }
}

/// Input repositories a test needs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TestInputs {
    /// A single repository.
    One(String),
    /// Several unlabeled repositories.
    Many(Vec<String>),
    /// Repositories keyed by label.
    Labeled(BTreeMap<String, String>),
}

impl Default for TestInputs {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl TestInputs {
    /// Returns the repository names.
    #[must_use]
    pub fn repos(&self) -> Vec<String> {
        match self {
            Self::One(repo) => vec![repo.clone()],
            Self::Many(repos) => repos.clone(),
            Self::Labeled(labels) => labels.values().cloned().collect(),
        }
    }

    /// Returns the resolution table for these inputs.
    #[must_use]
    pub fn requirements(&self) -> InputRequirements {
        match self {
            Self::One(repo) => InputRequirements::from_repos([repo.as_str()]),
            Self::Many(repos) => InputRequirements::from_repos(repos.iter().map(String::as_str)),
            Self::Labeled(labels) => InputRequirements::from_labeled(
                labels.iter().map(|(label, repo)| (label.as_str(), repo.as_str())),
            ),
        }
    }
}

/// A node of a multi test's series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeriesNode {
    /// One container run.
    Test {
        /// Workflow whose command template is used.
        workflow: String,
        /// Runconfig file name in the runconfig directory.
        runconfig: String,
        /// Optional label of the step.
        tag: Option<String>,
    },
    /// A nested series run in order.
    Series {
        /// Label of the nested series.
        label: String,
        /// Steps of the nested series.
        children: Vec<SeriesNode>,
    },
    /// A parallel group. Recognized but not supported.
    Parallel,
}

impl SeriesNode {
    /// Returns the label used for the node's output subdirectory.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Test { workflow, tag, .. } => tag.as_deref().unwrap_or(workflow),
            Self::Series { label, .. } => label,
            Self::Parallel => PARALLEL_WORKFLOW,
        }
    }
}

/// A fully parsed workflow test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowTestSpec {
    /// Workflow the test belongs to.
    pub workflow_name: String,
    /// Test name within the workflow.
    pub test_name: String,
    /// Single or multi.
    pub kind: TestKind,
    /// Runconfig of a single test.
    pub runconfig: Option<String>,
    /// Required input repositories.
    pub inputs: TestInputs,
    /// Steps of a multi test, in order.
    pub series: Vec<SeriesNode>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawWorkflow {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    tests: BTreeMap<String, RawTest>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawTest {
    runconfig: Option<String>,
    #[serde(default)]
    inputs: TestInputs,
    series: Option<Vec<RawSeriesEntry>>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawSeriesEntry {
    workflow: Option<String>,
    runconfig: Option<String>,
    tag: Option<String>,
    series: Option<Vec<RawSeriesEntry>>,
}

impl RawSeriesEntry {
    fn into_node(self) -> Result<SeriesNode> {
        if self.workflow.as_deref() == Some(PARALLEL_WORKFLOW) {
            return Ok(SeriesNode::Parallel);
        }
        if let Some(children) = self.series {
            let label = self
                .tag
                .or(self.workflow)
                .ok_or_else(|| WigwamError::Config {
                    message: "nested series needs a \"tag\" or \"workflow\" label".into(),
                })?;
            check_directory_name(&label)?;
            return Ok(SeriesNode::Series {
                label,
                children: convert_series(children)?,
            });
        }
        match (self.workflow, self.runconfig) {
            (Some(workflow), Some(runconfig)) => {
                check_directory_name(self.tag.as_deref().unwrap_or(&workflow))?;
                Ok(SeriesNode::Test {
                    workflow,
                    runconfig,
                    tag: self.tag,
                })
            }
            _ => Err(WigwamError::Config {
                message: "series entries need \"workflow\" and \"runconfig\"".into(),
            }),
        }
    }
}

/// Rejects names that would not stay one directory level below the
/// output and scratch roots they are joined to.
fn check_directory_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(WigwamError::Config {
            message: format!("{name:?} cannot be used as an output directory name"),
        });
    }
    Ok(())
}

fn convert_series(entries: Vec<RawSeriesEntry>) -> Result<Vec<SeriesNode>> {
    entries.into_iter().map(RawSeriesEntry::into_node).collect()
}

/// Splits a `WORKFLOW:TEST` identifier.
///
/// # Errors
///
/// Returns `WigwamError::Usage` unless the identifier has exactly two
/// non-empty parts.
pub fn parse_test_id(id: &str) -> Result<(String, String)> {
    match id.split(':').collect::<Vec<_>>().as_slice() {
        [workflow, test] if !workflow.is_empty() && !test.is_empty() => {
            Ok(((*workflow).to_string(), (*test).to_string()))
        }
        _ => Err(WigwamError::Usage {
            message: format!("test {id:?} is not in WORKFLOW:TEST format"),
        }),
    }
}

/// The parsed test database.
#[derive(Debug, Clone)]
pub struct TestDatabase {
    workflows: BTreeMap<String, RawWorkflow>,
}

impl TestDatabase {
    /// Parses a database from JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid test database.
    pub fn from_json(json: &str) -> Result<Self> {
        let workflows: BTreeMap<String, RawWorkflow> = serde_json::from_str(json)?;
        Ok(Self { workflows })
    }

    /// Loads a database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| WigwamError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&content)
    }

    /// Returns the workflow names in the database.
    pub fn workflow_names(&self) -> impl Iterator<Item = &str> {
        self.workflows.keys().map(String::as_str)
    }

    /// Returns the test names of a workflow.
    pub fn test_names<'s>(&'s self, workflow: &str) -> impl Iterator<Item = &'s str> {
        self.workflows
            .get(workflow)
            .into_iter()
            .flat_map(|wf| wf.tests.keys().map(String::as_str))
    }

    /// Looks up and validates a test.
    ///
    /// # Errors
    ///
    /// - `TestNotFound` if the workflow or test does not exist.
    /// - `UnrecognizedTestType` if the workflow's type is unknown.
    /// - `Config` if a single test lacks a runconfig, a multi test lacks a
    ///   series, a series entry is malformed, or a workflow, test or step
    ///   label is not a plain directory name.
    pub fn get(&self, workflow: &str, test: &str) -> Result<WorkflowTestSpec> {
        let not_found = || WigwamError::TestNotFound {
            workflow: workflow.to_string(),
            test: test.to_string(),
        };
        let raw_workflow = self.workflows.get(workflow).ok_or_else(not_found)?;
        let raw_test = raw_workflow.tests.get(test).ok_or_else(not_found)?.clone();
        check_directory_name(workflow)?;
        check_directory_name(test)?;
        let kind: TestKind = raw_workflow.kind.parse()?;

        let series = match (kind, raw_test.series) {
            (TestKind::Single, _) => {
                if raw_test.runconfig.is_none() {
                    return Err(WigwamError::Config {
                        message: format!("single test {workflow}:{test} has no runconfig"),
                    });
                }
                Vec::new()
            }
            (TestKind::Multi, Some(entries)) => convert_series(entries)?,
            (TestKind::Multi, None) => {
                return Err(WigwamError::Config {
                    message: format!("multi test {workflow}:{test} has no series"),
                });
            }
        };

        Ok(WorkflowTestSpec {
            workflow_name: workflow.to_string(),
            test_name: test.to_string(),
            kind,
            runconfig: raw_test.runconfig,
            inputs: raw_test.inputs,
            series,
        })
    }
}
