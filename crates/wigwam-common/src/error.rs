//! Unified error types for the wigwam workspace.
//!
//! Validation variants are raised before any container backend is touched.
//! Backend variants carry the diagnostic text reported by the backend.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum WigwamError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path (or program name) where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value or data file is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// Mutually exclusive or otherwise invalid arguments were combined.
    #[error("usage error: {message}")]
    Usage {
        /// Description of the misuse.
        message: String,
    },

    /// A GitHub repository name did not have the `user/repo` shape.
    #[error("malformed GitHub repo name: {repo}")]
    MalformedRepoIdentifier {
        /// The rejected repository name.
        repo: String,
    },

    /// A `[LABEL]:[PATH]` input argument could not be parsed.
    #[error("malformed input argument: {value:?}")]
    MalformedInputArgument {
        /// The rejected argument.
        value: String,
    },

    /// The backend has no image with the given name or ID.
    #[error("image not found: {image}")]
    ImageNotFound {
        /// Name or ID that was looked up.
        image: String,
    },

    /// An image build failed.
    #[error("build of image {tag} failed:\n{diagnostic}")]
    BuildFailed {
        /// Tag of the image being built.
        tag: String,
        /// Output reported by the backend.
        diagnostic: String,
    },

    /// A command run inside a container failed.
    #[error("command failed in {image} (exit code {exit_code:?}):\n{diagnostic}")]
    RunFailed {
        /// Image the command ran in.
        image: String,
        /// Exit code, when the process exited normally.
        exit_code: Option<i32>,
        /// Standard error reported by the backend.
        diagnostic: String,
    },

    /// The command run inside a container could not be found.
    #[error("command not found in container: {command}")]
    CommandNotFound {
        /// The command that was attempted.
        command: String,
    },

    /// A workflow test run failed.
    #[error("workflow test {workflow}:{test} failed:\n{diagnostic}")]
    WorkflowTestFailed {
        /// Workflow name.
        workflow: String,
        /// Test name.
        test: String,
        /// Diagnostic output from the failed run.
        diagnostic: String,
    },

    /// A runconfig file is missing from the runconfig directory.
    #[error("runconfig not found: {path}")]
    RunconfigNotFound {
        /// Expected host path of the runconfig.
        path: PathBuf,
    },

    /// Supplied inputs cannot be matched to repositories unambiguously.
    #[error("ambiguous input mapping: {message}")]
    AmbiguousInputMapping {
        /// Description of the ambiguity.
        message: String,
    },

    /// A supplied input label is not known to the test.
    #[error("input label not recognized: {label}")]
    UnknownInputLabel {
        /// The rejected label.
        label: String,
    },

    /// Required input repositories could not be located.
    #[error("required input repositories not found: {}", repos.join(", "))]
    RequiredRepositoryNotFound {
        /// Repositories that remain unresolved.
        repos: Vec<String>,
    },

    /// A test database entry has an unknown `type`.
    #[error("unrecognized test type: {test_type}")]
    UnrecognizedTestType {
        /// The rejected test type.
        test_type: String,
    },

    /// A mount permission was not `ro` or `rw`.
    #[error("invalid mount permission {value:?}: expected \"ro\" or \"rw\"")]
    InvalidPermission {
        /// The rejected permission string.
        value: String,
    },

    /// No command template is registered for a workflow name.
    #[error("unknown workflow: {name}")]
    UnknownWorkflow {
        /// The workflow name.
        name: String,
    },

    /// The test database has no such workflow test.
    #[error("test not found: {workflow}:{test}")]
    TestNotFound {
        /// Workflow name.
        workflow: String,
        /// Test name.
        test: String,
    },

    /// The requested feature is recognized but not supported.
    #[error("not implemented: {feature}")]
    NotImplemented {
        /// Name of the unsupported feature.
        feature: String,
    },

    /// Fetching a data repository failed.
    #[error("fetch of {repo} failed:\n{diagnostic}")]
    FetchFailed {
        /// Repository being fetched.
        repo: String,
        /// Diagnostic output from the fetch tool.
        diagnostic: String,
    },
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, WigwamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_repositories_are_listed() {
        let err = WigwamError::RequiredRepositoryNotFound {
            repos: vec!["L0B".into(), "DEM".into()],
        };
        assert_eq!(
            err.to_string(),
            "required input repositories not found: L0B, DEM"
        );
    }

    #[test]
    fn invalid_permission_quotes_value() {
        let err = WigwamError::InvalidPermission {
            value: "bogus".into(),
        };
        assert!(err.to_string().contains("\"bogus\""));
    }
}
