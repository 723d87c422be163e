//! Container backend abstraction.
//!
//! The build pipeline, the workflow engine and the fetch orchestrator only
//! talk to containers through [`ImageBackend`]. [`docker::DockerBackend`]
//! drives the `docker` CLI; tests substitute recording fakes.

pub mod docker;

use std::io::Write;
use std::path::PathBuf;

use wigwam_common::error::{Result, WigwamError};
use wigwam_common::types::{ImageRef, ImageTag};
use wigwam_core::mount::BindMount;

/// Exit code shells report for a missing command.
pub const EXIT_COMMAND_NOT_FOUND: i32 = 127;

/// A request to build one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Tag the image is built under.
    pub tag: ImageTag,
    /// Full Dockerfile text, fed to the backend on stdin.
    pub dockerfile: String,
    /// Build context directory. `None` builds without a context.
    pub context: Option<PathBuf>,
    /// Disable the backend's layer cache.
    pub no_cache: bool,
}

impl BuildRequest {
    /// Creates a context-less, cached build request.
    #[must_use]
    pub fn new(tag: ImageTag, dockerfile: impl Into<String>) -> Self {
        Self {
            tag,
            dockerfile: dockerfile.into(),
            context: None,
            no_cache: false,
        }
    }

    /// Sets the build context directory.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<PathBuf>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Sets whether the layer cache is disabled.
    #[must_use]
    pub const fn with_no_cache(mut self, no_cache: bool) -> Self {
        self.no_cache = no_cache;
        self
    }
}

/// A request to run a shell command in a disposable container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// Image name, tag or ID.
    pub image: String,
    /// Command passed to `bash -c`.
    pub command: String,
    /// Bind mounts to attach.
    pub mounts: Vec<BindMount>,
    /// Run with the invoking user's UID and GID.
    pub as_host_user: bool,
}

impl RunRequest {
    /// Creates a request without mounts, running as the image's user.
    #[must_use]
    pub fn new(image: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            command: command.into(),
            mounts: Vec::new(),
            as_host_user: false,
        }
    }

    /// Attaches bind mounts.
    #[must_use]
    pub fn with_mounts(mut self, mounts: Vec<BindMount>) -> Self {
        self.mounts = mounts;
        self
    }

    /// Sets whether the container runs as the host user.
    #[must_use]
    pub const fn with_host_user(mut self, host_user: bool) -> Self {
        self.as_host_user = host_user;
        self
    }
}

/// Captured result of a finished container command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    /// Standard output of the command.
    pub stdout: String,
    /// Standard error of the command.
    pub stderr: String,
    /// Exit code, `None` if the process was killed by a signal.
    pub exit_code: Option<i32>,
}

impl RunOutput {
    /// Returns whether the command exited with status zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }
}

/// Container backend used to build, inspect, run and remove images.
pub trait ImageBackend: Send + Sync {
    /// Builds an image, streaming build output to `log`.
    ///
    /// # Errors
    ///
    /// Returns `WigwamError::BuildFailed` if the build does not succeed.
    fn build(&self, request: &BuildRequest, log: &mut dyn Write) -> Result<ImageRef>;

    /// Runs a command and captures its output, whatever its exit code.
    ///
    /// # Errors
    ///
    /// Returns an error only if the container could not be started.
    fn run(&self, request: &RunRequest) -> Result<RunOutput>;

    /// Returns a formatted field (e.g. `Id`) of an image.
    ///
    /// # Errors
    ///
    /// Returns `WigwamError::ImageNotFound` if no such image exists.
    fn inspect(&self, image: &str, field: &str) -> Result<String>;

    /// Removes all images whose reference matches `pattern`, returning
    /// the removed image IDs.
    ///
    /// # Errors
    ///
    /// Returns an error if listing or removal fails.
    fn remove(&self, pattern: &str, force: bool) -> Result<Vec<String>>;

    /// Opens an interactive shell in a disposable container.
    ///
    /// # Errors
    ///
    /// Returns an error if the shell cannot be started.
    fn drop_in(&self, image: &str, mounts: &[BindMount]) -> Result<()>;

    /// Pulls `source` from its registry and tags it locally as `tag`.
    ///
    /// The registry reference is untagged afterwards so only `tag` remains.
    ///
    /// # Errors
    ///
    /// Returns `WigwamError::ImageNotFound` if the pull fails, or an error
    /// if tagging fails.
    fn pull(&self, source: &str, tag: &str) -> Result<ImageRef>;

    /// Returns whether the backend is usable on this host.
    fn is_available(&self) -> bool;

    /// Runs a command and turns non-zero exits into errors.
    ///
    /// # Errors
    ///
    /// Returns `WigwamError::CommandNotFound` on exit code 127 and
    /// `WigwamError::RunFailed` on any other failure.
    fn run_checked(&self, request: &RunRequest) -> Result<RunOutput> {
        let output = self.run(request)?;
        match output.exit_code {
            Some(0) => Ok(output),
            Some(EXIT_COMMAND_NOT_FOUND) => Err(WigwamError::CommandNotFound {
                command: request.command.clone(),
            }),
            exit_code => Err(WigwamError::RunFailed {
                image: request.image.clone(),
                exit_code,
                diagnostic: output.stderr,
            }),
        }
    }

    /// Returns the backend ID of an image.
    ///
    /// # Errors
    ///
    /// Returns `WigwamError::ImageNotFound` if no such image exists.
    fn image_id(&self, image: &str) -> Result<ImageRef> {
        self.inspect(image, "Id").map(ImageRef::new)
    }

    /// Evaluates `test <expression>` inside an image.
    ///
    /// # Errors
    ///
    /// Returns `WigwamError::RunFailed` if the test neither succeeds nor
    /// fails cleanly (exit code other than 0 or 1).
    fn test_image(&self, image: &str, expression: &str) -> Result<bool> {
        let request = RunRequest::new(image, format!("test {expression}"));
        let output = self.run(&request)?;
        match output.exit_code {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            exit_code => Err(WigwamError::RunFailed {
                image: image.to_string(),
                exit_code,
                diagnostic: output.stderr,
            }),
        }
    }

    /// Returns whether `command` is on the `PATH` of an image.
    ///
    /// # Errors
    ///
    /// Returns `WigwamError::RunFailed` if the lookup exits with a code
    /// other than 0 or 1.
    fn has_command(&self, image: &str, command: &str) -> Result<bool> {
        let request = RunRequest::new(image, format!("command -v {command}"));
        let output = self.run(&request)?;
        match output.exit_code {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            exit_code => Err(WigwamError::RunFailed {
                image: image.to_string(),
                exit_code,
                diagnostic: output.stderr,
            }),
        }
    }
}

/// Creates the default backend for this host.
#[must_use]
pub fn detect_backend() -> Box<dyn ImageBackend> {
    Box::new(docker::DockerBackend::new())
}
