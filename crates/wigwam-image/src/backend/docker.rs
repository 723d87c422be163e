//! Docker CLI backend.
//!
//! Every operation shells out to `docker`. Builds read their Dockerfile from
//! stdin (`-f-`) and stream progress to the caller's writer.

use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc;

use wigwam_common::error::{Result, WigwamError};
use wigwam_common::types::ImageRef;
use wigwam_core::mount::BindMount;

use super::{BuildRequest, ImageBackend, RunOutput, RunRequest};

/// Backend driving the `docker` command line client.
#[derive(Debug, Clone)]
pub struct DockerBackend {
    program: PathBuf,
}

impl DockerBackend {
    /// Creates a backend that runs `docker` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_program("docker")
    }

    /// Creates a backend that runs the given client binary.
    #[must_use]
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self) -> Command {
        Command::new(&self.program)
    }

    fn spawn_error(&self, source: std::io::Error) -> WigwamError {
        WigwamError::Io {
            path: self.program.clone(),
            source,
        }
    }

    fn run_args(request: &RunRequest) -> Vec<String> {
        let mut args = vec!["run".to_string(), "--network=host".into(), "--rm".into()];
        if request.as_host_user {
            if let Some(user) = host_user() {
                args.push(format!("--user={user}"));
            }
        }
        for mount in &request.mounts {
            args.push(format!("--volume={mount}"));
        }
        args.extend([
            request.image.clone(),
            "bash".into(),
            "-c".into(),
            request.command.clone(),
        ]);
        args
    }
}

impl Default for DockerBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageBackend for DockerBackend {
    fn build(&self, request: &BuildRequest, log: &mut dyn Write) -> Result<ImageRef> {
        tracing::info!(tag = %request.tag, no_cache = request.no_cache, "building image");

        let context = request
            .context
            .as_ref()
            .map_or_else(|| "-".to_string(), |path| path.display().to_string());
        let mut cmd = self.command();
        let _ = cmd
            .args(["build", "--network=host"])
            .arg(&context)
            .args(["-t", request.tag.as_str()]);
        if request.no_cache {
            let _ = cmd.arg("--no-cache");
        }
        if request.context.is_some() {
            let _ = cmd.arg("-f-");
        }
        let _ = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| self.spawn_error(e))?;
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(request.dockerfile.as_bytes()) {
                drop(stdin);
                let _ = child.kill();
                let _ = child.wait();
                return Err(self.spawn_error(e));
            }
        }

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let mut diagnostic = String::new();
        let (tx, rx) = mpsc::channel::<(bool, String)>();

        std::thread::scope(|scope| {
            if let Some(stdout) = stdout {
                let tx = tx.clone();
                let _ = scope.spawn(move || forward_lines(stdout, false, &tx));
            }
            if let Some(stderr) = stderr {
                let tx = tx.clone();
                let _ = scope.spawn(move || forward_lines(stderr, true, &tx));
            }
            drop(tx);
            for (is_stderr, line) in rx {
                let _ = writeln!(log, "{line}");
                if is_stderr {
                    diagnostic.push_str(&line);
                    diagnostic.push('\n');
                }
            }
        });

        let status = child.wait().map_err(|e| self.spawn_error(e))?;
        if !status.success() {
            tracing::error!(tag = %request.tag, code = ?status.code(), "image build failed");
            return Err(WigwamError::BuildFailed {
                tag: request.tag.to_string(),
                diagnostic,
            });
        }

        self.image_id(request.tag.as_str())
    }

    fn run(&self, request: &RunRequest) -> Result<RunOutput> {
        tracing::debug!(image = %request.image, command = %request.command, "running container");

        let output = self
            .command()
            .args(Self::run_args(request))
            .output()
            .map_err(|e| self.spawn_error(e))?;

        Ok(RunOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
        })
    }

    fn inspect(&self, image: &str, field: &str) -> Result<String> {
        let output = self
            .command()
            .arg("inspect")
            .arg(format!("-f={{{{.{field}}}}}"))
            .arg(image)
            .output()
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(WigwamError::ImageNotFound {
                image: image.to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn remove(&self, pattern: &str, force: bool) -> Result<Vec<String>> {
        let listing = self
            .command()
            .args(["images", &format!("--filter=reference={pattern}"), "-q"])
            .output()
            .map_err(|e| self.spawn_error(e))?;
        if !listing.status.success() {
            return Err(WigwamError::Config {
                message: format!(
                    "cannot list images matching {pattern}: {}",
                    String::from_utf8_lossy(&listing.stderr).trim()
                ),
            });
        }

        let mut ids: Vec<String> = String::from_utf8_lossy(&listing.stdout)
            .lines()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(String::from)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            tracing::info!(pattern, "no images to remove");
            return Ok(ids);
        }

        let mut cmd = self.command();
        let _ = cmd.arg("rmi");
        if force {
            let _ = cmd.arg("--force");
        }
        let removal = cmd.args(&ids).output().map_err(|e| self.spawn_error(e))?;
        if !removal.status.success() {
            return Err(WigwamError::Config {
                message: format!(
                    "cannot remove images matching {pattern}: {}",
                    String::from_utf8_lossy(&removal.stderr).trim()
                ),
            });
        }
        tracing::info!(pattern, count = ids.len(), "removed images");
        Ok(ids)
    }

    fn drop_in(&self, image: &str, mounts: &[BindMount]) -> Result<()> {
        let mut cmd = self.command();
        let _ = cmd.args(["run", "-it", "--network=host", "--rm"]);
        for mount in mounts {
            let _ = cmd.arg(format!("--volume={mount}"));
        }
        let status = cmd
            .args([image, "bash"])
            .status()
            .map_err(|e| self.spawn_error(e))?;
        if status.success() {
            Ok(())
        } else {
            Err(WigwamError::RunFailed {
                image: image.to_string(),
                exit_code: status.code(),
                diagnostic: String::new(),
            })
        }
    }

    fn pull(&self, source: &str, tag: &str) -> Result<ImageRef> {
        tracing::info!(source, tag, "pulling image");
        let pulled = self
            .command()
            .args(["pull", source])
            .output()
            .map_err(|e| self.spawn_error(e))?;
        if !pulled.status.success() {
            tracing::error!(
                source,
                stderr = %String::from_utf8_lossy(&pulled.stderr).trim(),
                "pull failed"
            );
            return Err(WigwamError::ImageNotFound {
                image: source.to_string(),
            });
        }

        let tagged = self
            .command()
            .args(["tag", source, tag])
            .output()
            .map_err(|e| self.spawn_error(e))?;
        if !tagged.status.success() {
            return Err(WigwamError::Config {
                message: format!(
                    "cannot tag {source} as {tag}: {}",
                    String::from_utf8_lossy(&tagged.stderr).trim()
                ),
            });
        }

        // Only the local tag should remain.
        let untagged = self
            .command()
            .args(["rmi", source])
            .output()
            .map_err(|e| self.spawn_error(e))?;
        if !untagged.status.success() {
            tracing::warn!(source, "could not untag registry reference");
        }
        self.image_id(tag)
    }

    fn is_available(&self) -> bool {
        which::which(&self.program).is_ok()
    }
}

fn forward_lines(stream: impl Read, is_stderr: bool, tx: &mpsc::Sender<(bool, String)>) {
    for line in BufReader::new(stream).lines() {
        let Ok(line) = line else { break };
        if tx.send((is_stderr, line)).is_err() {
            break;
        }
    }
}

#[cfg(unix)]
fn host_user() -> Option<String> {
    Some(format!(
        "{}:{}",
        nix::unistd::getuid(),
        nix::unistd::getgid()
    ))
}

#[cfg(not(unix))]
fn host_user() -> Option<String> {
    None
}
