//! Scoped scratch directories.
//!
//! A [`ScratchDir`] is either supplied by the user and kept, or created
//! in the system temp location and removed recursively when the handle is
//! dropped. Dropping happens on every exit path, including `?` returns and
//! unwinding.

use std::path::{Path, PathBuf};

use wigwam_common::error::{Result, WigwamError};

/// Working directory of a single workflow invocation.
#[derive(Debug)]
pub enum ScratchDir {
    /// User-supplied directory. Never deleted.
    Persistent(PathBuf),
    /// System-generated directory. Deleted on drop.
    Temporary(tempfile::TempDir),
}

impl ScratchDir {
    /// Acquires a scratch directory.
    ///
    /// With `Some(path)` the directory is created if absent and kept after
    /// the handle is dropped. With `None` a fresh temporary directory is
    /// created and removed on drop.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn acquire(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let path = ensure_dir(path)?;
                tracing::debug!(path = %path.display(), "using persistent scratch directory");
                Ok(Self::Persistent(path))
            }
            None => {
                let dir = tempfile::Builder::new()
                    .prefix("wigwam-scratch-")
                    .tempdir()
                    .map_err(|e| WigwamError::Io {
                        path: std::env::temp_dir(),
                        source: e,
                    })?;
                tracing::debug!(path = %dir.path().display(), "created temporary scratch directory");
                Ok(Self::Temporary(dir))
            }
        }
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Persistent(path) => path,
            Self::Temporary(dir) => dir.path(),
        }
    }

    /// Returns whether the directory is removed on drop.
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }

    /// Ensures `relative` exists below the scratch directory and returns it.
    ///
    /// # Errors
    ///
    /// Returns an error if the subdirectory cannot be created, or if
    /// `relative` is absolute.
    pub fn subdir(&self, relative: impl AsRef<Path>) -> Result<PathBuf> {
        let relative = relative.as_ref();
        if relative.is_absolute() {
            return Err(WigwamError::Config {
                message: format!(
                    "scratch subdirectory must be relative: {}",
                    relative.display()
                ),
            });
        }
        ensure_dir(&self.path().join(relative))
    }
}

/// Creates `path` (and parents) if absent and returns its canonical form.
///
/// Used for durable output and runconfig mounts, which are never removed.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or resolved.
pub fn ensure_dir(path: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(path).map_err(|e| WigwamError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    path.canonicalize().map_err(|e| WigwamError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}
