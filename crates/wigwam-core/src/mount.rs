//! Bind mount descriptors.
//!
//! A [`BindMount`] exposes a host path inside a container. It is rendered
//! in the backend wire format `host:container:perm`.

use std::fmt;
use std::path::{Path, PathBuf};

use wigwam_common::error::Result;
use wigwam_common::types::Permission;

/// A host path exposed inside a container with a read/write policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindMount {
    host_path: PathBuf,
    container_path: PathBuf,
    permission: Permission,
}

impl BindMount {
    /// Creates a bind mount from an already parsed permission.
    #[must_use]
    pub fn new(
        host_path: impl Into<PathBuf>,
        container_path: impl Into<PathBuf>,
        permission: Permission,
    ) -> Self {
        Self {
            host_path: host_path.into(),
            container_path: container_path.into(),
            permission,
        }
    }

    /// Creates a bind mount, parsing `permission` as `ro` or `rw`.
    ///
    /// # Errors
    ///
    /// Returns `WigwamError::InvalidPermission` for any other permission.
    pub fn build(
        host_path: impl Into<PathBuf>,
        container_path: impl Into<PathBuf>,
        permission: &str,
    ) -> Result<Self> {
        let permission = permission.parse::<Permission>()?;
        Ok(Self::new(host_path, container_path, permission))
    }

    /// Read-only mount shorthand.
    #[must_use]
    pub fn read_only(host_path: impl Into<PathBuf>, container_path: impl Into<PathBuf>) -> Self {
        Self::new(host_path, container_path, Permission::ReadOnly)
    }

    /// Read-write mount shorthand.
    #[must_use]
    pub fn read_write(host_path: impl Into<PathBuf>, container_path: impl Into<PathBuf>) -> Self {
        Self::new(host_path, container_path, Permission::ReadWrite)
    }

    /// Returns the host side of the mount.
    #[must_use]
    pub fn host_path(&self) -> &Path {
        &self.host_path
    }

    /// Returns the container side of the mount.
    #[must_use]
    pub fn container_path(&self) -> &Path {
        &self.container_path
    }

    /// Returns the access policy.
    #[must_use]
    pub const fn permission(&self) -> Permission {
        self.permission
    }

    /// Renders the mount as `host:container:perm`.
    #[must_use]
    pub fn mount_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for BindMount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.host_path.display(),
            self.container_path.display(),
            self.permission
        )
    }
}

#[cfg(test)]
mod tests {
    use wigwam_common::error::WigwamError;

    use super::*;

    #[test]
    fn read_only_mount_string() {
        let mount = BindMount::build("/host/data", "/tmp/input/L0B", "ro").unwrap();
        assert_eq!(mount.mount_string(), "/host/data:/tmp/input/L0B:ro");
        assert_eq!(mount.permission(), Permission::ReadOnly);
    }

    #[test]
    fn read_write_mount_string() {
        let mount = BindMount::build("/host/out", "/tmp/output", "rw").unwrap();
        assert_eq!(mount.mount_string(), "/host/out:/tmp/output:rw");
    }

    #[test]
    fn bogus_permission_rejected() {
        let err = BindMount::build("/a", "/b", "bogus").unwrap_err();
        assert!(matches!(err, WigwamError::InvalidPermission { value } if value == "bogus"));
    }

    #[test]
    fn shorthands_match_build() {
        assert_eq!(
            BindMount::read_only("/a", "/b"),
            BindMount::build("/a", "/b", "ro").unwrap()
        );
        assert_eq!(
            BindMount::read_write("/a", "/b"),
            BindMount::build("/a", "/b", "rw").unwrap()
        );
    }

    #[test]
    fn accessors_return_paths() {
        let mount = BindMount::read_only("/a", "/b");
        assert_eq!(mount.host_path(), Path::new("/a"));
        assert_eq!(mount.container_path(), Path::new("/b"));
    }
}
