//! Environment setup images.
//!
//! The setup stack prepares a plain distribution image for building:
//! user accounts and a URL reader, the CUDA runtime, a micromamba runtime
//! environment, the CUDA compiler and the development environment. Which
//! package manager and URL reader the Dockerfiles use is detected from the
//! base image.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use wigwam_common::error::{Result, WigwamError};

use crate::backend::ImageBackend;

static CUDA_VERSION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(?P<major>[0-9]+)\.(?P<minor>[0-9]+)$").ok());

/// Oldest CUDA major version the runtime image supports.
pub const MIN_CUDA_MAJOR: u32 = 11;

/// Linux package manager found on a base image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    /// RPM-based distributions.
    Yum,
    /// Debian-based distributions.
    AptGet,
}

impl PackageManager {
    /// Supported package managers, in detection order.
    pub const ALL: [Self; 2] = [Self::Yum, Self::AptGet];

    /// Returns the command name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Yum => "yum",
            Self::AptGet => "apt-get",
        }
    }

    /// Returns the extension of local package files.
    #[must_use]
    pub const fn file_type(self) -> &'static str {
        match self {
            Self::Yum => "rpm",
            Self::AptGet => "deb",
        }
    }

    /// Returns a command installing `targets`, optionally cleaning caches.
    #[must_use]
    pub fn install_command<S: AsRef<str>>(self, targets: &[S], clean: bool) -> String {
        let targets = targets
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(" ");
        match (self, clean) {
            (Self::Yum, true) => {
                format!("yum install -y {targets} && yum clean all && rm -rf /var/cache/yum")
            }
            (Self::Yum, false) => format!("yum install -y {targets}"),
            (Self::AptGet, true) => {
                format!("apt-get -y update && apt-get -y install {targets} && apt-get clean all")
            }
            (Self::AptGet, false) => format!("apt-get -y update && apt-get -y install {targets}"),
        }
    }

    /// Returns a command installing one local package file.
    #[must_use]
    pub fn local_install_command(self, target: &str) -> String {
        match self {
            Self::Yum => format!("rpm -i {target}"),
            Self::AptGet => format!("dpkg -i {target}"),
        }
    }

    /// Returns a command refreshing the package manager.
    #[must_use]
    pub const fn configure_command(self) -> &'static str {
        match self {
            Self::Yum => {
                "yum update -y \\\n \
                 && echo 'skip_missing_names_on_install=False' >> /etc/yum.conf \\\n \
                 && rm -rf /var/cache/yum"
            }
            Self::AptGet => "apt-get -y update && apt-get clean all",
        }
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Program used to download files inside an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlReader {
    /// cURL.
    Curl,
    /// GNU Wget.
    Wget,
}

impl UrlReader {
    /// Supported URL readers, in detection order.
    pub const ALL: [Self; 2] = [Self::Curl, Self::Wget];

    /// Returns the command name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Curl => "curl",
            Self::Wget => "wget",
        }
    }

    /// Returns a command downloading `url` to `output`, or to stdout.
    #[must_use]
    pub fn read_command(self, url: &str, output: Option<&str>) -> String {
        match (self, output) {
            (Self::Curl, Some(file)) => format!("curl --ssl {url} -o {file}"),
            (Self::Curl, None) => format!("curl --ssl {url} -L"),
            (Self::Wget, Some(file)) => format!("wget {url} -O {file}"),
            (Self::Wget, None) => format!("wget {url} -qO- "),
        }
    }
}

impl fmt::Display for UrlReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a base image provides, and the Dockerfile lines that fill the gaps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageProfile {
    /// Package manager on the image.
    pub package_manager: PackageManager,
    /// URL reader on the image, or the one the init lines install.
    pub url_reader: UrlReader,
    /// `RUN` lines installing what the image lacks. Empty when complete.
    pub init_lines: String,
}

impl ImageProfile {
    /// Checks `image` for a package manager, a URL reader and `tar`.
    ///
    /// With `configure`, the init lines also refresh the package manager.
    /// A missing URL reader is replaced by installing `wget`.
    ///
    /// # Errors
    ///
    /// Returns `WigwamError::Config` if no supported package manager is
    /// found, or the backend's run error.
    pub fn detect(backend: &dyn ImageBackend, image: &str, configure: bool) -> Result<Self> {
        let mut package_manager = None;
        for candidate in PackageManager::ALL {
            if backend.has_command(image, candidate.name())? {
                package_manager = Some(candidate);
                break;
            }
        }
        let package_manager = package_manager.ok_or_else(|| WigwamError::Config {
            message: format!("no supported package manager found on {image}"),
        })?;

        let mut init_lines = String::new();
        if configure {
            init_lines.push_str(&format!("RUN {}\n", package_manager.configure_command()));
        }

        let mut url_reader = None;
        for candidate in UrlReader::ALL {
            if backend.has_command(image, candidate.name())? {
                url_reader = Some(candidate);
                break;
            }
        }
        let url_reader = if let Some(reader) = url_reader {
            reader
        } else {
            init_lines.push_str(&format!("RUN {}\n", package_manager.install_command(&["wget"], true)));
            UrlReader::Wget
        };

        if !backend.has_command(image, "tar")? {
            init_lines.push_str(&format!("RUN {}\n", package_manager.install_command(&["tar"], true)));
        }

        tracing::debug!(
            image,
            package_manager = %package_manager,
            url_reader = %url_reader,
            "detected base image tools"
        );
        Ok(Self {
            package_manager,
            url_reader,
            init_lines,
        })
    }

    /// Returns the profile without init lines, for images built on one
    /// that already installed them.
    #[must_use]
    pub fn installed(&self) -> Self {
        Self {
            init_lines: String::new(),
            ..self.clone()
        }
    }
}

/// A `<major>.<minor>` CUDA version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CudaVersion {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
}

impl CudaVersion {
    /// Parses a version such as `11.4`.
    ///
    /// # Errors
    ///
    /// Returns `WigwamError::Usage` for anything but `<major>.<minor>`, or a
    /// major version below [`MIN_CUDA_MAJOR`].
    pub fn parse(version: &str) -> Result<Self> {
        let malformed = || WigwamError::Usage {
            message: format!("malformed CUDA version: {version}"),
        };
        let captures = CUDA_VERSION
            .as_ref()
            .and_then(|pattern| pattern.captures(version))
            .ok_or_else(malformed)?;
        let major: u32 = captures["major"].parse().map_err(|_| malformed())?;
        let minor: u32 = captures["minor"].parse().map_err(|_| malformed())?;
        if major < MIN_CUDA_MAJOR {
            return Err(WigwamError::Usage {
                message: format!("CUDA {version} requested, only {MIN_CUDA_MAJOR}.0 and newer are supported"),
            });
        }
        Ok(Self { major, minor })
    }

    /// Returns the `<major>-<minor>` form used in tags.
    #[must_use]
    pub fn dashed(self) -> String {
        format!("{}-{}", self.major, self.minor)
    }
}

impl fmt::Display for CudaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// An environment requirements file split into a build context and the
/// file's name within it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvFile {
    /// Directory containing the file, used as the build context.
    pub context: PathBuf,
    /// File name relative to the context.
    pub name: String,
}

impl EnvFile {
    /// Locates a requirements file.
    ///
    /// # Errors
    ///
    /// Returns `WigwamError::Io` if the file does not exist.
    pub fn locate(path: &Path) -> Result<Self> {
        let absolute = path.canonicalize().map_err(|e| WigwamError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        if !absolute.is_file() {
            return Err(WigwamError::Config {
                message: format!("{} is not a file", path.display()),
            });
        }
        let name = absolute
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        let context = absolute.parent().map(Path::to_path_buf);
        match (context, name) {
            (Some(context), Some(name)) => Ok(Self { context, name }),
            _ => Err(WigwamError::Config {
                message: format!("cannot use {} as an environment file", path.display()),
            }),
        }
    }
}

/// Options of a full setup stack build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupAllOptions {
    /// Sub-prefix of every produced tag.
    pub tag: String,
    /// Distribution image the stack starts from.
    pub base: String,
    /// CUDA version of the runtime and compiler.
    pub cuda_version: CudaVersion,
    /// CUDA repository name of the distribution, e.g. `rhel8`.
    pub cuda_repo: String,
    /// Runtime environment requirements.
    pub runtime_env_file: PathBuf,
    /// Development environment requirements.
    pub dev_env_file: PathBuf,
    /// Disable the backend's layer cache.
    pub no_cache: bool,
}
