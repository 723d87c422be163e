//! Staged image build pipeline.
//!
//! Every stage resolves its tag and base through a [`TagResolver`], renders
//! a Dockerfile and asks the backend to build it. [`BuildPipeline::build_all`]
//! chains the source, configure, compile and install stages, validating the
//! whole plan before the first image is built. [`BuildPipeline::setup_all`]
//! does the same for the environment images the build starts from.
//!
//! The pipeline also runs commands against finished images: the CTest suite
//! of an installed build and the export of a conda lockfile.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use wigwam_common::constants::CONTAINER_TEST_DIR;
use wigwam_common::error::{Result, WigwamError};
use wigwam_common::types::{ImageRef, ImageTag};
use wigwam_core::mount::BindMount;
use wigwam_core::tag::TagResolver;

use crate::backend::{BuildRequest, ImageBackend, RunRequest};
use crate::ctest::CtestOptions;
use crate::setup::{CudaVersion, EnvFile, ImageProfile, SetupAllOptions};
use crate::sink::OutputSinks;
use crate::stage::{BuildStage, GitRepo, StageGraph, StageKind};
use crate::{dockerfile, lockfile};

const LIB64_TEST: &str = "-d \"$BUILD_PREFIX/lib64\"";

const CUDA_ARCH: &str = "x86_64";

/// Where the source stage of a full build gets its code from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    /// Clone a GitHub repository.
    GitRepo {
        /// Repository to clone.
        repo: GitRepo,
        /// Branch to check out.
        branch: Option<String>,
    },
    /// Copy a host path.
    CopyPath(PathBuf),
}

impl SourceSpec {
    /// Selects the source from mutually exclusive `repo` and `path` options.
    ///
    /// # Errors
    ///
    /// Returns `WigwamError::Usage` unless exactly one of `repo` and `path`
    /// is given, and `MalformedRepoIdentifier` for a bad repository name.
    pub fn from_options(
        repo: Option<&str>,
        path: Option<&Path>,
        branch: Option<&str>,
    ) -> Result<Self> {
        match (repo, path) {
            (Some(repo), None) => Ok(Self::GitRepo {
                repo: GitRepo::parse(repo)?,
                branch: branch.filter(|b| !b.is_empty()).map(String::from),
            }),
            (None, Some(path)) => Ok(Self::CopyPath(path.to_path_buf())),
            _ => Err(WigwamError::Usage {
                message: "exactly one of a repository or a copy path is required".into(),
            }),
        }
    }
}

/// Options of a full source-to-install build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildAllOptions {
    /// Root tag every stage tag derives from.
    pub tag: String,
    /// Base image of the source stage.
    pub base: String,
    /// Source of the code.
    pub source: SourceSpec,
    /// CMake build type.
    pub build_type: String,
    /// Disable CUDA support.
    pub no_cuda: bool,
    /// Disable the backend's layer cache.
    pub no_cache: bool,
}

/// Builds tagged images stage by stage.
pub struct BuildPipeline<'a> {
    backend: &'a dyn ImageBackend,
    tags: TagResolver,
    sinks: OutputSinks,
}

impl<'a> BuildPipeline<'a> {
    /// Creates a pipeline writing build output to `sinks`.
    #[must_use]
    pub fn new(backend: &'a dyn ImageBackend, tags: TagResolver, sinks: OutputSinks) -> Self {
        Self {
            backend,
            tags,
            sinks,
        }
    }

    /// Returns the tag resolver.
    #[must_use]
    pub const fn tags(&self) -> &TagResolver {
        &self.tags
    }

    /// Clones a GitHub repository onto `base`.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRepoIdentifier` before building if `repo` is not
    /// `user/repo`, or the backend's build error.
    pub fn clone_repo(
        &mut self,
        tag: &str,
        base: &str,
        repo: &str,
        branch: Option<&str>,
        no_cache: bool,
    ) -> Result<ImageRef> {
        let kind = StageKind::Clone {
            repo: GitRepo::parse(repo)?,
            branch: branch.map(String::from),
        };
        self.run_stage(&self.stage(kind, base, tag), no_cache)
    }

    /// Copies a host path onto `base`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path does not exist, or the backend's build
    /// error.
    pub fn insert(&mut self, tag: &str, base: &str, path: &Path, no_cache: bool) -> Result<ImageRef> {
        let (context, target_dir) = insert_source(path)?;
        let kind = StageKind::Insert {
            context,
            target_dir,
        };
        self.run_stage(&self.stage(kind, base, tag), no_cache)
    }

    /// Configures the CMake build tree.
    ///
    /// # Errors
    ///
    /// Returns the backend's build error.
    pub fn configure(
        &mut self,
        tag: &str,
        base: &str,
        build_type: &str,
        no_cuda: bool,
        no_cache: bool,
    ) -> Result<ImageRef> {
        let kind = StageKind::Configure {
            build_type: build_type.to_string(),
            with_cuda: !no_cuda,
        };
        self.run_stage(&self.stage(kind, base, tag), no_cache)
    }

    /// Compiles the configured build tree.
    ///
    /// # Errors
    ///
    /// Returns the backend's build error.
    pub fn compile(&mut self, tag: &str, base: &str, no_cache: bool) -> Result<ImageRef> {
        self.run_stage(&self.stage(StageKind::Compile, base, tag), no_cache)
    }

    /// Installs the compiled tree into the install prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if inspecting the base image or the build fails.
    pub fn install(&mut self, tag: &str, base: &str, no_cache: bool) -> Result<ImageRef> {
        self.run_stage(&self.stage(StageKind::Install, base, tag), no_cache)
    }

    /// Copies the installed tree of `source_tag` onto a fresh `base` image.
    ///
    /// The library directory is detected by inspecting the source image.
    ///
    /// # Errors
    ///
    /// Returns an error if inspecting the source image or the build fails.
    pub fn distrib(&mut self, tag: &str, base: &str, source_tag: &str) -> Result<ImageRef> {
        let kind = StageKind::Distrib {
            source: self.tags.resolve(source_tag),
        };
        self.run_stage(&self.stage(kind, base, tag), true)
    }

    /// Plans the source, configure, compile and install stages.
    ///
    /// Tags are `<tag>-git-repo` or `<tag>-file-<dir>`, then
    /// `<tag>-configured`, `<tag>-built` and `<tag>-installed`, all prefixed.
    ///
    /// # Errors
    ///
    /// Returns an error if the copy path does not exist.
    pub fn plan_all(&self, options: &BuildAllOptions) -> Result<StageGraph> {
        let root = self.tags.resolve(&options.tag);
        let (source_kind, source_suffix) = match &options.source {
            SourceSpec::GitRepo { repo, branch } => (
                StageKind::Clone {
                    repo: repo.clone(),
                    branch: branch.clone(),
                },
                "git-repo".to_string(),
            ),
            SourceSpec::CopyPath(path) => {
                let (context, target_dir) = insert_source(path)?;
                let suffix = format!("file-{target_dir}");
                (
                    StageKind::Insert {
                        context,
                        target_dir,
                    },
                    suffix,
                )
            }
        };

        let stage_tag = |suffix: &str| ImageTag::new(format!("{root}-{suffix}"));
        let source_tag = stage_tag(&source_suffix);
        let configured = stage_tag("configured");
        let built = stage_tag("built");
        let installed = stage_tag("installed");

        let mut graph = StageGraph::new();
        let _ = graph.add_stage(BuildStage {
            kind: source_kind,
            base: self.tags.resolve(&options.base),
            produces: source_tag.clone(),
        })?;
        let _ = graph.add_stage(BuildStage {
            kind: StageKind::Configure {
                build_type: options.build_type.clone(),
                with_cuda: !options.no_cuda,
            },
            base: source_tag,
            produces: configured.clone(),
        })?;
        let _ = graph.add_stage(BuildStage {
            kind: StageKind::Compile,
            base: configured,
            produces: built.clone(),
        })?;
        let _ = graph.add_stage(BuildStage {
            kind: StageKind::Install,
            base: built,
            produces: installed,
        })?;
        Ok(graph)
    }

    /// Runs every stage of a full build, returning each produced tag with
    /// its image.
    ///
    /// # Errors
    ///
    /// Returns planning errors before any image is built, or the first
    /// failing stage's error.
    pub fn build_all(&mut self, options: &BuildAllOptions) -> Result<BTreeMap<ImageTag, ImageRef>> {
        let graph = self.plan_all(options)?;
        let mut images = BTreeMap::new();
        for stage in graph.build_order()? {
            let image = self.run_stage(stage, options.no_cache)?;
            let _ = images.insert(stage.produces.clone(), image);
        }
        tracing::info!(tag = %options.tag, images = images.len(), "build complete");
        Ok(images)
    }

    /// Prepares a distribution image: default user, package manager
    /// refresh, and a URL reader and `tar` if the image lacks them.
    ///
    /// `base` is used as given, without the tag prefix.
    ///
    /// # Errors
    ///
    /// Returns `WigwamError::Config` if the base has no supported package
    /// manager, or the backend's error.
    pub fn setup_init(&mut self, tag: &str, base: &str, no_cache: bool) -> Result<ImageRef> {
        let profile = ImageProfile::detect(self.backend, base, true)?;
        let stage = BuildStage {
            kind: StageKind::SetupInit { profile },
            base: ImageTag::new(base),
            produces: self.tags.resolve(tag),
        };
        self.run_stage(&stage, no_cache)
    }

    /// Installs the CUDA runtime from NVIDIA's `repo` repository.
    ///
    /// # Errors
    ///
    /// Returns `WigwamError::Usage` for a malformed repository name, or the
    /// backend's error.
    pub fn setup_cuda_runtime(
        &mut self,
        tag: &str,
        base: &str,
        version: CudaVersion,
        repo: &str,
        no_cache: bool,
    ) -> Result<ImageRef> {
        validate_cuda_repo(repo)?;
        let profile = self.installed_profile(base)?;
        let kind = StageKind::CudaRuntime {
            profile,
            version,
            repo: repo.to_string(),
        };
        self.run_stage(&self.stage(kind, base, tag), no_cache)
    }

    /// Installs the CUDA compiler on a CUDA runtime image.
    ///
    /// # Errors
    ///
    /// Returns the backend's error.
    pub fn setup_cuda_dev(&mut self, tag: &str, base: &str, no_cache: bool) -> Result<ImageRef> {
        let profile = self.installed_profile(base)?;
        self.run_stage(&self.stage(StageKind::CudaDev { profile }, base, tag), no_cache)
    }

    /// Installs micromamba and the packages listed in `env_file`.
    ///
    /// # Errors
    ///
    /// Returns an error if `env_file` is missing, or the backend's error.
    pub fn setup_conda_runtime(
        &mut self,
        tag: &str,
        base: &str,
        env_file: &Path,
        no_cache: bool,
    ) -> Result<ImageRef> {
        let env = EnvFile::locate(env_file)?;
        self.run_stage(&self.stage(StageKind::CondaRuntime { env }, base, tag), no_cache)
    }

    /// Installs the packages listed in `env_file` into a conda runtime
    /// image.
    ///
    /// # Errors
    ///
    /// Returns an error if `env_file` is missing, or the backend's error.
    pub fn setup_conda_dev(
        &mut self,
        tag: &str,
        base: &str,
        env_file: &Path,
        no_cache: bool,
    ) -> Result<ImageRef> {
        let env = EnvFile::locate(env_file)?;
        self.run_stage(&self.stage(StageKind::CondaDev { env }, base, tag), no_cache)
    }

    /// Plans the five setup stages.
    ///
    /// Tags are `<tag>-init`, `<tag>-cuda-<M>-<m>-runtime`,
    /// `<tag>-mamba-runtime`, `<tag>-cuda-<M>-<m>-dev` and `<tag>-mamba-dev`,
    /// all prefixed, each built on the previous one. The distribution base
    /// is inspected once.
    ///
    /// # Errors
    ///
    /// Returns `Usage` for a malformed repository name, an error for a
    /// missing environment file, or the backend's error while inspecting
    /// the base.
    pub fn plan_setup(&self, options: &SetupAllOptions) -> Result<StageGraph> {
        validate_cuda_repo(&options.cuda_repo)?;
        let runtime_env = EnvFile::locate(&options.runtime_env_file)?;
        let dev_env = EnvFile::locate(&options.dev_env_file)?;
        let profile = ImageProfile::detect(self.backend, &options.base, true)?;
        let installed = profile.installed();

        let root = self.tags.resolve(&options.tag);
        let cuda = options.cuda_version.dashed();
        let stage_tag = |suffix: &str| ImageTag::new(format!("{root}-{suffix}"));
        let init = stage_tag("init");
        let cuda_runtime = stage_tag(&format!("cuda-{cuda}-runtime"));
        let mamba_runtime = stage_tag("mamba-runtime");
        let cuda_dev = stage_tag(&format!("cuda-{cuda}-dev"));
        let mamba_dev = stage_tag("mamba-dev");

        let mut graph = StageGraph::new();
        let _ = graph.add_stage(BuildStage {
            kind: StageKind::SetupInit { profile },
            base: ImageTag::new(options.base.as_str()),
            produces: init.clone(),
        })?;
        let _ = graph.add_stage(BuildStage {
            kind: StageKind::CudaRuntime {
                profile: installed.clone(),
                version: options.cuda_version,
                repo: options.cuda_repo.clone(),
            },
            base: init,
            produces: cuda_runtime.clone(),
        })?;
        let _ = graph.add_stage(BuildStage {
            kind: StageKind::CondaRuntime { env: runtime_env },
            base: cuda_runtime,
            produces: mamba_runtime.clone(),
        })?;
        let _ = graph.add_stage(BuildStage {
            kind: StageKind::CudaDev { profile: installed },
            base: mamba_runtime,
            produces: cuda_dev.clone(),
        })?;
        let _ = graph.add_stage(BuildStage {
            kind: StageKind::CondaDev { env: dev_env },
            base: cuda_dev,
            produces: mamba_dev,
        })?;
        Ok(graph)
    }

    /// Runs every setup stage, returning each produced tag with its image.
    ///
    /// # Errors
    ///
    /// Returns planning errors before any image is built, or the first
    /// failing stage's error.
    pub fn setup_all(&mut self, options: &SetupAllOptions) -> Result<BTreeMap<ImageTag, ImageRef>> {
        let graph = self.plan_setup(options)?;
        let mut images = BTreeMap::new();
        for stage in graph.build_order()? {
            let image = self.run_stage(stage, options.no_cache)?;
            let _ = images.insert(stage.produces.clone(), image);
        }
        tracing::info!(tag = %options.tag, images = images.len(), "setup complete");
        Ok(images)
    }

    /// Runs the CTest suite of an installed build and copies the report
    /// to the output directory, returning the report's host path.
    ///
    /// Failing tests do not make this fail; the report records them.
    ///
    /// # Errors
    ///
    /// Returns `Usage` for a report name that is not a plain file name, an
    /// I/O error if the output directory cannot be created, or
    /// `RunFailed` if no report could be copied.
    pub fn ctest(&mut self, tag: &str, options: &CtestOptions) -> Result<PathBuf> {
        options.validate()?;
        std::fs::create_dir_all(&options.output_dir).map_err(|e| WigwamError::Io {
            path: options.output_dir.clone(),
            source: e,
        })?;
        let output_dir = options.output_dir.canonicalize().map_err(|e| WigwamError::Io {
            path: options.output_dir.clone(),
            source: e,
        })?;

        let image = self.tags.resolve(tag);
        let request = RunRequest::new(image.as_str(), options.command())
            .with_mounts(vec![BindMount::read_write(output_dir.clone(), CONTAINER_TEST_DIR)])
            .with_host_user(true);
        tracing::info!(image = %image, output_dir = %output_dir.display(), "running ctest");
        let _ = writeln!(self.sinks, "==> ctest {image}");

        let output = self.backend.run_checked(&request)?;
        let _ = self.sinks.write_all(output.stdout.as_bytes());
        let _ = self.sinks.flush();
        Ok(output_dir.join(&options.report_name))
    }

    /// Exports `env_name` of `image` as an explicit lockfile with its
    /// package URLs sorted.
    ///
    /// `image` is used as given, without the tag prefix.
    ///
    /// # Errors
    ///
    /// Returns `Usage` for an invalid environment name, or the backend's
    /// run error.
    pub fn lockfile(&self, image: &str, env_name: &str) -> Result<String> {
        let command = lockfile::export_command(env_name)?;
        tracing::debug!(image, env_name, "exporting lockfile");
        let output = self.backend.run_checked(&RunRequest::new(image, command))?;
        Ok(lockfile::sort_lockfile(&output.stdout))
    }

    fn stage(&self, kind: StageKind, base: &str, tag: &str) -> BuildStage {
        BuildStage {
            kind,
            base: self.tags.resolve(base),
            produces: self.tags.resolve(tag),
        }
    }

    fn run_stage(&mut self, stage: &BuildStage, no_cache: bool) -> Result<ImageRef> {
        let base = stage.base.as_str();
        let (dockerfile, context) = match &stage.kind {
            StageKind::Clone { repo, branch } => (
                dockerfile::git_clone(base, repo.as_str(), branch.as_deref(), repo.name()),
                None,
            ),
            StageKind::Insert {
                context,
                target_dir,
            } => (dockerfile::insert(base, target_dir), Some(context.clone())),
            StageKind::Configure {
                build_type,
                with_cuda,
            } => (dockerfile::configure(base, build_type, *with_cuda), None),
            StageKind::Compile => (dockerfile::compile(base), None),
            StageKind::Install => {
                let lib_dir = self.lib_dir(base)?;
                (dockerfile::install(base, lib_dir), None)
            }
            StageKind::Distrib { source } => {
                let lib_dir = self.lib_dir(source.as_str())?;
                (dockerfile::distrib(base, source.as_str(), lib_dir), None)
            }
            StageKind::SetupInit { profile } => (dockerfile::setup_init(base, profile), None),
            StageKind::CudaRuntime {
                profile,
                version,
                repo,
            } => (
                dockerfile::cuda_runtime(base, profile, *version, repo, CUDA_ARCH),
                None,
            ),
            StageKind::CudaDev { profile } => (dockerfile::cuda_dev(base, profile), None),
            StageKind::CondaRuntime { env } => (
                dockerfile::conda_runtime(base, &env.name),
                Some(env.context.clone()),
            ),
            StageKind::CondaDev { env } => (
                dockerfile::conda_dev(base, &env.name),
                Some(env.context.clone()),
            ),
        };

        tracing::info!(
            stage = stage.kind.name(),
            tag = %stage.produces,
            base = %stage.base,
            "building stage"
        );
        let _ = writeln!(self.sinks, "==> {} {}", stage.kind.name(), stage.produces);

        let mut request = BuildRequest::new(stage.produces.clone(), dockerfile).with_no_cache(no_cache);
        if let Some(context) = context {
            request = request.with_context(context);
        }
        let image = self.backend.build(&request, &mut self.sinks)?;
        let _ = self.sinks.flush();
        Ok(image)
    }

    fn installed_profile(&self, base: &str) -> Result<ImageProfile> {
        let base = self.tags.resolve(base);
        ImageProfile::detect(self.backend, base.as_str(), false).map(|profile| profile.installed())
    }

    fn lib_dir(&self, image: &str) -> Result<&'static str> {
        if self.backend.test_image(image, LIB64_TEST)? {
            Ok("lib64")
        } else {
            Ok("lib")
        }
    }
}

fn validate_cuda_repo(repo: &str) -> Result<()> {
    if repo.is_empty() || !repo.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(WigwamError::Usage {
            message: format!("malformed CUDA repository name: {repo:?}"),
        });
    }
    Ok(())
}

/// Returns the build context and in-image directory name for a copy path.
fn insert_source(path: &Path) -> Result<(PathBuf, String)> {
    let absolute = path.canonicalize().map_err(|e| WigwamError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let context = if absolute.is_dir() {
        absolute
    } else {
        absolute
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| WigwamError::Config {
                message: format!("{} has no parent directory", path.display()),
            })?
    };
    let target_dir = context
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| WigwamError::Config {
            message: format!("cannot insert {}: no directory name", context.display()),
        })?;
    Ok((context, target_dir))
}
