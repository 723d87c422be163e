//! Dockerfile templates for the setup and build stages.

use wigwam_common::constants::{BUILD_PREFIX, INSTALL_PREFIX};

use crate::setup::{CudaVersion, ImageProfile, PackageManager};

const MAMBA_ACTIVATE: &str = "ARG MAMBA_DOCKERFILE_ACTIVATE=1\nUSER $MAMBA_USER";

/// Image the micromamba binaries are copied from.
pub const MICROMAMBA_IMAGE: &str = "mambaorg/micromamba:1.3.1";

const CUDA_REPOS: &str = "https://developer.download.nvidia.com/compute/cuda/repos";
const CUDA_RUNTIME_TARGETS: [&str; 2] = ["cuda-cudart-$CUDA_PKG_VERSION", "libcufft-$CUDA_PKG_VERSION"];

/// Adds the default user and group on top of the detected init lines.
#[must_use]
pub fn setup_init(base: &str, profile: &ImageProfile) -> String {
    format!(
        "FROM {base}\n\n\
         {init}\n\
         ENV DEFAULT_GROUP defaultgroup\n\
         ENV DEFAULT_USER defaultuser\n\
         ENV DEFAULT_GID 1000\n\
         ENV DEFAULT_UID 1000\n\n\
         RUN groupadd -g $DEFAULT_GID $DEFAULT_GROUP\n\
         RUN useradd -g $DEFAULT_GID -u $DEFAULT_UID -m $DEFAULT_USER\n\n\
         RUN chmod -R 777 /tmp\n",
        init = profile.init_lines
    )
}

fn cuda_install_lines<S: AsRef<str>>(package_manager: PackageManager, targets: &[S]) -> String {
    let install = package_manager.install_command(targets, true);
    match package_manager {
        PackageManager::AptGet => format!("RUN apt-get update \\\n && {install}\n"),
        PackageManager::Yum => format!("RUN {install}\n"),
    }
}

fn cuda_repo_lines(profile: &ImageProfile, repo: &str, arch: &str) -> String {
    let repo_url = format!("{CUDA_REPOS}/{repo}/{arch}/");
    match profile.package_manager {
        PackageManager::AptGet => {
            let keyring = format!("cuda-keyring_1.0-1_all.{}", profile.package_manager.file_type());
            format!(
                "RUN {} \\\n && {}\n",
                profile
                    .url_reader
                    .read_command(&format!("{repo_url}{keyring}"), Some(&keyring)),
                profile.package_manager.local_install_command(&keyring)
            )
        }
        PackageManager::Yum => format!(
            "RUN yum-config-manager --add-repo {repo_url}cuda-{repo}.repo \\\n && yum clean all\n"
        ),
    }
}

/// Installs the CUDA runtime libraries from NVIDIA's repository.
#[must_use]
pub fn cuda_runtime(base: &str, profile: &ImageProfile, version: CudaVersion, repo: &str, arch: &str) -> String {
    format!(
        "FROM {base}\n\n\
         {init}\n\
         {repo_lines}\
         ENV NVIDIA_VISIBLE_DEVICES all\n\
         ENV NVIDIA_DRIVER_CAPABILITIES compute,utility\n\
         ENV CUDA_VERSION_MAJOR {major}\n\
         ENV CUDA_VERSION_MINOR {minor}\n\
         ENV CUDA_PKG_VERSION \"${{CUDA_VERSION_MAJOR}}-${{CUDA_VERSION_MINOR}}\"\n\
         ENV NVIDIA_REQUIRE_CUDA cuda>=${{CUDA_VERSION_MAJOR}}.${{CUDA_VERSION_MINOR}}\n\
         {install}",
        init = profile.init_lines,
        repo_lines = cuda_repo_lines(profile, repo, arch),
        major = version.major,
        minor = version.minor,
        install = cuda_install_lines(profile.package_manager, &CUDA_RUNTIME_TARGETS),
    )
}

/// Installs the CUDA compiler and development headers.
///
/// The CUDA version comes from the environment of the runtime image.
#[must_use]
pub fn cuda_dev(base: &str, profile: &ImageProfile) -> String {
    let targets: &[&str] = match profile.package_manager {
        PackageManager::AptGet => &[
            "cuda-cudart-dev-$CUDA_PKG_VERSION",
            "cuda-nvcc-$CUDA_PKG_VERSION",
            "libcufft-dev-$CUDA_PKG_VERSION",
        ],
        PackageManager::Yum => &[
            "cuda-cudart-devel-$CUDA_PKG_VERSION",
            "cuda-nvcc-$CUDA_PKG_VERSION",
            "libcufft-devel-$CUDA_PKG_VERSION",
            "rpm-build",
        ],
    };
    format!(
        "FROM {base}\n\n\
         {init}\n\
         USER root\n\
         {install}\
         ENV CUDAHOSTCXX=x86_64-conda-linux-gnu-c++\n\
         ENV CUDACXX=/usr/local/cuda-${{CUDA_VERSION_MAJOR}}.${{CUDA_VERSION_MINOR}}/bin/nvcc\n\
         USER $DEFAULT_USER\n",
        init = profile.init_lines,
        install = cuda_install_lines(profile.package_manager, targets),
    )
}

fn mamba_requirements(env_file: &str) -> String {
    format!(
        "ARG MAMBA_DOCKERFILE_ACTIVATE=1\n\n\
         COPY {env_file} /tmp/reqs-file.txt\n\
         RUN micromamba install -c conda-forge --override-channels -y -f /tmp/reqs-file.txt \\\n \
         && rm /tmp/reqs-file.txt \\\n \
         && micromamba clean --all --yes\n"
    )
}

/// Installs micromamba for the default user and creates the runtime
/// environment from `env_file`, relative to the build context.
#[must_use]
pub fn conda_runtime(base: &str, env_file: &str) -> String {
    let bin = "/usr/local/bin";
    let scripts = [
        "_activate_current_env.sh",
        "_dockerfile_shell.sh",
        "_entrypoint.sh",
        "_dockerfile_initialize_user_accounts.sh",
        "_dockerfile_setup_root_prefix.sh",
    ]
    .iter()
    .map(|script| format!("COPY --from=micromamba {bin}/{script} {bin}/{script}\n"))
    .collect::<String>();
    format!(
        "FROM {MICROMAMBA_IMAGE} AS micromamba\n\n\
         FROM {base}\n\n\
         USER root\n\
         ENV MAMBA_USER=$DEFAULT_USER\n\
         ENV MAMBA_USER_ID=$DEFAULT_UID\n\
         ENV MAMBA_USER_GID=$DEFAULT_GID\n\
         ENV MAMBA_ROOT_PREFIX=\"/opt/conda\"\n\
         ENV MAMBA_EXE=\"/bin/micromamba\"\n\
         COPY --from=micromamba \"$MAMBA_EXE\" \"$MAMBA_EXE\"\n\
         {scripts}\
         RUN {bin}/_dockerfile_initialize_user_accounts.sh \\\n \
         && {bin}/_dockerfile_setup_root_prefix.sh\n\
         USER $MAMBA_USER\n\
         SHELL [\"{bin}/_dockerfile_shell.sh\"]\n\
         ENTRYPOINT [\"{bin}/_entrypoint.sh\"]\n\
         {requirements}",
        requirements = mamba_requirements(env_file),
    )
}

/// Adds the packages of `env_file` to the runtime environment.
#[must_use]
pub fn conda_dev(base: &str, env_file: &str) -> String {
    format!("FROM {base}\n\n{}", mamba_requirements(env_file))
}

/// Clones `repo` from GitHub into `/<target_dir>`.
#[must_use]
pub fn git_clone(base: &str, repo: &str, branch: Option<&str>, target_dir: &str) -> String {
    let branch_arg = branch
        .filter(|b| !b.is_empty())
        .map(|b| format!(" --branch={b}"))
        .unwrap_or_default();
    format!(
        "FROM {base}\n\
         USER root\n\
         RUN mkdir -p /{target_dir} && chmod 777 /{target_dir}\n\
         {MAMBA_ACTIVATE}\n\
         RUN git clone{branch_arg} https://github.com/{repo}.git /{target_dir} \
         && rm -rf /{target_dir}/.git*\n\
         WORKDIR /{target_dir}\n"
    )
}

/// Copies the build context into `/<target_dir>`.
#[must_use]
pub fn insert(base: &str, target_dir: &str) -> String {
    format!(
        "FROM {base}\n\
         COPY --chown=$DEFAULT_GID:$DEFAULT_UID --chmod=777 . \"/{target_dir}/\"\n\
         WORKDIR \"/{target_dir}\"\n\
         USER $DEFAULT_USER\n"
    )
}

/// Configures a CMake build tree under the build prefix.
#[must_use]
pub fn configure(base: &str, build_type: &str, with_cuda: bool) -> String {
    let cuda = if with_cuda { " -DWITH_CUDA=YES" } else { "" };
    format!(
        "FROM {base}\n\
         {MAMBA_ACTIVATE}\n\
         ENV INSTALL_PREFIX {INSTALL_PREFIX}\n\
         ENV BUILD_PREFIX {BUILD_PREFIX}\n\
         ENV PYTHONPATH $INSTALL_PREFIX/packages:$PYTHONPATH\n\
         RUN cmake -B $BUILD_PREFIX -G Ninja \
         -DCMAKE_BUILD_TYPE={build_type} \
         -DCMAKE_INSTALL_PREFIX=$INSTALL_PREFIX \
         -DCMAKE_PREFIX_PATH=$MAMBA_ROOT_PREFIX{cuda} .\n"
    )
}

/// Compiles a configured build tree.
#[must_use]
pub fn compile(base: &str) -> String {
    format!("FROM {base}\n{MAMBA_ACTIVATE}\nRUN cmake --build $BUILD_PREFIX --parallel\n")
}

/// Installs a compiled build tree, linking against `<prefix>/<lib_dir>`.
#[must_use]
pub fn install(base: &str, lib_dir: &str) -> String {
    format!(
        "FROM {base}\n\
         {MAMBA_ACTIVATE}\n\
         USER root\n\
         RUN cmake --build $BUILD_PREFIX --target install --parallel\n\
         RUN chmod -R 777 $BUILD_PREFIX\n\
         USER $MAMBA_USER\n\
         ENV LD_LIBRARY_PATH $LD_LIBRARY_PATH:$INSTALL_PREFIX/{lib_dir}\n\
         WORKDIR $BUILD_PREFIX\n"
    )
}

/// Copies the install prefix of `source_tag` onto a fresh `base` image.
#[must_use]
pub fn distrib(base: &str, source_tag: &str, lib_dir: &str) -> String {
    format!(
        "FROM {source_tag} as source\n\
         FROM {base}\n\
         USER root\n\
         COPY --from=source {INSTALL_PREFIX} {INSTALL_PREFIX}\n\
         ENV LD_LIBRARY_PATH $LD_LIBRARY_PATH:{INSTALL_PREFIX}/{lib_dir}\n\
         ENV PYTHONPATH $PYTHONPATH:{INSTALL_PREFIX}/packages\n\
         USER $DEFAULT_USER\n\
         WORKDIR {INSTALL_PREFIX}\n"
    )
}
