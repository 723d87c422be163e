//! System-wide constants and default paths.

/// Prefix carried by every image tag unless overridden.
pub const DEFAULT_TAG_PREFIX: &str = "wigwam";

/// Environment variable that overrides the tag prefix.
pub const TAG_PREFIX_ENV: &str = "WIGWAM_TAG_PREFIX";

/// Default catalog of fetchable data repositories.
pub const DEFAULT_CATALOG_FILE: &str = "workflowdata.json";

/// Default database of workflow tests.
pub const DEFAULT_TEST_FILE: &str = "workflowtests.json";

/// Default host directory holding runconfig files.
pub const DEFAULT_RUNCONFIG_DIR: &str = "./runconfigs";

/// Default host cache directory for fetched data repositories.
pub const DEFAULT_CACHE_DIR: &str = "./cache";

/// Default host directory for workflow output.
pub const DEFAULT_OUTPUT_DIR: &str = "./output";

/// Image that provides the data fetch tool.
pub const DEFAULT_FETCH_IMAGE: &str = "rover";

/// Registry reference pulled when the fetch image is missing.
pub const DEFAULT_FETCH_IMAGE_SOURCE: &str = "docker.io/tylerghudson/rover:latest";

/// Default number of concurrent fetch workers.
pub const DEFAULT_FETCH_WORKERS: usize = 4;

/// Prefix under which built software is installed inside images.
pub const INSTALL_PREFIX: &str = "/app";

/// Directory used for out-of-source builds inside images.
pub const BUILD_PREFIX: &str = "/tmp/build";

/// Directory source code is placed in inside images.
pub const SOURCE_PREFIX: &str = "/src";

/// Host directory receiving ctest results.
pub const DEFAULT_TEST_OUTPUT_DIR: &str = "./Testing/Temps";

/// Container path the ctest results directory is mounted at.
pub const CONTAINER_TEST_DIR: &str = "/tmp/Testing";

/// Container path of workflow input repositories.
pub const CONTAINER_INPUT_DIR: &str = "/tmp/input";

/// Container path of workflow output.
pub const CONTAINER_OUTPUT_DIR: &str = "/tmp/output";

/// Container path of the runconfig directory.
pub const CONTAINER_RUNCONFIG_DIR: &str = "/tmp/runconfig";

/// Container path of the scratch directory.
pub const CONTAINER_SCRATCH_DIR: &str = "/tmp/scratch";

/// Python package holding the workflow entry points.
pub const WORKFLOW_MODULE_ROOT: &str = "nisar.workflows";

/// Application name used in CLI output.
pub const APP_NAME: &str = "wigwam";
