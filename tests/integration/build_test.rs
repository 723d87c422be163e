//! Integration tests for the staged image build pipeline.
//!
//! These tests are implemented in:
//! `crates/wigwam-image/tests/pipeline_test.rs`
//!
//! Covered scenarios:
//! - `build_all_from_repo_produces_four_tagged_images`: One image per stage, tags derived from the root tag
//! - `build_all_chains_each_stage_on_the_previous`: Each stage uses the previous tag as its base
//! - `build_all_from_copy_path_names_source_after_directory`: `-file-<dir>` source tags and build context
//! - `build_all_with_missing_copy_path_builds_nothing`: Validation happens before the first build
//! - `build_all_stops_at_first_failing_stage`: No stage runs after a failed build
//! - `install_checks_base_for_lib64`: `lib64` check on the base image
//! - `distrib_checks_source_image_and_disables_cache`: Install prefix copied from the source image
//!
//! And in `crates/wigwam-image/tests/setup_test.rs`:
//! - `setup_all_builds_five_chained_images`: Init, CUDA and conda images built on each other
//! - `apt_base_without_reader_gets_wget`: Dockerfiles follow the tools found on the base
//! - `missing_env_file_fails_before_running_anything`: Validation happens before any container runs
//! - `ctest_mounts_output_directory_read_write`: The test report lands in the host output directory
//! - `lockfile_sorts_exported_packages`: Package URLs sorted after the header lines
