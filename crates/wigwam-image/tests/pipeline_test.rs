//! Build pipeline tests against a recording backend.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::io::Write;
use std::sync::Mutex;

use wigwam_common::error::{Result, WigwamError};
use wigwam_common::types::{ImageRef, ImageTag};
use wigwam_core::mount::BindMount;
use wigwam_core::tag::TagResolver;
use wigwam_image::backend::{BuildRequest, ImageBackend, RunOutput, RunRequest};
use wigwam_image::pipeline::{BuildAllOptions, BuildPipeline, SourceSpec};
use wigwam_image::sink::OutputSinks;

#[derive(Default)]
struct RecordingBackend {
    builds: Mutex<Vec<BuildRequest>>,
    runs: Mutex<Vec<RunRequest>>,
    has_lib64: bool,
    fail_on: Option<String>,
}

impl RecordingBackend {
    fn built_tags(&self) -> Vec<String> {
        self.builds
            .lock()
            .unwrap()
            .iter()
            .map(|b| b.tag.to_string())
            .collect()
    }
}

impl ImageBackend for RecordingBackend {
    fn build(&self, request: &BuildRequest, log: &mut dyn Write) -> Result<ImageRef> {
        writeln!(log, "building {}", request.tag).unwrap();
        self.builds.lock().unwrap().push(request.clone());
        if self.fail_on.as_deref() == Some(request.tag.as_str()) {
            return Err(WigwamError::BuildFailed {
                tag: request.tag.to_string(),
                diagnostic: "cmake error".into(),
            });
        }
        Ok(ImageRef::new(format!("sha256:{}", request.tag)))
    }

    fn run(&self, request: &RunRequest) -> Result<RunOutput> {
        self.runs.lock().unwrap().push(request.clone());
        Ok(RunOutput {
            exit_code: Some(if self.has_lib64 { 0 } else { 1 }),
            ..RunOutput::default()
        })
    }

    fn inspect(&self, image: &str, _field: &str) -> Result<String> {
        Ok(format!("sha256:{image}"))
    }

    fn remove(&self, _pattern: &str, _force: bool) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn drop_in(&self, _image: &str, _mounts: &[BindMount]) -> Result<()> {
        Ok(())
    }

    fn pull(&self, _source: &str, tag: &str) -> Result<ImageRef> {
        Ok(ImageRef::new(format!("sha256:{tag}")))
    }

    fn is_available(&self) -> bool {
        true
    }
}

fn pipeline(backend: &RecordingBackend) -> BuildPipeline<'_> {
    BuildPipeline::new(backend, TagResolver::new("wigwam"), OutputSinks::new())
}

fn repo_options() -> BuildAllOptions {
    BuildAllOptions {
        tag: "isce3".into(),
        base: "setup".into(),
        source: SourceSpec::from_options(Some("isce-framework/isce3"), None, Some("main"))
            .unwrap(),
        build_type: "Release".into(),
        no_cuda: false,
        no_cache: false,
    }
}

// ── Full builds ──────────────────────────────────────────────────────

#[test]
fn build_all_from_repo_produces_four_tagged_images() {
    let backend = RecordingBackend::default();
    let images = pipeline(&backend).build_all(&repo_options()).unwrap();

    let tags: Vec<&str> = images.keys().map(ImageTag::as_str).collect();
    assert_eq!(images.len(), 4);
    for expected in [
        "wigwam-isce3-git-repo",
        "wigwam-isce3-configured",
        "wigwam-isce3-built",
        "wigwam-isce3-installed",
    ] {
        assert!(tags.contains(&expected), "missing {expected}: {tags:?}");
    }
    assert_eq!(
        images[&ImageTag::new("wigwam-isce3-built")],
        ImageRef::new("sha256:wigwam-isce3-built")
    );
}

#[test]
fn build_all_chains_each_stage_on_the_previous() {
    let backend = RecordingBackend::default();
    let _ = pipeline(&backend).build_all(&repo_options()).unwrap();

    assert_eq!(
        backend.built_tags(),
        vec![
            "wigwam-isce3-git-repo",
            "wigwam-isce3-configured",
            "wigwam-isce3-built",
            "wigwam-isce3-installed",
        ]
    );
    let builds = backend.builds.lock().unwrap();
    assert!(builds[0].dockerfile.starts_with("FROM wigwam-setup\n"));
    assert!(builds[0].dockerfile.contains("--branch=main"));
    assert!(builds[1].dockerfile.starts_with("FROM wigwam-isce3-git-repo\n"));
    assert!(builds[2].dockerfile.starts_with("FROM wigwam-isce3-configured\n"));
    assert!(builds[3].dockerfile.starts_with("FROM wigwam-isce3-built\n"));
}

#[test]
fn build_all_from_copy_path_names_source_after_directory() {
    let root = tempfile::tempdir().expect("tempdir");
    let src = root.path().join("isce3-src");
    std::fs::create_dir(&src).expect("mkdir");

    let backend = RecordingBackend::default();
    let options = BuildAllOptions {
        source: SourceSpec::from_options(None, Some(&src), None).unwrap(),
        ..repo_options()
    };
    let images = pipeline(&backend).build_all(&options).unwrap();

    assert!(images.contains_key(&ImageTag::new("wigwam-isce3-file-isce3-src")));
    let builds = backend.builds.lock().unwrap();
    assert_eq!(builds[0].context.as_deref(), Some(src.canonicalize().unwrap().as_path()));
}

#[test]
fn build_all_with_missing_copy_path_builds_nothing() {
    let backend = RecordingBackend::default();
    let options = BuildAllOptions {
        source: SourceSpec::CopyPath("/nonexistent/wigwam-src".into()),
        ..repo_options()
    };
    assert!(pipeline(&backend).build_all(&options).is_err());
    assert!(backend.built_tags().is_empty());
}

#[test]
fn build_all_stops_at_first_failing_stage() {
    let backend = RecordingBackend {
        fail_on: Some("wigwam-isce3-built".into()),
        ..RecordingBackend::default()
    };
    let err = pipeline(&backend).build_all(&repo_options()).unwrap_err();

    assert!(matches!(err, WigwamError::BuildFailed { ref tag, .. } if tag == "wigwam-isce3-built"));
    assert_eq!(backend.built_tags().len(), 3);
}

#[test]
fn no_cuda_and_no_cache_reach_the_backend() {
    let backend = RecordingBackend::default();
    let options = BuildAllOptions {
        no_cuda: true,
        no_cache: true,
        ..repo_options()
    };
    let _ = pipeline(&backend).build_all(&options).unwrap();

    let builds = backend.builds.lock().unwrap();
    assert!(builds.iter().all(|b| b.no_cache));
    assert!(!builds[1].dockerfile.contains("WITH_CUDA"));
}

// ── Individual stages ────────────────────────────────────────────────

#[test]
fn malformed_repo_fails_before_any_build() {
    let backend = RecordingBackend::default();
    let err = pipeline(&backend)
        .clone_repo("isce3", "setup", "not/a/repo", None, false)
        .unwrap_err();

    assert!(matches!(err, WigwamError::MalformedRepoIdentifier { .. }));
    assert!(backend.built_tags().is_empty());
    assert!(backend.runs.lock().unwrap().is_empty());
}

#[test]
fn stage_tags_are_prefixed_once() {
    let backend = RecordingBackend::default();
    let _ = pipeline(&backend)
        .compile("wigwam-app-built", "app-configured", false)
        .unwrap();

    let builds = backend.builds.lock().unwrap();
    assert_eq!(builds[0].tag.as_str(), "wigwam-app-built");
    assert!(builds[0].dockerfile.starts_with("FROM wigwam-app-configured\n"));
}

#[test]
fn install_checks_base_for_lib64() {
    let backend = RecordingBackend {
        has_lib64: true,
        ..RecordingBackend::default()
    };
    let _ = pipeline(&backend).install("app-installed", "app-built", false).unwrap();

    let runs = backend.runs.lock().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].image, "wigwam-app-built");
    assert!(runs[0].command.contains("lib64"));
    let builds = backend.builds.lock().unwrap();
    assert!(builds[0].dockerfile.contains("$INSTALL_PREFIX/lib64"));
}

#[test]
fn install_falls_back_to_lib() {
    let backend = RecordingBackend::default();
    let _ = pipeline(&backend).install("app-installed", "app-built", false).unwrap();

    let builds = backend.builds.lock().unwrap();
    assert!(builds[0].dockerfile.contains("$INSTALL_PREFIX/lib\n"));
}

#[test]
fn distrib_checks_source_image_and_disables_cache() {
    let backend = RecordingBackend::default();
    let _ = pipeline(&backend)
        .distrib("app-distrib", "runtime", "app-installed")
        .unwrap();

    let runs = backend.runs.lock().unwrap();
    assert_eq!(runs[0].image, "wigwam-app-installed");
    let builds = backend.builds.lock().unwrap();
    assert_eq!(builds[0].tag.as_str(), "wigwam-app-distrib");
    assert!(builds[0].no_cache);
    assert!(
        builds[0]
            .dockerfile
            .starts_with("FROM wigwam-app-installed as source\nFROM wigwam-runtime\n")
    );
}
