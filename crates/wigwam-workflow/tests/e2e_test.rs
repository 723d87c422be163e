//! End-to-end tests across the wigwam crates.
//!
//! These tests drive the same path as the CLI, against files on disk and a
//! fake container backend:
//! 1. Load the test database and data catalog
//! 2. Collect a test's input repositories and fetch them
//! 3. Resolve inputs from supplied paths and cache directories
//! 4. Run single and series workflow tests

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use wigwam_common::error::{Result, WigwamError};
use wigwam_common::types::ImageRef;
use wigwam_core::inputs::{parse_input_args, resolve_inputs};
use wigwam_core::mount::BindMount;
use wigwam_data::catalog::Catalog;
use wigwam_data::fetch::FetchOrchestrator;
use wigwam_data::search::{SearchQuery, search};
use wigwam_image::backend::{BuildRequest, ImageBackend, RunOutput, RunRequest};
use wigwam_workflow::engine::{WorkflowEngine, WorkflowParams};
use wigwam_workflow::testdb::{TestDatabase, parse_test_id};

#[derive(Default)]
struct FakeDocker {
    runs: Mutex<Vec<RunRequest>>,
}

impl ImageBackend for FakeDocker {
    fn build(&self, _request: &BuildRequest, _log: &mut dyn Write) -> Result<ImageRef> {
        unreachable!("no builds in workflow runs")
    }

    fn run(&self, request: &RunRequest) -> Result<RunOutput> {
        self.runs.lock().unwrap().push(request.clone());
        let stdout = if request.command == "echo $MOUNT_LOCATION" {
            "/home/rover/cache\n".to_string()
        } else {
            String::new()
        };
        Ok(RunOutput {
            stdout,
            exit_code: Some(0),
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

const CATALOG: &str = r#"{"data": [
    {"name": "L0B_RRSD_A", "tags": ["L0B", "RRSD"], "url": "https://example.org/a", "files": {"a.h5": "1"}},
    {"name": "L0B_RRSD_B", "tags": ["L0B", "RRSD"], "url": "https://example.org/b", "files": {"b.h5": "2"}},
    {"name": "DEM", "tags": ["dem"], "url": "https://example.org/dem", "files": {"dem.tif": "3"}}
]}"#;

const TESTS: &str = r#"{
    "insar": {
        "type": "single",
        "tests": {
            "pair": {"runconfig": "insar.yaml", "inputs": {"ref": "L0B_RRSD_A", "sec": "L0B_RRSD_B"}}
        }
    },
    "end2end": {
        "type": "multi",
        "tests": {
            "rrsd": {
                "runconfig": "",
                "inputs": ["L0B_RRSD_A", "DEM"],
                "series": [
                    {"workflow": "rslc", "runconfig": "rslc.yaml"},
                    {"workflow": "gslc", "runconfig": "gslc.yaml"}
                ]
            }
        }
    }
}"#;

struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("workflowdata.json"), CATALOG).unwrap();
        std::fs::write(dir.path().join("workflowtests.json"), TESTS).unwrap();
        let runconfigs = dir.path().join("runconfigs");
        std::fs::create_dir_all(&runconfigs).unwrap();
        for name in ["insar.yaml", "rslc.yaml", "gslc.yaml"] {
            std::fs::write(runconfigs.join(name), "{}\n").unwrap();
        }
        Self { dir }
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    fn cache_repo(&self, cache: &str, repo: &str) -> PathBuf {
        let path = self.path(cache).join(repo);
        std::fs::create_dir_all(&path).unwrap();
        path
    }
}

fn mount_targets(request: &RunRequest) -> Vec<String> {
    request
        .mounts
        .iter()
        .map(|m| m.container_path().display().to_string())
        .collect()
}

// ── Data Fetch ───────────────────────────────────────────────────────

#[test]
fn e2e_fetch_test_inputs_from_catalog() {
    let ws = Workspace::new();
    let db = TestDatabase::load(&ws.path("workflowtests.json")).unwrap();
    let catalog = Catalog::load(&ws.path("workflowdata.json")).unwrap();

    let (workflow, test) = parse_test_id("end2end:rrsd").unwrap();
    let names = db.get(&workflow, &test).unwrap().inputs.repos();
    let items = search(&catalog, &SearchQuery::by_names(names)).unwrap();
    assert_eq!(items.len(), 2);

    let backend = FakeDocker::default();
    let orchestrator = FetchOrchestrator::new(&backend, "rover", 2);
    let mount = orchestrator.cache_mount(&ws.path("cache")).unwrap();
    let fetched = orchestrator.fetch(&items, &mount, false).unwrap();

    assert_eq!(fetched, vec!["L0B_RRSD_A", "DEM"]);
    assert!(ws.path("cache").is_dir());
    let runs = backend.runs.lock().unwrap();
    let fetch_runs: Vec<&RunRequest> = runs
        .iter()
        .filter(|r| r.command.starts_with("python -m rover fetch"))
        .collect();
    assert_eq!(fetch_runs.len(), 2);
    assert!(fetch_runs.iter().all(|r| r.as_host_user));
}

// ── Single Workflow ──────────────────────────────────────────────────

#[test]
fn e2e_single_test_with_labeled_inputs() {
    let ws = Workspace::new();
    let db = TestDatabase::load(&ws.path("workflowtests.json")).unwrap();
    let spec = db.get("insar", "pair").unwrap();
    let ref_dir = ws.cache_repo("elsewhere", "reference");
    let sec_dir = ws.cache_repo("cache", "L0B_RRSD_B");

    let supplied = parse_input_args(&[format!("ref:{}", ref_dir.display())]).unwrap();
    let inputs = resolve_inputs(&spec.inputs.requirements(), &supplied, &[ws.path("cache")]).unwrap();
    assert_eq!(inputs["L0B_RRSD_A"], ref_dir);
    assert_eq!(inputs["L0B_RRSD_B"], sec_dir);

    let backend = FakeDocker::default();
    let params = WorkflowParams {
        image: "wigwam-isce3".into(),
        inputs,
        output_dir: ws.path("output"),
        scratch_dir: None,
    };
    let report = WorkflowEngine::new(&backend, ws.path("runconfigs"))
        .run(&spec, &params)
        .unwrap();

    assert_eq!(report.steps.len(), 1);
    let runs = backend.runs.lock().unwrap();
    assert_eq!(
        runs[0].command,
        "python -m nisar.workflows.insar /tmp/runconfig/insar.yaml --restart"
    );
    assert_eq!(
        mount_targets(&runs[0]),
        vec![
            "/tmp/output",
            "/tmp/runconfig",
            "/tmp/input/L0B_RRSD_A",
            "/tmp/input/L0B_RRSD_B",
            "/tmp/scratch",
        ]
    );
}

#[test]
fn e2e_missing_inputs_stop_before_running() {
    let ws = Workspace::new();
    let db = TestDatabase::load(&ws.path("workflowtests.json")).unwrap();
    let spec = db.get("insar", "pair").unwrap();
    let _ = ws.cache_repo("cache", "L0B_RRSD_A");

    let err = resolve_inputs(
        &spec.inputs.requirements(),
        &parse_input_args::<&str>(&[]).unwrap(),
        &[ws.path("cache")],
    )
    .unwrap_err();

    match err {
        WigwamError::RequiredRepositoryNotFound { repos } => assert_eq!(repos, vec!["L0B_RRSD_B"]),
        other => unreachable!("unexpected error: {other}"),
    }
}

// ── Series Workflow ──────────────────────────────────────────────────

#[test]
fn e2e_series_test_shares_mounts_across_steps() {
    let ws = Workspace::new();
    let db = TestDatabase::load(&ws.path("workflowtests.json")).unwrap();
    let spec = db.get("end2end", "rrsd").unwrap();
    let _ = ws.cache_repo("cache", "L0B_RRSD_A");
    let _ = ws.cache_repo("cache", "DEM");

    let inputs = resolve_inputs(
        &spec.inputs.requirements(),
        &parse_input_args::<&str>(&[]).unwrap(),
        &[ws.path("cache")],
    )
    .unwrap();
    let scratch = ws.path("scratch");
    let params = WorkflowParams {
        image: "wigwam-isce3".into(),
        inputs,
        output_dir: ws.path("output"),
        scratch_dir: Some(scratch.clone()),
    };

    let backend = FakeDocker::default();
    let report = WorkflowEngine::new(&backend, ws.path("runconfigs"))
        .run(&spec, &params)
        .unwrap();

    assert_eq!(report.steps.len(), 2);
    let runs = backend.runs.lock().unwrap();
    assert_eq!(runs[0].mounts, runs[1].mounts);
    assert!(ws.path("output/end2end/rrsd/rslc").is_dir());
    assert!(ws.path("output/end2end/rrsd/gslc").is_dir());
    assert!(scratch.join("end2end/rrsd/gslc").is_dir());
    assert!(scratch.is_dir());
}
