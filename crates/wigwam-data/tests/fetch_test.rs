//! Fetch orchestration tests against a fake backend.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::BTreeSet;
use std::io::Write;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use wigwam_common::error::{Result, WigwamError};
use wigwam_common::types::ImageRef;
use wigwam_core::mount::BindMount;
use wigwam_data::catalog::{Catalog, CatalogItem};
use wigwam_data::fetch::FetchOrchestrator;
use wigwam_data::search::{SearchQuery, search};
use wigwam_image::backend::{BuildRequest, ImageBackend, RunOutput, RunRequest};

#[derive(Default)]
struct FakeFetchBackend {
    commands: Mutex<Vec<String>>,
    mounts: Mutex<Vec<Vec<BindMount>>>,
    failing_repo: Option<&'static str>,
    active: AtomicUsize,
    peak: AtomicUsize,
    missing_image: bool,
    pulls: Mutex<Vec<(String, String)>>,
}

impl ImageBackend for FakeFetchBackend {
    fn build(&self, _request: &BuildRequest, _log: &mut dyn Write) -> Result<ImageRef> {
        unreachable!("fetching never builds images")
    }

    fn run(&self, request: &RunRequest) -> Result<RunOutput> {
        if request.command == "echo $MOUNT_LOCATION" {
            return Ok(RunOutput {
                stdout: "/home/rover/cache\n".into(),
                exit_code: Some(0),
                ..RunOutput::default()
            });
        }

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        let _ = self.active.fetch_sub(1, Ordering::SeqCst);

        self.commands.lock().unwrap().push(request.command.clone());
        self.mounts.lock().unwrap().push(request.mounts.clone());
        let failed = self
            .failing_repo
            .is_some_and(|repo| request.command.contains(&format!("--repo {repo} ")));
        Ok(RunOutput {
            stderr: if failed { "404 not found".into() } else { String::new() },
            exit_code: Some(i32::from(failed)),
            ..RunOutput::default()
        })
    }

    fn inspect(&self, image: &str, _field: &str) -> Result<String> {
        if self.missing_image && self.pulls.lock().unwrap().is_empty() {
            Err(WigwamError::ImageNotFound {
                image: image.into(),
            })
        } else {
            Ok(format!("sha256:{image}"))
        }
    }

    fn remove(&self, _pattern: &str, _force: bool) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn drop_in(&self, _image: &str, _mounts: &[BindMount]) -> Result<()> {
        Ok(())
    }

    fn pull(&self, source: &str, tag: &str) -> Result<ImageRef> {
        if source.contains("unreachable") {
            return Err(WigwamError::ImageNotFound {
                image: source.into(),
            });
        }
        self.pulls.lock().unwrap().push((source.into(), tag.into()));
        Ok(ImageRef::new(format!("sha256:{tag}")))
    }

    fn is_available(&self) -> bool {
        true
    }
}

fn items(count: usize) -> Vec<CatalogItem> {
    (0..count)
        .map(|i| CatalogItem {
            name: format!("repo{i}"),
            tags: BTreeSet::new(),
            url: format!("https://example.org/{i}"),
            files: [(format!("f{i}.h5"), format!("hash{i}"))].into_iter().collect(),
        })
        .collect()
}

fn mount() -> BindMount {
    BindMount::read_write("/host/cache", "/home/rover/cache")
}

// ── Worker pool ──────────────────────────────────────────────────────

#[test]
fn every_item_fetched_when_none_fail() {
    let backend = FakeFetchBackend::default();
    let items = items(6);
    let refs: Vec<&CatalogItem> = items.iter().collect();

    let fetched = FetchOrchestrator::new(&backend, "rover", 3)
        .fetch(&refs, &mount(), false)
        .unwrap();

    assert_eq!(fetched.len(), 6);
    assert_eq!(fetched[0], "repo0");
    assert_eq!(backend.commands.lock().unwrap().len(), 6);
    assert!(
        backend
            .mounts
            .lock()
            .unwrap()
            .iter()
            .all(|mounts| mounts == &vec![mount()])
    );
}

#[test]
fn concurrency_is_bounded_by_worker_count() {
    let backend = FakeFetchBackend::default();
    let items = items(8);
    let refs: Vec<&CatalogItem> = items.iter().collect();

    let _ = FetchOrchestrator::new(&backend, "rover", 2)
        .fetch(&refs, &mount(), false)
        .unwrap();

    assert!(backend.peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(backend.commands.lock().unwrap().len(), 8);
}

#[test]
fn first_failure_is_returned() {
    let backend = FakeFetchBackend {
        failing_repo: Some("repo2"),
        ..FakeFetchBackend::default()
    };
    let items = items(5);
    let refs: Vec<&CatalogItem> = items.iter().collect();

    let err = FetchOrchestrator::new(&backend, "rover", 2)
        .fetch(&refs, &mount(), false)
        .unwrap_err();

    match err {
        WigwamError::FetchFailed { repo, diagnostic } => {
            assert_eq!(repo, "repo2");
            assert_eq!(diagnostic, "404 not found");
        }
        other => unreachable!("unexpected error: {other}"),
    }
}

#[test]
fn failure_stops_dispatch_of_later_jobs() {
    let backend = FakeFetchBackend {
        failing_repo: Some("repo1"),
        ..FakeFetchBackend::default()
    };
    let items = items(5);
    let refs: Vec<&CatalogItem> = items.iter().collect();

    assert!(
        FetchOrchestrator::new(&backend, "rover", 1)
            .fetch(&refs, &mount(), false)
            .is_err()
    );
    assert_eq!(backend.commands.lock().unwrap().len(), 2);
}

#[test]
fn no_cache_reaches_every_command() {
    let backend = FakeFetchBackend::default();
    let items = items(2);
    let refs: Vec<&CatalogItem> = items.iter().collect();

    let _ = FetchOrchestrator::new(&backend, "rover", 4)
        .fetch(&refs, &mount(), true)
        .unwrap();

    assert!(
        backend
            .commands
            .lock()
            .unwrap()
            .iter()
            .all(|cmd| cmd.contains("--no-cache"))
    );
}

#[test]
fn empty_batch_runs_nothing() {
    let backend = FakeFetchBackend::default();
    let fetched = FetchOrchestrator::new(&backend, "rover", 4)
        .fetch(&[], &mount(), false)
        .unwrap();
    assert!(fetched.is_empty());
    assert!(backend.commands.lock().unwrap().is_empty());
}

#[test]
fn cache_mount_uses_image_location() {
    let backend = FakeFetchBackend::default();
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = dir.path().join("cache");

    let mount = FetchOrchestrator::new(&backend, "rover", 1)
        .cache_mount(&cache)
        .unwrap();

    assert!(cache.is_dir());
    assert_eq!(mount.container_path(), std::path::Path::new("/home/rover/cache"));
    assert!(mount.mount_string().ends_with(":/home/rover/cache:rw"));
}

// ── Fetch image ──────────────────────────────────────────────────────

#[test]
fn missing_fetch_image_reported_without_pull_source() {
    let backend = FakeFetchBackend {
        missing_image: true,
        ..FakeFetchBackend::default()
    };
    let err = FetchOrchestrator::new(&backend, "rover", 1)
        .mount_location()
        .unwrap_err();
    assert!(matches!(err, WigwamError::ImageNotFound { .. }));
    assert!(backend.pulls.lock().unwrap().is_empty());
}

#[test]
fn missing_fetch_image_is_pulled_and_tagged() {
    let backend = FakeFetchBackend {
        missing_image: true,
        ..FakeFetchBackend::default()
    };
    let location = FetchOrchestrator::new(&backend, "rover", 1)
        .with_pull_source(Some("docker.io/org/rover:latest".into()))
        .mount_location()
        .unwrap();

    assert_eq!(location, "/home/rover/cache");
    assert_eq!(
        *backend.pulls.lock().unwrap(),
        vec![("docker.io/org/rover:latest".to_string(), "rover".to_string())]
    );
}

#[test]
fn present_fetch_image_is_not_pulled() {
    let backend = FakeFetchBackend::default();
    let image = FetchOrchestrator::new(&backend, "rover", 1)
        .with_pull_source(Some("docker.io/org/rover:latest".into()))
        .ensure_image()
        .unwrap();

    assert_eq!(image, ImageRef::new("sha256:rover"));
    assert!(backend.pulls.lock().unwrap().is_empty());
}

#[test]
fn failed_pull_is_reported() {
    let backend = FakeFetchBackend {
        missing_image: true,
        ..FakeFetchBackend::default()
    };
    let err = FetchOrchestrator::new(&backend, "rover", 1)
        .with_pull_source(Some("unreachable.example/rover".into()))
        .ensure_image()
        .unwrap_err();
    assert!(matches!(err, WigwamError::ImageNotFound { ref image } if image == "unreachable.example/rover"));
}

#[test]
fn empty_pull_source_disables_pulling() {
    let backend = FakeFetchBackend {
        missing_image: true,
        ..FakeFetchBackend::default()
    };
    assert!(
        FetchOrchestrator::new(&backend, "rover", 1)
            .with_pull_source(Some(String::new()))
            .ensure_image()
            .is_err()
    );
    assert!(backend.pulls.lock().unwrap().is_empty());
}

// ── Search and fetch ─────────────────────────────────────────────────

#[test]
fn search_results_feed_fetch() {
    let catalog = Catalog::from_json(
        r#"{"data": [
            {"name": "L0B_A", "tags": ["L0B"], "url": "u", "files": {"a": "1"}},
            {"name": "DEM", "tags": ["dem"], "url": "u", "files": {"d": "2"}}
        ]}"#,
    )
    .unwrap();
    let found = search(&catalog, &SearchQuery::by_tags([["L0B"]])).unwrap();

    let backend = FakeFetchBackend::default();
    let fetched = FetchOrchestrator::new(&backend, "rover", 4)
        .fetch(&found, &mount(), false)
        .unwrap();
    assert_eq!(fetched, vec!["L0B_A"]);
}
