//! Concurrent fetching of catalog items into a cache mount.
//!
//! Each item becomes one [`FetchJob`] run by the fetch tool inside the fetch
//! image. Jobs are pulled by a bounded pool of scoped worker threads. The
//! first failure stops dispatch of further jobs and is returned to the caller.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use wigwam_common::error::{Result, WigwamError};
use wigwam_common::types::ImageRef;
use wigwam_core::mount::BindMount;
use wigwam_core::scratch::ensure_dir;
use wigwam_image::backend::{ImageBackend, RunRequest};

use crate::catalog::CatalogItem;

/// Fetch of one data repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchJob {
    /// Repository name.
    pub repo: String,
    /// Source URL.
    pub url: String,
    /// File names mapped to their hashes.
    pub files: BTreeMap<String, String>,
    /// Refetch even if the cache already holds the files.
    pub no_cache: bool,
}

impl FetchJob {
    /// Creates a job for a catalog item.
    #[must_use]
    pub fn from_item(item: &CatalogItem, no_cache: bool) -> Self {
        Self {
            repo: item.name.clone(),
            url: item.url.clone(),
            files: item.files.clone(),
            no_cache,
        }
    }

    /// Returns the fetch tool invocation as a shell command.
    #[must_use]
    pub fn command(&self) -> String {
        let mut args: Vec<String> = ["python", "-m", "rover", "fetch", "--repo"]
            .into_iter()
            .map(String::from)
            .collect();
        args.push(self.repo.clone());
        args.push("--url".into());
        args.push(self.url.clone());
        if self.no_cache {
            args.push("--no-cache".into());
        }
        args.push("-f".into());
        args.extend(
            self.files
                .iter()
                .map(|(file, hash)| format!("{file}={hash}")),
        );
        args.iter()
            .map(|arg| shell_quote(arg))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Quotes `arg` for `bash -c` unless it only contains safe characters.
fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Runs fetch jobs in the fetch image.
pub struct FetchOrchestrator<'a> {
    backend: &'a dyn ImageBackend,
    image: String,
    pull_source: Option<String>,
    workers: usize,
}

impl<'a> FetchOrchestrator<'a> {
    /// Creates an orchestrator using `image` and at most `workers` threads.
    #[must_use]
    pub fn new(backend: &'a dyn ImageBackend, image: impl Into<String>, workers: usize) -> Self {
        Self {
            backend,
            image: image.into(),
            pull_source: None,
            workers: workers.max(1),
        }
    }

    /// Sets the registry reference pulled when the fetch image is missing.
    #[must_use]
    pub fn with_pull_source(mut self, source: Option<String>) -> Self {
        self.pull_source = source.filter(|s| !s.is_empty());
        self
    }

    /// Returns the fetch image, pulling it first if it is not present.
    ///
    /// # Errors
    ///
    /// Returns `ImageNotFound` if the image is missing and no pull source is
    /// set, or the pull error.
    pub fn ensure_image(&self) -> Result<ImageRef> {
        match (self.backend.image_id(&self.image), self.pull_source.as_deref()) {
            (Err(WigwamError::ImageNotFound { .. }), Some(source)) => {
                tracing::info!(image = %self.image, source, "fetch image not found, pulling");
                self.backend.pull(source, &self.image)
            }
            (found, _) => found,
        }
    }

    /// Asks the fetch image where it expects the cache to be mounted.
    ///
    /// # Errors
    ///
    /// Returns `ImageNotFound` if the fetch image is missing and cannot be
    /// pulled, or the run error.
    pub fn mount_location(&self) -> Result<String> {
        let _ = self.ensure_image()?;
        let output = self
            .backend
            .run_checked(&RunRequest::new(&self.image, "echo $MOUNT_LOCATION"))?;
        let location = output.stdout.trim().to_string();
        if location.is_empty() {
            return Err(WigwamError::Config {
                message: format!("image {} does not define MOUNT_LOCATION", self.image),
            });
        }
        Ok(location)
    }

    /// Creates the host cache directory and mounts it read-write at the
    /// image's mount location.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be created or the mount location
    /// cannot be queried.
    pub fn cache_mount(&self, cache_dir: &Path) -> Result<BindMount> {
        let host = ensure_dir(cache_dir)?;
        let location = self.mount_location()?;
        Ok(BindMount::read_write(host, location))
    }

    /// Fetches every item into `mount`, returning the fetched repository
    /// names in item order.
    ///
    /// # Errors
    ///
    /// Returns `WigwamError::FetchFailed` for the first job that fails. Jobs
    /// already running finish; no new jobs start.
    pub fn fetch(&self, items: &[&CatalogItem], mount: &BindMount, no_cache: bool) -> Result<Vec<String>> {
        let jobs: Vec<FetchJob> = items
            .iter()
            .map(|item| FetchJob::from_item(item, no_cache))
            .collect();
        self.run_jobs(&jobs, mount)?;
        Ok(jobs.into_iter().map(|job| job.repo).collect())
    }

    fn run_jobs(&self, jobs: &[FetchJob], mount: &BindMount) -> Result<()> {
        if jobs.is_empty() {
            return Ok(());
        }

        let next = AtomicUsize::new(0);
        let first_err: Mutex<Option<WigwamError>> = Mutex::new(None);
        let workers = self.workers.min(jobs.len());
        tracing::info!(jobs = jobs.len(), workers, "fetching data repositories");

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let _ = scope.spawn(|| {
                    loop {
                        if first_err.lock().map_or(true, |err| err.is_some()) {
                            break;
                        }
                        let idx = next.fetch_add(1, Ordering::SeqCst);
                        let Some(job) = jobs.get(idx) else { break };
                        if let Err(err) = self.run_job(job, mount) {
                            tracing::error!(repo = %job.repo, error = %err, "fetch failed");
                            if let Ok(mut slot) = first_err.lock() {
                                if slot.is_none() {
                                    *slot = Some(err);
                                }
                            }
                            break;
                        }
                    }
                });
            }
        });

        match first_err.into_inner().unwrap_or_else(std::sync::PoisonError::into_inner) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn run_job(&self, job: &FetchJob, mount: &BindMount) -> Result<()> {
        tracing::info!(repo = %job.repo, url = %job.url, "fetching");
        let request = RunRequest::new(&self.image, job.command())
            .with_mounts(vec![mount.clone()])
            .with_host_user(true);
        let output = self.backend.run(&request)?;
        if output.success() {
            tracing::info!(repo = %job.repo, "fetched");
            Ok(())
        } else {
            Err(WigwamError::FetchFailed {
                repo: job.repo.clone(),
                diagnostic: output.stderr,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> CatalogItem {
        CatalogItem {
            name: "L0B_RRST_A".into(),
            tags: std::collections::BTreeSet::new(),
            url: "https://example.org/data/a".into(),
            files: BTreeMap::from([
                ("a.h5".to_string(), "abc".to_string()),
                ("b.txt".to_string(), "def".to_string()),
            ]),
        }
    }

    #[test]
    fn command_lists_files_after_flag() {
        let job = FetchJob::from_item(&item(), false);
        assert_eq!(
            job.command(),
            "python -m rover fetch --repo L0B_RRST_A --url https://example.org/data/a \
             -f a.h5=abc b.txt=def"
        );
    }

    #[test]
    fn command_with_no_cache() {
        let job = FetchJob::from_item(&item(), true);
        assert!(job.command().contains(" --no-cache -f "));
    }

    #[test]
    fn unsafe_arguments_are_quoted() {
        assert_eq!(shell_quote("plain-name_1.h5"), "plain-name_1.h5");
        assert_eq!(shell_quote("has space"), "'has space'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("$HOME"), "'$HOME'");
    }
}
