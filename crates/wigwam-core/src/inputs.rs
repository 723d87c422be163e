//! Resolution of workflow test inputs.
//!
//! A test names the data repositories it needs. The user may point at them
//! with `[PATH]` or `[LABEL]:[PATH]` arguments; anything still missing is
//! looked up by name in the cache directories.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use wigwam_common::error::{Result, WigwamError};

/// Input paths supplied on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SuppliedInputs {
    /// Nothing supplied; everything comes from the caches.
    #[default]
    None,
    /// A single path without a label.
    Unlabeled(PathBuf),
    /// `(label, path)` pairs in the order given.
    Labeled(Vec<(String, PathBuf)>),
}

/// Parses `[PATH]` and `[LABEL]:[PATH]` arguments.
///
/// An unlabeled path is only accepted as the sole argument.
///
/// # Errors
///
/// Returns `MalformedInputArgument` for empty arguments or arguments with
/// more than one `:`, and `AmbiguousInputMapping` when an unlabeled path is
/// mixed with other arguments or a label repeats.
pub fn parse_input_args<S: AsRef<str>>(args: &[S]) -> Result<SuppliedInputs> {
    let mut labeled = Vec::with_capacity(args.len());
    let mut seen = BTreeSet::new();

    for arg in args {
        let raw = arg.as_ref().trim();
        if raw.is_empty() {
            return Err(WigwamError::MalformedInputArgument {
                value: arg.as_ref().to_string(),
            });
        }
        let parts: Vec<&str> = raw.split(':').collect();
        match parts.as_slice() {
            [path] => {
                if args.len() != 1 {
                    return Err(WigwamError::AmbiguousInputMapping {
                        message: format!(
                            "unlabeled input {path} is only allowed as the sole input argument"
                        ),
                    });
                }
                return Ok(SuppliedInputs::Unlabeled(PathBuf::from(path)));
            }
            [label, path] if !label.is_empty() && !path.is_empty() => {
                if !seen.insert((*label).to_string()) {
                    return Err(WigwamError::AmbiguousInputMapping {
                        message: format!("label {label} supplied more than once"),
                    });
                }
                labeled.push(((*label).to_string(), PathBuf::from(path)));
            }
            _ => {
                return Err(WigwamError::MalformedInputArgument {
                    value: arg.as_ref().to_string(),
                });
            }
        }
    }

    if labeled.is_empty() {
        Ok(SuppliedInputs::None)
    } else {
        Ok(SuppliedInputs::Labeled(labeled))
    }
}

/// Repositories a test needs and the labels that refer to them.
///
/// Every repository is also a label for itself.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InputRequirements {
    required: Vec<String>,
    labels: BTreeMap<String, String>,
}

impl InputRequirements {
    /// Requirements for unlabeled repositories.
    #[must_use]
    pub fn from_repos<I, S>(repos: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut requirements = Self::default();
        for repo in repos {
            requirements.add(None, repo.into());
        }
        requirements
    }

    /// Requirements for `(label, repo)` pairs.
    #[must_use]
    pub fn from_labeled<I, L, R>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (L, R)>,
        L: Into<String>,
        R: Into<String>,
    {
        let mut requirements = Self::default();
        for (label, repo) in pairs {
            requirements.add(Some(label.into()), repo.into());
        }
        requirements
    }

    fn add(&mut self, label: Option<String>, repo: String) {
        if let Some(label) = label {
            let _ = self.labels.insert(label, repo.clone());
        }
        let _ = self.labels.insert(repo.clone(), repo.clone());
        if !self.required.contains(&repo) {
            self.required.push(repo);
        }
    }

    /// Returns the required repositories in declaration order.
    #[must_use]
    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// Returns the repository a label refers to.
    #[must_use]
    pub fn repo_for_label(&self, label: &str) -> Option<&str> {
        self.labels.get(label).map(String::as_str)
    }
}

/// Maps every required repository to a host path.
///
/// Supplied inputs are consumed first. Remaining repositories are searched
/// for as `<cache_dir>/<repo>` directories, in cache order, stopping once
/// everything is found.
///
/// # Errors
///
/// - `AmbiguousInputMapping` if an unlabeled path is given while the test
///   needs other than exactly one repository, or a repository is supplied twice.
/// - `UnknownInputLabel` if a label matches no required repository.
/// - `RequiredRepositoryNotFound` if repositories remain unresolved.
pub fn resolve_inputs(
    requirements: &InputRequirements,
    supplied: &SuppliedInputs,
    cache_dirs: &[PathBuf],
) -> Result<BTreeMap<String, PathBuf>> {
    let mut resolved = BTreeMap::new();

    match supplied {
        SuppliedInputs::Unlabeled(path) => {
            return match requirements.required() {
                [repo] => {
                    let _ = resolved.insert(repo.clone(), path.clone());
                    Ok(resolved)
                }
                required => Err(WigwamError::AmbiguousInputMapping {
                    message: format!(
                        "unlabeled input {} given but {} repositories are required",
                        path.display(),
                        required.len()
                    ),
                }),
            };
        }
        SuppliedInputs::Labeled(pairs) => {
            for (label, path) in pairs {
                let repo = requirements.repo_for_label(label).ok_or_else(|| {
                    WigwamError::UnknownInputLabel {
                        label: label.clone(),
                    }
                })?;
                if resolved.contains_key(repo) {
                    return Err(WigwamError::AmbiguousInputMapping {
                        message: format!("repository {repo} referenced twice"),
                    });
                }
                tracing::debug!(label = %label, repo = %repo, path = %path.display(), "input supplied");
                let _ = resolved.insert(repo.to_string(), path.clone());
            }
        }
        SuppliedInputs::None => {}
    }

    let mut missing: Vec<&String> = requirements
        .required()
        .iter()
        .filter(|repo| !resolved.contains_key(*repo))
        .collect();

    for cache_dir in cache_dirs {
        if missing.is_empty() {
            break;
        }
        missing.retain(|repo| {
            let candidate = cache_dir.join(repo);
            if is_repo_dir(&candidate) {
                tracing::debug!(repo = %repo, path = %candidate.display(), "input found in cache");
                let _ = resolved.insert((*repo).clone(), candidate);
                false
            } else {
                true
            }
        });
    }

    if missing.is_empty() {
        Ok(resolved)
    } else {
        Err(WigwamError::RequiredRepositoryNotFound {
            repos: missing.into_iter().cloned().collect(),
        })
    }
}

fn is_repo_dir(path: &Path) -> bool {
    path.is_dir()
}
