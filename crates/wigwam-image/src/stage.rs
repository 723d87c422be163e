//! Build stage graph using `petgraph`.
//!
//! Each stage produces one tagged image from a base image. An edge runs from
//! the stage producing a tag to every stage using that tag as its base, so a
//! topological sort yields a valid build order.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;

use petgraph::graph::{DiGraph, NodeIndex};
use regex::Regex;
use wigwam_common::error::{Result, WigwamError};
use wigwam_common::types::ImageTag;

use crate::setup::{CudaVersion, EnvFile, ImageProfile};

static GITHUB_REPO: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9-]+/[a-zA-Z0-9-]+$").ok());

/// A validated GitHub `user/repo` identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GitRepo(String);

impl GitRepo {
    /// Validates a repository identifier.
    ///
    /// # Errors
    ///
    /// Returns `WigwamError::MalformedRepoIdentifier` unless `repo` has the
    /// form `user/repo` with alphanumerics and dashes on both sides.
    pub fn parse(repo: &str) -> Result<Self> {
        let valid = GITHUB_REPO
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(repo));
        if valid {
            Ok(Self(repo.to_string()))
        } else {
            Err(WigwamError::MalformedRepoIdentifier {
                repo: repo.to_string(),
            })
        }
    }

    /// Returns the `user/repo` string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the repository part of the identifier.
    #[must_use]
    pub fn name(&self) -> &str {
        self.0.split_once('/').map_or(self.0.as_str(), |(_, name)| name)
    }
}

impl fmt::Display for GitRepo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a stage does to its base image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageKind {
    /// Clone a GitHub repository.
    Clone {
        /// Repository to clone.
        repo: GitRepo,
        /// Branch to check out, default branch if `None`.
        branch: Option<String>,
    },
    /// Copy a host directory into the image.
    Insert {
        /// Build context directory.
        context: PathBuf,
        /// Directory name inside the image.
        target_dir: String,
    },
    /// Configure the CMake build tree.
    Configure {
        /// CMake build type.
        build_type: String,
        /// Whether CUDA support is enabled.
        with_cuda: bool,
    },
    /// Compile the build tree.
    Compile,
    /// Install into the install prefix.
    Install,
    /// Copy an installed tree onto a fresh base.
    Distrib {
        /// Image holding the installed tree.
        source: ImageTag,
    },
    /// Add the default user and the missing base tools.
    SetupInit {
        /// Tools found on the base image.
        profile: ImageProfile,
    },
    /// Install the CUDA runtime.
    CudaRuntime {
        /// Tools found on the base image.
        profile: ImageProfile,
        /// CUDA version to install.
        version: CudaVersion,
        /// NVIDIA repository of the distribution.
        repo: String,
    },
    /// Install the CUDA compiler.
    CudaDev {
        /// Tools found on the base image.
        profile: ImageProfile,
    },
    /// Install micromamba and the runtime environment.
    CondaRuntime {
        /// Requirements file.
        env: EnvFile,
    },
    /// Install the development environment.
    CondaDev {
        /// Requirements file.
        env: EnvFile,
    },
}

impl StageKind {
    /// Returns a short stage name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Clone { .. } => "clone",
            Self::Insert { .. } => "insert",
            Self::Configure { .. } => "configure",
            Self::Compile => "compile",
            Self::Install => "install",
            Self::Distrib { .. } => "distrib",
            Self::SetupInit { .. } => "setup-init",
            Self::CudaRuntime { .. } => "cuda-runtime",
            Self::CudaDev { .. } => "cuda-dev",
            Self::CondaRuntime { .. } => "conda-runtime",
            Self::CondaDev { .. } => "conda-dev",
        }
    }
}

/// One step of a staged build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStage {
    /// What the stage does.
    pub kind: StageKind,
    /// Image the stage builds on.
    pub base: ImageTag,
    /// Tag of the image the stage produces.
    pub produces: ImageTag,
}

/// Directed graph of build stages keyed by produced tag.
#[derive(Debug, Default)]
pub struct StageGraph {
    graph: DiGraph<BuildStage, ()>,
    by_tag: HashMap<ImageTag, NodeIndex>,
}

impl StageGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a stage, linking it to already added stages.
    ///
    /// # Errors
    ///
    /// Returns `WigwamError::Config` if another stage already produces the
    /// same tag.
    pub fn add_stage(&mut self, stage: BuildStage) -> Result<NodeIndex> {
        if self.by_tag.contains_key(&stage.produces) {
            return Err(WigwamError::Config {
                message: format!("two stages produce {}", stage.produces),
            });
        }

        let produces = stage.produces.clone();
        let base = stage.base.clone();
        let idx = self.graph.add_node(stage);

        if let Some(&parent) = self.by_tag.get(&base) {
            let _ = self.graph.add_edge(parent, idx, ());
        }
        let children: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&other| other != idx && self.graph[other].base == produces)
            .collect();
        for child in children {
            let _ = self.graph.add_edge(idx, child, ());
        }

        let _ = self.by_tag.insert(produces, idx);
        Ok(idx)
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns whether the graph has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Returns the stages in build order, bases first.
    ///
    /// # Errors
    ///
    /// Returns `WigwamError::Config` if the stages form a cycle.
    pub fn build_order(&self) -> Result<Vec<&BuildStage>> {
        petgraph::algo::toposort(&self.graph, None)
            .map(|indices| indices.into_iter().map(|idx| &self.graph[idx]).collect())
            .map_err(|_cycle| WigwamError::Config {
                message: "cyclic dependency detected between build stages".into(),
            })
    }
}
