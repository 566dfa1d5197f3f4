//! Change inference over a commit range.
//!
//! From a pair of git trees, deduce the set of `(workload, operation)`
//! tuples, derive the workload set for newly declared clusters, and harvest
//! source-commit provenance from commit message trailers.

use std::collections::BTreeSet;
use std::sync::Arc;

use regex::Regex;
use thiserror::Error;
use tracing::info;

use crate::clusterconf::{
    Clusters, ConfigError, FsWorkloadRegistry, WorkloadRegistry,
};
use crate::environment::{Env, EnvironmentError};
use crate::filesystem::{self, FsError};
use crate::forge::Commit;
use crate::git::{CommitRange, GitError, Workspace};

pub mod change;
pub mod convention;
pub mod infer;

pub use change::{distinct, Operation, Workload, WorkloadChange};
pub use convention::{classify, PathClass};
pub use infer::Inferer;

const SOURCE_COMMIT_PATTERN: &str = r"Source-commit: (\S+) A:(\S+) C:([^\r\n]+)";

/// Errors raised while inferring changes.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DetectError {
    /// The commit range touches no workload.
    #[error("from: {from}, to: {to}: no change detected")]
    NoChange {
        /// Start of the range.
        from: String,
        /// End of the range.
        to: String,
    },

    /// A path under `flux/manifests` is too shallow to name a workload file.
    #[error("path: {path}: unknown path convention")]
    UnknownPathConvention {
        /// The offending path.
        path: String,
    },

    /// Git plumbing failed.
    #[error(transparent)]
    Git(#[from] GitError),

    /// The target environment has no source.
    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    /// Workload metadata could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A previous-environment manifest folder could not be listed.
    #[error(transparent)]
    Filesystem(#[from] FsError),
}

/// Derives workload changes and provenance for one commit range.
pub struct Detect {
    ws: Arc<Workspace>,
    registry: Arc<FsWorkloadRegistry>,
    commit_range: CommitRange,
    inferer: Inferer,
}

impl Detect {
    #[must_use]
    pub fn new(
        ws: Arc<Workspace>,
        commit_range: CommitRange,
        registry: Arc<FsWorkloadRegistry>,
    ) -> Self {
        let inferer = Inferer::new(Arc::clone(&ws), commit_range.to_prefix.clone());
        Self {
            ws,
            registry,
            commit_range,
            inferer,
        }
    }

    /// The commit range this run promotes.
    #[must_use]
    pub fn commit_range(&self) -> &CommitRange {
        &self.commit_range
    }

    /// Infers the deduplicated, name-sorted workload changes between the two
    /// trees of the commit range.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError::NoChange`] when no workload is affected, and
    /// propagates revision resolution, diff, and path convention failures.
    pub fn workload_changes(&self) -> Result<Vec<WorkloadChange>, DetectError> {
        let from = self.ws.resolve_revision(&self.commit_range.from_prefix)?;
        let to = self.ws.resolve_revision(&self.commit_range.to_prefix)?;

        let mut changes = Vec::new();
        for entry in self.ws.diff(&from, &to)? {
            changes.extend(self.inferer.workload_changes(&entry)?);
        }

        let changes = distinct(changes);
        if changes.is_empty() {
            return Err(DetectError::NoChange {
                from: self.commit_range.from_prefix.clone(),
                to: self.commit_range.to_prefix.clone(),
            });
        }

        Ok(changes)
    }

    /// Derives the workloads to seed a new cluster with.
    ///
    /// For development the source manifests are authoritative; for test and
    /// production the set of workload directories already promoted to the
    /// previous environment is.
    ///
    /// # Errors
    ///
    /// Fails when the target has no source environment or a previous-env
    /// manifest folder cannot be listed.
    pub fn new_cluster_workloads(
        &self,
        target_env: Env,
        previous_env_clusters: &Clusters,
    ) -> Result<Vec<WorkloadChange>, DetectError> {
        let source = target_env.manifest_source()?;

        if target_env == Env::Development {
            return self.from_manifest_source(source);
        }

        self.from_clusters_in_previous_env(source, previous_env_clusters)
    }

    fn from_manifest_source(&self, source_env: Env) -> Result<Vec<WorkloadChange>, DetectError> {
        let workloads = self.registry.get_all()?;

        Ok(workloads
            .iter()
            .map(|workload| {
                WorkloadChange::copy(Workload {
                    source_env: source_env.as_str().to_string(),
                    name: workload.name().to_string(),
                })
            })
            .collect())
    }

    fn from_clusters_in_previous_env(
        &self,
        source_env: Env,
        previous_env_clusters: &Clusters,
    ) -> Result<Vec<WorkloadChange>, DetectError> {
        let mut promoted_workloads = BTreeSet::new();
        for cluster in previous_env_clusters {
            let names = filesystem::dirs_in_dir(self.ws.root(), cluster.manifest_folder())?;
            promoted_workloads.extend(names);
        }

        Ok(promoted_workloads
            .into_iter()
            .map(|name| {
                WorkloadChange::copy(Workload {
                    source_env: source_env.as_str().to_string(),
                    name,
                })
            })
            .collect())
    }

    /// Harvests `Source-commit:` trailers from the non-merge commits of the
    /// range, newest first.
    ///
    /// These trailers are written by prior promotions; they carry the
    /// original authorship that the hosted diff no longer exposes once a
    /// change is more than one environment away from its source.
    ///
    /// # Errors
    ///
    /// Fails when the range revisions do not resolve or the log fails.
    pub fn source_commits(&self) -> Result<Vec<Commit>, DetectError> {
        let from = self.ws.resolve_revision(&self.commit_range.from_prefix)?;
        let to = self.ws.resolve_revision(&self.commit_range.to_prefix)?;

        info!("Searching for source commit tags in range {from}...{to}");

        let regex = Regex::new(SOURCE_COMMIT_PATTERN).expect("source-commit pattern compiles");

        let mut source_commits = Vec::new();
        for commit in self.ws.log_messages(&from, &to)? {
            let matches: Vec<_> = regex.captures_iter(&commit.message).collect();
            info!(
                "Found commit {} with {} source commits",
                commit.hash,
                matches.len()
            );
            for captures in matches {
                source_commits.push(Commit {
                    hash: captures[1].to_string(),
                    author_login: captures[2].to_string(),
                    committer_login: captures[3].to_string(),
                });
            }
        }

        Ok(source_commits)
    }
}
