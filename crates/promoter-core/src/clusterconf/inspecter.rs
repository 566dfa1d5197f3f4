//! Cluster classification against the checked-out worktree.
//!
//! The git tree is the source of truth for which clusters already exist; the
//! configuration document declares which clusters should exist. A declared
//! cluster whose manifest folder is missing on disk is new.

use std::io::ErrorKind;
use std::path::PathBuf;

use tracing::debug;

use super::{Clusters, ConfigError};
use crate::environment::Env;
use crate::filesystem;

/// Cohorts of the declared clusters for one promotion run.
#[derive(Debug, Clone, Default)]
pub struct ClusterDetection {
    /// Every declared cluster, in document order.
    pub all: Clusters,
    /// Target-environment clusters missing from the worktree.
    pub new: Clusters,
    /// Target-environment clusters present in the worktree.
    pub existing: Clusters,
    /// Clusters of the environment feeding the target.
    pub previous_env: Clusters,
}

/// Probes the worktree to classify declared clusters.
pub struct ClusterInspecter {
    worktree: PathBuf,
}

impl ClusterInspecter {
    #[must_use]
    pub fn new(worktree: impl Into<PathBuf>) -> Self {
        Self {
            worktree: worktree.into(),
        }
    }

    /// Classifies `all` with respect to `target_env`.
    ///
    /// # Errors
    ///
    /// Fails when a manifest folder cannot be probed for a reason other than
    /// absence.
    pub fn detect(&self, all: Clusters, target_env: Env) -> Result<ClusterDetection, ConfigError> {
        let in_environment = all.by_environment(target_env.as_str());
        let new = self.new_clusters(&in_environment)?;
        let existing = in_environment.without(&new);
        let previous_env = match target_env.manifest_source() {
            Ok(source) => all.by_environment(source.as_str()),
            Err(_) => Clusters::default(),
        };

        debug!(
            new = new.len(),
            existing = existing.len(),
            previous_env = previous_env.len(),
            "classified clusters"
        );

        Ok(ClusterDetection {
            all,
            new,
            existing,
            previous_env,
        })
    }

    fn new_clusters(&self, declared: &Clusters) -> Result<Clusters, ConfigError> {
        let mut missing_on_disk = Vec::new();
        for cluster in declared {
            let folder = filesystem::resolve(&self.worktree, cluster.manifest_folder());
            match std::fs::metadata(&folder) {
                Ok(_) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    missing_on_disk.push(cluster.clone());
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(Clusters::new(missing_on_disk))
    }
}
