//! Planner for seeding newly declared clusters.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::warn;

use super::{Kind, Promotion, Results};
use crate::clusterconf::{ClusterDetection, Clusters};
use crate::detect::{Detect, WorkloadChange};
use crate::environment::Env;
use crate::forge::Commit;
use crate::kustomization;
use crate::promoter::PromoteError;

/// Promotes every workload of the previous environment onto clusters that
/// are declared in the configuration but missing from the worktree.
///
/// After the manifests are copied, each new cluster's config folder is
/// seeded with one placeholder config file per workload and a skeleton
/// kustomization. There is no provenance and there are no assignees: the
/// trigger is a configuration change, not a manifest change.
pub struct NewClusterPromotion {
    env: Env,
    clusters: ClusterDetection,
    detect: Arc<Detect>,
    worktree: PathBuf,
    assignees: Vec<String>,
    source_commits: Vec<Commit>,
}

impl NewClusterPromotion {
    #[must_use]
    pub fn new(
        env: Env,
        detect: Arc<Detect>,
        clusters: ClusterDetection,
        worktree: PathBuf,
    ) -> Self {
        Self {
            env,
            clusters,
            detect,
            worktree,
            assignees: Vec::new(),
            source_commits: Vec::new(),
        }
    }
}

impl Promotion for NewClusterPromotion {
    fn changes(&self) -> Result<(Vec<WorkloadChange>, Clusters), PromoteError> {
        if self.clusters.new.is_empty() {
            return Ok((Vec::new(), Clusters::default()));
        }

        let changes = self
            .detect
            .new_cluster_workloads(self.env, &self.clusters.previous_env)?;

        Ok((changes, self.clusters.new.clone()))
    }

    fn after_changes(&self, results: &Results, clusters: &Clusters) -> Result<(), PromoteError> {
        if let Err(err) = kustomization::seed_cluster_config(
            &self.worktree,
            clusters,
            &results.workloads_per_cluster(),
        ) {
            warn!("error writing configuration for new cluster: {err}");
        }
        Ok(())
    }

    fn kind(&self) -> Kind {
        Kind::NewCluster
    }

    fn assignees(&self) -> &[String] {
        &self.assignees
    }

    fn source_commits(&self) -> &[Commit] {
        &self.source_commits
    }
}
