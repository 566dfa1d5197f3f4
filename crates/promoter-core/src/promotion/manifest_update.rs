//! Planner for promoting edited manifests onto existing clusters.

use std::sync::Arc;

use tracing::{debug, info};

use super::{Kind, Promotion, Results, NO_CHANGES_MSG};
use crate::clusterconf::{ClusterDetection, Clusters};
use crate::detect::{Detect, DetectError, WorkloadChange};
use crate::environment::Env;
use crate::forge::Commit;
use crate::promoter::PromoteError;
use crate::repo::ManifestRepository;

/// Promotes the workloads whose manifests changed in the commit range.
///
/// Only changes observed in the target's source environment are promoted;
/// the rest of the diff is dropped. Provenance comes from the forge compare
/// endpoint when promoting to development, and from `Source-commit:`
/// trailers written by prior promotions otherwise.
pub struct ManifestUpdate {
    env: Env,
    source_commits: Vec<Commit>,
    assignees: Vec<String>,
    clusters: ClusterDetection,
    detect: Arc<Detect>,
}

impl ManifestUpdate {
    /// Builds the planner, resolving provenance and assignees up front.
    ///
    /// # Errors
    ///
    /// Fails when provenance or the assignee probe fails.
    pub fn new(
        env: Env,
        repo: &ManifestRepository,
        detect: Arc<Detect>,
        clusters: ClusterDetection,
    ) -> Result<Self, PromoteError> {
        let source_commits = if env == Env::Development {
            debug!("promoting to development: finding authors from the forge");
            let range = detect.commit_range();
            repo.get_commits(&range.from_prefix, &range.to_prefix)?
        } else {
            debug!(
                "promoting to {env}: finding source manifest authors and commits from commit messages"
            );
            detect.source_commits()?
        };

        let assignees = repo.pull_request_assignees(&source_commits)?;

        Ok(Self {
            env,
            source_commits,
            assignees,
            clusters,
            detect,
        })
    }

    fn changes_from_previous_env(
        &self,
        changes: Vec<WorkloadChange>,
    ) -> Result<Vec<WorkloadChange>, PromoteError> {
        let manifest_source = self.env.manifest_source()?;

        let mut selected = Vec::new();
        for change in changes {
            if change.workload.source_env == manifest_source.as_str() {
                selected.push(change);
            } else {
                info!(
                    "dropping change '{} {}' as the source '{}' is not '{}'",
                    change.op.as_str().to_lowercase(),
                    change.workload.name,
                    change.workload.source_env,
                    manifest_source,
                );
            }
        }
        Ok(selected)
    }
}

impl Promotion for ManifestUpdate {
    fn changes(&self) -> Result<(Vec<WorkloadChange>, Clusters), PromoteError> {
        let workload_changes = match self.detect.workload_changes() {
            Ok(changes) => changes,
            Err(DetectError::NoChange { .. }) => Vec::new(),
            Err(err) => return Err(err.into()),
        };

        let selected = self.changes_from_previous_env(workload_changes)?;

        if selected.is_empty() {
            info!(
                promotion_type = %self.kind(),
                target_env = %self.env,
                "{NO_CHANGES_MSG}"
            );
            return Ok((Vec::new(), Clusters::default()));
        }

        Ok((selected, self.clusters.existing.clone()))
    }

    fn after_changes(&self, _results: &Results, _clusters: &Clusters) -> Result<(), PromoteError> {
        debug!("nothing to do");
        Ok(())
    }

    fn kind(&self) -> Kind {
        Kind::ManifestUpdate
    }

    fn assignees(&self) -> &[String] {
        &self.assignees
    }

    fn source_commits(&self) -> &[Commit] {
        &self.source_commits
    }
}
