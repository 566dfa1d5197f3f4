//! Promotion planners.
//!
//! Two promotion kinds share one execution pipeline: a *manifest update*
//! promotes the workloads a commit range touched onto the existing clusters,
//! and a *new cluster* promotion seeds newly declared clusters with every
//! workload of the previous environment. The [`Promotion`] trait is the
//! contract the orchestrator runs either through.

use std::collections::BTreeMap;

use crate::clusterconf::Clusters;
use crate::detect::WorkloadChange;
use crate::forge::Commit;
use crate::promoter::PromoteError;

pub mod manifest_update;
pub mod new_cluster;

pub use manifest_update::ManifestUpdate;
pub use new_cluster::NewClusterPromotion;

/// Logged when a commit range yields no change matching the source
/// environment.
pub const NO_CHANGES_MSG: &str =
    "No detected changes match our source environment. Not taking any action";

/// Why a promotion is happening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    ManifestUpdate,
    NewCluster,
}

impl Kind {
    /// Wire name of the promotion kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ManifestUpdate => "manifests_updated",
            Self::NewCluster => "new_cluster_detected",
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What was promoted where: `cluster -> workload -> change`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Results(BTreeMap<String, BTreeMap<String, WorkloadChange>>);

impl Results {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `workload` was promoted to `cluster`.
    pub fn record(&mut self, cluster: &str, workload: &str, change: WorkloadChange) {
        self.0
            .entry(cluster.to_string())
            .or_default()
            .insert(workload.to_string(), change);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `workload` was promoted to `cluster`.
    #[must_use]
    pub fn contains(&self, cluster: &str, workload: &str) -> bool {
        self.0
            .get(cluster)
            .is_some_and(|workloads| workloads.contains_key(workload))
    }

    /// Names of the clusters that received a promotion, sorted.
    #[must_use]
    pub fn cluster_names(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    /// Names of the promoted workloads across all clusters, sorted.
    #[must_use]
    pub fn workload_names(&self) -> Vec<String> {
        let names: std::collections::BTreeSet<String> = self
            .0
            .values()
            .flat_map(|workloads| workloads.keys().cloned())
            .collect();
        names.into_iter().collect()
    }

    /// Per-cluster sorted workload names.
    #[must_use]
    pub fn workloads_per_cluster(&self) -> BTreeMap<String, Vec<String>> {
        self.0
            .iter()
            .map(|(cluster, workloads)| (cluster.clone(), workloads.keys().cloned().collect()))
            .collect()
    }
}

/// One promotion kind's plan: which changes to apply to which clusters, and
/// what to do once the worktree has been mutated.
pub trait Promotion {
    /// The changes to apply and the clusters to apply them to. An empty
    /// cluster set means the promotion has nothing to do.
    ///
    /// # Errors
    ///
    /// Fails when the plan cannot be derived.
    fn changes(&self) -> Result<(Vec<WorkloadChange>, Clusters), PromoteError>;

    /// Hook run after the worktree mutation of one cluster group, before the
    /// commit.
    ///
    /// # Errors
    ///
    /// Fails when the hook cannot complete.
    fn after_changes(&self, results: &Results, clusters: &Clusters) -> Result<(), PromoteError>;

    /// The promotion kind.
    fn kind(&self) -> Kind;

    /// Assignees for the pull request.
    fn assignees(&self) -> &[String];

    /// Provenance carried into the commit message and description.
    fn source_commits(&self) -> &[Commit];
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Operation, Workload};

    fn change(name: &str) -> WorkloadChange {
        WorkloadChange {
            op: Operation::Copy,
            workload: Workload {
                source_env: "development".to_string(),
                name: name.to_string(),
            },
        }
    }

    fn fixture() -> Results {
        let mut results = Results::new();
        results.record("dev2", "foo", change("foo"));
        results.record("dev1", "zoo", change("zoo"));
        results.record("dev1", "foo", change("foo"));
        results
    }

    #[test]
    fn cluster_names_are_sorted() {
        assert_eq!(fixture().cluster_names(), ["dev1", "dev2"]);
    }

    #[test]
    fn workload_names_are_distinct_and_sorted() {
        assert_eq!(fixture().workload_names(), ["foo", "zoo"]);
    }

    #[test]
    fn workloads_per_cluster_groups_sorted_names() {
        let per_cluster = fixture().workloads_per_cluster();
        assert_eq!(per_cluster["dev1"], ["foo", "zoo"]);
        assert_eq!(per_cluster["dev2"], ["foo"]);
    }

    #[test]
    fn contains_reports_recorded_promotions() {
        let results = fixture();
        assert!(results.contains("dev1", "zoo"));
        assert!(!results.contains("dev2", "zoo"));
    }
}
