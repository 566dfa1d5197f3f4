//! The promotion orchestrator.
//!
//! Wires the clone, change inference, cluster classification, consistency
//! checking, worktree mutation, and pull request raising into one run. The
//! two promotion kinds execute sequentially: manifest updates first, then
//! new-cluster seeding.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info};

use crate::clusterconf::{
    Cluster, ClusterDetection, ClusterInspecter, Clusters, ConfigError, FsWorkloadRegistry,
    WorkloadConfig, WorkloadRegistry,
};
use crate::detect::{Detect, DetectError, Operation, WorkloadChange};
use crate::environment::{Env, EnvironmentError};
use crate::filesystem::{self, FsError};
use crate::forge::{ForgeError, ForgeProvider};
use crate::git::sign::SignError;
use crate::git::{CloneArgs, CommitRange, CommitSigner, Committer, GitError, Workspace};
use crate::kustomization;
use crate::promotion::{ManifestUpdate, NewClusterPromotion, Promotion, Results};
use crate::repo::{ManifestRepository, RepoError, RepositoryConfig};

pub mod builder;

pub use builder::{PullRequestBuilder, PR_TEMPLATE_PATH};

/// Deadline for each of the two promotion phases.
pub const PHASE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Deadline for the whole run.
pub const RUN_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Logged before surfacing a consistency failure.
pub const NOT_IN_SYNC_MSG: &str =
    "Clusters for target environment are out of sync. Not raising further PRs until this is resolved";

/// Logged when a promotion resolves to zero target clusters.
pub const NO_CLUSTERS_MSG: &str =
    "Found no clusters to promote workload to, please check clusters.yaml if you think this is an error";

/// Errors surfaced by a promotion run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PromoteError {
    /// The target environment name is not promotable.
    #[error("invalid environment name: {0}")]
    InvalidEnvironment(String),

    /// Previous-environment clusters disagree on a workload's contents.
    #[error("workload '{workload}' differs across clusters {clusters:?}: clusters not in sync")]
    ClustersNotInSync {
        /// The inconsistent workload.
        workload: String,
        /// The clusters that were compared.
        clusters: Vec<String>,
    },

    /// No previous-environment cluster can serve as the copy source.
    #[error("workload: {workload}, env: {env}: filtered clusters are zero, expected at least one")]
    NoSourceCluster {
        /// The workload being promoted.
        workload: String,
        /// The source environment searched.
        env: String,
    },

    /// The repository carries no pull request template.
    #[error("ManifestRepository is missing PR template. A template is expected at {path}")]
    MissingPrTemplate {
        /// Expected template location.
        path: String,
    },

    /// A phase ran past its deadline.
    #[error("{op}: deadline exceeded")]
    DeadlineExceeded {
        /// The operation that observed the expiry.
        op: String,
    },

    #[error(transparent)]
    Detect(#[from] DetectError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Sign(#[from] SignError),

    #[error(transparent)]
    Forge(#[from] ForgeError),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Filesystem(#[from] FsError),
}

/// A monotonic deadline checked before every external interaction.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires_at: Instant,
}

impl Deadline {
    /// A deadline `duration` from now.
    #[must_use]
    pub fn after(duration: Duration) -> Self {
        Self {
            expires_at: Instant::now() + duration,
        }
    }

    /// The earlier of this deadline and `duration` from now.
    #[must_use]
    pub fn capped(&self, duration: Duration) -> Self {
        Self {
            expires_at: self.expires_at.min(Instant::now() + duration),
        }
    }

    /// Fails once the deadline has passed.
    ///
    /// # Errors
    ///
    /// Returns [`PromoteError::DeadlineExceeded`] naming `op`.
    pub fn check(&self, op: &str) -> Result<(), PromoteError> {
        if Instant::now() >= self.expires_at {
            return Err(PromoteError::DeadlineExceeded { op: op.to_string() });
        }
        Ok(())
    }
}

/// Everything a run needs, as assembled by the CLI.
#[derive(Debug, Clone)]
pub struct Args {
    pub clone_args: CloneArgs,
    pub commit_range: CommitRange,
    pub target_env: String,

    pub config_path: String,
    pub config_repository: String,
    /// Armored PGP key for commit signing. `None` leaves commits unsigned.
    pub gpg_key_path: Option<PathBuf>,

    pub committer_name: String,
    pub committer_email: String,

    pub no_issue_users: Vec<String>,
}

/// One promotion run over a freshly cloned manifest repository.
pub struct Promoter {
    ws: Arc<Workspace>,
    repo: ManifestRepository,
    detect: Arc<Detect>,
    registry: Arc<FsWorkloadRegistry>,
    builder: PullRequestBuilder,
    clusters: ClusterDetection,
    target_env: Env,
}

impl Promoter {
    /// Clones the repository, fetches and parses the cluster configuration,
    /// and classifies the declared clusters.
    ///
    /// # Errors
    ///
    /// Fails on an invalid target environment, clone/signing-key failures,
    /// an unfetchable or invalid cluster configuration, or a missing pull
    /// request template.
    pub fn new(
        args: Args,
        forge: Arc<dyn ForgeProvider>,
        api_sleep: Duration,
    ) -> Result<Self, PromoteError> {
        let target_env = Env::promotable(&args.target_env)
            .map_err(|_| PromoteError::InvalidEnvironment(args.target_env.clone()))?;

        let ws = Arc::new(Workspace::clone(&args.clone_args)?);

        let signer = match &args.gpg_key_path {
            Some(path) => Some(CommitSigner::from_key_file(path)?),
            None => None,
        };

        let config_document =
            forge.file_contents(&args.config_repository, &args.config_path, "master")?;
        let declared = Clusters::parse(&config_document)?;

        let registry = Arc::new(FsWorkloadRegistry::new(ws.root(), "flux/manifests"));
        let detect = Arc::new(Detect::new(
            Arc::clone(&ws),
            args.commit_range.clone(),
            Arc::clone(&registry),
        ));

        let clusters = ClusterInspecter::new(ws.root()).detect(declared, target_env)?;
        let builder = PullRequestBuilder::new(ws.root(), target_env)?;

        let repo = ManifestRepository::new(
            Arc::clone(&ws),
            forge,
            RepositoryConfig {
                owner: args.clone_args.owner.clone(),
                repository: args.clone_args.repo.clone(),
                target_branch: args.clone_args.branch.clone(),
                target_ref: args.clone_args.target_ref.clone(),
            },
            Committer {
                name: args.committer_name,
                email: args.committer_email,
            },
        )
        .with_signer(signer)
        .with_no_issue_users(args.no_issue_users)
        .with_api_sleep(api_sleep);

        Ok(Self {
            ws,
            repo,
            detect,
            registry,
            builder,
            clusters,
            target_env,
        })
    }

    /// Runs the manifest-update promotion, then the new-cluster promotion.
    ///
    /// # Errors
    ///
    /// Propagates the first failure; a consistency failure is logged with
    /// [`NOT_IN_SYNC_MSG`] before it surfaces.
    pub fn promote(&self) -> Result<(), PromoteError> {
        let run_deadline = Deadline::after(RUN_TIMEOUT);

        let deadline = run_deadline.capped(PHASE_TIMEOUT);
        let manifest_update = ManifestUpdate::new(
            self.target_env,
            &self.repo,
            Arc::clone(&self.detect),
            self.clusters.clone(),
        )?;
        self.run_promotion(&deadline, &manifest_update)
            .inspect_err(|err| {
                if matches!(err, PromoteError::ClustersNotInSync { .. }) {
                    info!("{NOT_IN_SYNC_MSG}");
                }
            })?;

        let deadline = run_deadline.capped(PHASE_TIMEOUT);
        let new_cluster = NewClusterPromotion::new(
            self.target_env,
            Arc::clone(&self.detect),
            self.clusters.clone(),
            self.ws.root().to_path_buf(),
        );
        self.run_promotion(&deadline, &new_cluster)
            .inspect_err(|err| {
                if matches!(err, PromoteError::ClustersNotInSync { .. }) {
                    info!("{NOT_IN_SYNC_MSG}");
                }
            })?;

        Ok(())
    }

    fn run_promotion(
        &self,
        deadline: &Deadline,
        promotion: &dyn Promotion,
    ) -> Result<(), PromoteError> {
        info!(
            promotion_type = %promotion.kind(),
            target_env = %self.target_env,
            "Beginning promotion"
        );

        let (changes, clusters) = promotion.changes()?;

        if clusters.is_empty() {
            info!("{NO_CLUSTERS_MSG}");
            return Ok(());
        }

        for group in clusters.group(self.target_env) {
            let branch_name = self.repo.new_promote_branch()?;

            let results = self.perform_changes(deadline, &changes, &group)?;
            if results.is_empty() {
                continue;
            }

            promotion.after_changes(&results, &group)?;

            let pr = self
                .builder
                .build(&results, promotion.source_commits(), promotion.kind());
            self.repo.commit(&pr.commit_message)?;

            deadline.check("raise promotion")?;
            self.repo
                .raise_promotion(&branch_name, &pr, promotion.assignees())?;
        }
        Ok(())
    }

    /// Applies every admitted change to every cluster of the group.
    ///
    /// A cluster can exclude a workload; the result records only what was
    /// actually promoted, so the pull request covers exactly the clusters
    /// that received changes.
    fn perform_changes(
        &self,
        deadline: &Deadline,
        changes: &[WorkloadChange],
        clusters: &Clusters,
    ) -> Result<Results, PromoteError> {
        let mut results = Results::new();

        for cluster in clusters {
            let cluster_changes = self.allowed_changes(deadline, changes, cluster)?;

            for change in cluster_changes {
                let workload = self.registry.get(&change.workload.name)?;

                self.verify_workload_consistency(&workload, &change.workload.source_env)?;
                self.perform_change(deadline, cluster, change)?;

                results.record(cluster.name(), workload.name(), change.clone());
            }
        }

        Ok(results)
    }

    fn perform_change(
        &self,
        deadline: &Deadline,
        cluster: &Cluster,
        change: &WorkloadChange,
    ) -> Result<(), PromoteError> {
        deadline.check("perform change")?;

        info!(
            cluster = cluster.name(),
            environment = %self.target_env,
            workload = %change.workload.name,
            "Promoting workload to cluster"
        );

        let target_dir = cluster.workload_path(&change.workload.name);

        match change.op {
            Operation::Copy => {
                let source_dir = self.source_dir(change)?;
                debug!(
                    operation = %change.op,
                    source_dir = %source_dir,
                    target_dir = %target_dir,
                    "applying change"
                );
                filesystem::replace(self.ws.root(), &source_dir, &target_dir)?;
            }
            Operation::Remove => {
                debug!(operation = %change.op, target_dir = %target_dir, "applying change");
                let target = filesystem::resolve(self.ws.root(), &target_dir);
                std::fs::metadata(&target).map_err(FsError::Io)?;
                filesystem::remove_dir_if_exists(&target)?;
            }
        }

        kustomization::write_workload_index(self.ws.root(), cluster)?;
        Ok(())
    }

    /// The directory a copy takes its content from: the raw manifests tree
    /// when promoting to development, otherwise the first previous-env
    /// cluster (in document order) that admits the workload.
    fn source_dir(&self, change: &WorkloadChange) -> Result<String, PromoteError> {
        let manifests_source = self.target_env.manifest_source()?;

        if manifests_source == Env::SourceManifest {
            return Ok(crate::clusterconf::flux_path(&format!(
                "{}/{}",
                Env::SourceManifest.as_str(),
                change.workload.name
            )));
        }

        let workload = self.registry.get(&change.workload.name)?;
        let previous_clusters = self
            .clusters
            .all
            .allowing_workload(&workload)
            .by_environment(manifests_source.as_str());

        let Some(source_cluster) = previous_clusters.first() else {
            error!(
                workload = workload.name(),
                previous_env = %manifests_source,
                "filtered clusters are zero, expected at least one"
            );
            return Err(PromoteError::NoSourceCluster {
                workload: workload.name().to_string(),
                env: manifests_source.as_str().to_string(),
            });
        };

        Ok(source_cluster.workload_path(&change.workload.name))
    }

    /// Checks that every previous-environment cluster admitting the workload
    /// carries byte-identical manifests for it. All pull requests for an
    /// environment must be merged before promoting to the next one.
    fn verify_workload_consistency(
        &self,
        workload: &WorkloadConfig,
        manifest_source: &str,
    ) -> Result<(), PromoteError> {
        if manifest_source == Env::SourceManifest.as_str() {
            return Ok(());
        }

        let previous_clusters = self
            .clusters
            .all
            .allowing_workload(workload)
            .by_environment(manifest_source);

        let mut cluster_names = Vec::new();
        let mut hashes = std::collections::BTreeSet::new();

        for cluster in &previous_clusters {
            cluster_names.push(cluster.name().to_string());

            let workload_dir = cluster.workload_path(workload.name());
            let hash = filesystem::dir_hash(self.ws.root(), &workload_dir)?;
            hashes.insert(hash);
        }

        if hashes.len() > 1 {
            return Err(PromoteError::ClustersNotInSync {
                workload: workload.name().to_string(),
                clusters: cluster_names,
            });
        }

        Ok(())
    }

    fn allowed_changes<'a>(
        &self,
        deadline: &Deadline,
        changes: &'a [WorkloadChange],
        cluster: &Cluster,
    ) -> Result<Vec<&'a WorkloadChange>, PromoteError> {
        deadline.check("filter changes")?;

        let mut per_cluster_changes = Vec::new();
        for change in changes {
            let workload = self.registry.get(&change.workload.name)?;

            if cluster.allow_workload(&workload) {
                per_cluster_changes.push(change);
            } else {
                info!(
                    cluster = cluster.name(),
                    workload = workload.name(),
                    operation = %change.op,
                    "workload excluded"
                );
            }
        }

        Ok(per_cluster_changes)
    }
}
