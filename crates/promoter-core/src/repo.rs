//! Repository driver: branch creation, signed commits, pushes, and pull
//! request mutations against the forge.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::forge::{Commit, CreatePrArgs, ForgeError, ForgeProvider};
use crate::git::{CommitSigner, Committer, GitError, Workspace};

/// Label attached to every promotion pull request.
pub const PR_LABEL: &str = "k8s-promoter/automated-promotion";

const WEB_FLOW_USER: &str = "web-flow";
const MAX_ASSIGNEES: usize = 10;

/// Errors raised by the repository driver.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RepoError {
    /// Local git plumbing failed.
    #[error(transparent)]
    Git(#[from] GitError),

    /// A forge call failed.
    #[error(transparent)]
    Forge(#[from] ForgeError),
}

/// Coordinates of the repository promotions are pushed to.
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    pub owner: String,
    pub repository: String,
    /// Branch pull requests target.
    pub target_branch: String,
    /// Ref promotion branches start from.
    pub target_ref: String,
}

/// Rendered pull request content for one promotion group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionPullRequest {
    pub title: String,
    pub description: String,
    pub commit_message: String,
}

/// The manifest repository a promotion writes to: a local checkout paired
/// with the forge-side pull request surface.
pub struct ManifestRepository {
    ws: Arc<Workspace>,
    forge: Arc<dyn ForgeProvider>,
    config: RepositoryConfig,
    committer: Committer,
    signer: Option<CommitSigner>,
    no_issue_users: Vec<String>,
    api_sleep: Duration,
}

impl ManifestRepository {
    #[must_use]
    pub fn new(
        ws: Arc<Workspace>,
        forge: Arc<dyn ForgeProvider>,
        config: RepositoryConfig,
        committer: Committer,
    ) -> Self {
        Self {
            ws,
            forge,
            config,
            committer,
            signer: None,
            no_issue_users: Vec::new(),
            api_sleep: Duration::ZERO,
        }
    }

    /// Signs promotion commits with the given key.
    #[must_use]
    pub fn with_signer(mut self, signer: Option<CommitSigner>) -> Self {
        self.signer = signer;
        self
    }

    /// Logins that are never assigned to promotion pull requests.
    #[must_use]
    pub fn with_no_issue_users(mut self, users: Vec<String>) -> Self {
        self.no_issue_users = users;
        self
    }

    /// Artificial delay before forge calls, for rate-limit mitigation.
    #[must_use]
    pub fn with_api_sleep(mut self, sleep: Duration) -> Self {
        self.api_sleep = sleep;
        self
    }

    /// Creates a fresh promotion branch off the target ref and checks it
    /// out.
    ///
    /// # Errors
    ///
    /// Fails when the target ref does not resolve or the checkout fails.
    pub fn new_promote_branch(&self) -> Result<String, RepoError> {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let branch_name = format!("k8s-promoter-{nanos}");

        self.ws.create_branch(&branch_name, &self.config.target_ref)?;
        Ok(branch_name)
    }

    /// Stages everything and writes one signed commit.
    ///
    /// # Errors
    ///
    /// Fails when staging or the commit fails.
    pub fn commit(&self, message: &str) -> Result<(), RepoError> {
        self.ws.add_all()?;
        self.ws
            .commit(message, &self.committer, self.signer.as_ref())?;
        Ok(())
    }

    /// Fetches the commits of a revision range from the forge compare
    /// endpoint.
    ///
    /// # Errors
    ///
    /// Fails when the comparison fails.
    pub fn get_commits(&self, base: &str, head: &str) -> Result<Vec<Commit>, RepoError> {
        Ok(self.forge.compare_commits(base, head)?)
    }

    /// Derives the pull request assignees from source-commit authorship:
    /// authors and committers, minus the forge bot login and the configured
    /// skip list, filtered by the forge assignee check, capped at ten,
    /// sorted.
    ///
    /// # Errors
    ///
    /// Fails when the assignee probe fails.
    pub fn pull_request_assignees(
        &self,
        source_commits: &[Commit],
    ) -> Result<Vec<String>, RepoError> {
        let mut candidates = BTreeSet::new();
        for commit in source_commits {
            candidates.insert(commit.author_login.clone());
            candidates.insert(commit.committer_login.clone());
        }

        let mut assignees = Vec::new();
        for candidate in candidates {
            if !self.is_assignee(&candidate)? {
                continue;
            }
            if assignees.len() == MAX_ASSIGNEES {
                warn!("capping PR assignees at {MAX_ASSIGNEES} due to GitHub limits");
                break;
            }
            assignees.push(candidate);
        }

        assignees.sort();
        Ok(assignees)
    }

    fn is_assignee(&self, login: &str) -> Result<bool, RepoError> {
        // The forge's own merge user is never a valid assignee.
        if login == WEB_FLOW_USER {
            return Ok(false);
        }
        if self.no_issue_users.iter().any(|user| user == login) {
            return Ok(false);
        }

        self.sleep();
        Ok(self.forge.is_assignee(login)?)
    }

    /// Pushes the promotion branch and opens the pull request with its label
    /// and assignees.
    ///
    /// # Errors
    ///
    /// Fails when the push or any forge mutation fails; nothing is retried.
    pub fn raise_promotion(
        &self,
        branch_name: &str,
        pr: &PromotionPullRequest,
        assignees: &[String],
    ) -> Result<(), RepoError> {
        debug!(branch = branch_name, "Pushing new branch");
        self.ws.push(branch_name)?;

        info!(branch = branch_name, title = %pr.title, "Raising pull request");

        self.sleep();
        let created = self.forge.create_pull_request(&CreatePrArgs {
            title: pr.title.clone(),
            body: pr.description.clone(),
            head: branch_name.to_string(),
            base: self.config.target_branch.clone(),
        })?;

        info!(pr = created.number, pr_url = %created.url, "Pull request {} raised", created.number);

        self.sleep();
        self.forge
            .add_labels(created.number, &[PR_LABEL.to_string()])?;

        self.sleep();
        self.forge.add_assignees(created.number, assignees)?;

        Ok(())
    }

    fn sleep(&self) {
        if !self.api_sleep.is_zero() {
            std::thread::sleep(self.api_sleep);
        }
    }
}
