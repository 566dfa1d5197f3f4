//! Provider-agnostic hosted-VCS interfaces.
//!
//! The promotion engine talks to its git host through the narrow
//! [`ForgeProvider`] trait so the pipeline can be exercised against an
//! in-memory fake.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod github;

pub use github::GitHubForgeProvider;

/// Errors emitted by forge providers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ForgeError {
    /// Invalid provider configuration.
    #[error("forge configuration error: {0}")]
    Configuration(String),

    /// Request transport failed.
    #[error("forge transport error: {0}")]
    Transport(String),

    /// API request failed with a structured status code.
    #[error("forge API error ({status}): {message}")]
    Api {
        /// HTTP status code returned by the forge API.
        status: u16,
        /// Error body/message.
        message: String,
    },

    /// API payload parse failed.
    #[error("forge parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for ForgeError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value.to_string())
    }
}

impl From<serde_json::Error> for ForgeError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value.to_string())
    }
}

/// A source commit with the logins that authored and committed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Commit hash.
    pub hash: String,
    /// Author login.
    pub author_login: String,
    /// Committer login.
    pub committer_login: String,
}

/// Arguments for creating a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePrArgs {
    /// Pull request title.
    pub title: String,
    /// Pull request body markdown.
    pub body: String,
    /// Source branch.
    pub head: String,
    /// Target branch.
    pub base: String,
}

/// A freshly created pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedPr {
    /// Pull request number.
    pub number: u64,
    /// Pull request URL.
    pub url: String,
}

/// Provider-agnostic forge interface, scoped to one target repository.
pub trait ForgeProvider: Send + Sync {
    /// Compares two revisions and returns the commits between them, oldest
    /// first, as the forge reports them.
    ///
    /// # Errors
    ///
    /// Returns an error when the comparison fails or a commit carries no
    /// account login.
    fn compare_commits(&self, base: &str, head: &str) -> Result<Vec<Commit>, ForgeError>;

    /// Fetches the decoded contents of a file in `repo` (same owner) at
    /// `reference`.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be fetched or decoded.
    fn file_contents(&self, repo: &str, path: &str, reference: &str)
        -> Result<String, ForgeError>;

    /// Creates a pull request and returns its number and URL.
    ///
    /// # Errors
    ///
    /// Returns an error when creation fails or is unauthorized.
    fn create_pull_request(&self, args: &CreatePrArgs) -> Result<CreatedPr, ForgeError>;

    /// Attaches labels to a pull request.
    ///
    /// # Errors
    ///
    /// Returns an error when the label mutation fails.
    fn add_labels(&self, pr_number: u64, labels: &[String]) -> Result<(), ForgeError>;

    /// Attaches assignees to a pull request.
    ///
    /// # Errors
    ///
    /// Returns an error when the assignee mutation fails.
    fn add_assignees(&self, pr_number: u64, assignees: &[String]) -> Result<(), ForgeError>;

    /// Returns whether `login` may be assigned issues on the repository.
    ///
    /// # Errors
    ///
    /// Returns an error when the probe fails.
    fn is_assignee(&self, login: &str) -> Result<bool, ForgeError>;
}
