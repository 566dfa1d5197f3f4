//! GitHub forge provider backed by basic-auth REST calls.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use super::{Commit, CreatePrArgs, CreatedPr, ForgeError, ForgeProvider};

const GITHUB_API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = "k8s-promoter";

/// GitHub implementation of [`ForgeProvider`].
pub struct GitHubForgeProvider {
    owner: String,
    repo: String,
    api_base_url: String,
    username: String,
    token: SecretString,
    http_client: reqwest::blocking::Client,
}

impl GitHubForgeProvider {
    /// Creates a provider with the default GitHub API base URL.
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        username: impl Into<String>,
        token: SecretString,
    ) -> Result<Self, ForgeError> {
        Self::with_api_base_url(owner, repo, username, token, "https://api.github.com")
    }

    /// Creates a provider with an explicit API base URL.
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn with_api_base_url(
        owner: impl Into<String>,
        repo: impl Into<String>,
        username: impl Into<String>,
        token: SecretString,
        api_base_url: impl Into<String>,
    ) -> Result<Self, ForgeError> {
        let owner = owner.into();
        let repo = repo.into();
        if owner.trim().is_empty() || repo.trim().is_empty() {
            return Err(ForgeError::Configuration(
                "owner and repository must not be empty".to_string(),
            ));
        }

        let api_base_url = api_base_url.into();
        if api_base_url.trim().is_empty() {
            return Err(ForgeError::Configuration(
                "api_base_url must not be empty".to_string(),
            ));
        }

        let http_client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| ForgeError::Transport(err.to_string()))?;

        Ok(Self {
            owner,
            repo,
            api_base_url,
            username: username.into(),
            token,
            http_client,
        })
    }

    fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<(u16, String), ForgeError> {
        let url = format!("{}{path}", self.api_base_url);
        let mut request = self
            .http_client
            .request(method, url)
            .basic_auth(&self.username, Some(self.token.expose_secret()))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
            .header("User-Agent", USER_AGENT);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send()?;
        let status = response.status().as_u16();
        let text = response.text()?;
        Ok((status, text))
    }

    fn expect_success(status: u16, body: String) -> Result<String, ForgeError> {
        if (200..300).contains(&status) {
            Ok(body)
        } else {
            Err(ForgeError::Api {
                status,
                message: body,
            })
        }
    }
}

#[derive(Deserialize)]
struct ApiCompare {
    #[serde(default)]
    commits: Vec<ApiCommit>,
}

#[derive(Deserialize)]
struct ApiCommit {
    sha: String,
    author: Option<ApiAccount>,
    committer: Option<ApiAccount>,
}

#[derive(Deserialize)]
struct ApiAccount {
    login: String,
}

#[derive(Deserialize)]
struct ApiContents {
    content: String,
    encoding: String,
}

#[derive(Deserialize)]
struct ApiPullRequest {
    number: u64,
    html_url: String,
}

impl ForgeProvider for GitHubForgeProvider {
    fn compare_commits(&self, base: &str, head: &str) -> Result<Vec<Commit>, ForgeError> {
        let path = format!(
            "/repos/{}/{}/compare/{base}...{head}",
            self.owner, self.repo
        );
        let (status, body) = self.execute(Method::GET, &path, None)?;
        let body = Self::expect_success(status, body)?;
        let compare: ApiCompare = serde_json::from_str(&body)?;

        let mut commits = Vec::with_capacity(compare.commits.len());
        for commit in compare.commits {
            let author = commit.author.ok_or_else(|| {
                ForgeError::Parse(format!("commit {} has no author account", commit.sha))
            })?;
            let committer = commit.committer.ok_or_else(|| {
                ForgeError::Parse(format!("commit {} has no committer account", commit.sha))
            })?;
            commits.push(Commit {
                hash: commit.sha,
                author_login: author.login,
                committer_login: committer.login,
            });
        }
        Ok(commits)
    }

    fn file_contents(
        &self,
        repo: &str,
        path: &str,
        reference: &str,
    ) -> Result<String, ForgeError> {
        let api_path = format!(
            "/repos/{}/{repo}/contents/{path}?ref={reference}",
            self.owner
        );
        let (status, body) = self.execute(Method::GET, &api_path, None)?;
        let body = Self::expect_success(status, body)?;
        let contents: ApiContents = serde_json::from_str(&body)?;

        if contents.encoding != "base64" {
            return Err(ForgeError::Parse(format!(
                "unexpected contents encoding '{}'",
                contents.encoding
            )));
        }

        let stripped: String = contents
            .content
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let decoded = STANDARD
            .decode(stripped)
            .map_err(|err| ForgeError::Parse(err.to_string()))?;
        String::from_utf8(decoded).map_err(|err| ForgeError::Parse(err.to_string()))
    }

    fn create_pull_request(&self, args: &CreatePrArgs) -> Result<CreatedPr, ForgeError> {
        let path = format!("/repos/{}/{}/pulls", self.owner, self.repo);
        let body = json!({
            "title": args.title,
            "body": args.body,
            "head": args.head,
            "base": args.base,
            "maintainer_can_modify": false,
        });
        let (status, text) = self.execute(Method::POST, &path, Some(body))?;
        let text = Self::expect_success(status, text)?;
        let pr: ApiPullRequest = serde_json::from_str(&text)?;
        Ok(CreatedPr {
            number: pr.number,
            url: pr.html_url,
        })
    }

    fn add_labels(&self, pr_number: u64, labels: &[String]) -> Result<(), ForgeError> {
        let path = format!(
            "/repos/{}/{}/issues/{pr_number}/labels",
            self.owner, self.repo
        );
        let (status, text) =
            self.execute(Method::POST, &path, Some(json!({ "labels": labels })))?;
        Self::expect_success(status, text)?;
        Ok(())
    }

    fn add_assignees(&self, pr_number: u64, assignees: &[String]) -> Result<(), ForgeError> {
        let path = format!(
            "/repos/{}/{}/issues/{pr_number}/assignees",
            self.owner, self.repo
        );
        let (status, text) =
            self.execute(Method::POST, &path, Some(json!({ "assignees": assignees })))?;
        Self::expect_success(status, text)?;
        Ok(())
    }

    fn is_assignee(&self, login: &str) -> Result<bool, ForgeError> {
        let path = format!("/repos/{}/{}/assignees/{login}", self.owner, self.repo);
        let (status, body) = self.execute(Method::GET, &path, None)?;
        match status {
            204 => Ok(true),
            404 => Ok(false),
            _ => Err(ForgeError::Api {
                status,
                message: body,
            }),
        }
    }
}
