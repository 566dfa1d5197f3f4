//! Git plumbing over the `git` CLI.
//!
//! All git interaction goes through `Command::new("git")` with explicit
//! arguments; system configuration is not read (`GIT_CONFIG_NOSYSTEM=1`) and
//! prompts are disabled (`GIT_TERMINAL_PROMPT=0`). Credentials are injected
//! per invocation through `http.extraheader` so tokens never land in the
//! clone's configuration.

use std::path::{Path, PathBuf};
use std::process::Command;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use tempfile::TempDir;
use thiserror::Error;

pub mod commit_range;
pub mod sign;

pub use commit_range::{CommitRange, CommitRangeError};
pub use sign::CommitSigner;

/// Errors emitted by the git driver.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GitError {
    /// No target ref was provided for the clone.
    #[error("empty ref")]
    NoRefProvided,

    /// The git binary could not be spawned.
    #[error("failed to spawn git: {0}")]
    Spawn(#[source] std::io::Error),

    /// A revision did not resolve to a commit.
    #[error("failed to resolve revision '{rev}': {reason}")]
    ResolveRevision {
        /// The revision expression.
        rev: String,
        /// What git reported.
        reason: String,
    },

    /// A git invocation exited non-zero.
    #[error("git {op} failed: {reason}")]
    CommandFailed {
        /// The operation being run.
        op: &'static str,
        /// What git reported.
        reason: String,
    },

    /// A diff line did not match the `--name-status` format.
    #[error("unexpected diff entry: {line}")]
    UnexpectedDiffEntry {
        /// The offending output line.
        line: String,
    },

    /// Workspace directory setup failed.
    #[error("workspace setup failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Basic credentials for the hosted remote.
#[derive(Clone)]
pub struct BasicAuth {
    /// Account login.
    pub username: String,
    /// API token used as the password.
    pub token: SecretString,
}

impl BasicAuth {
    fn extraheader(&self) -> String {
        let credentials = format!("{}:{}", self.username, self.token.expose_secret());
        format!(
            "http.extraheader=AUTHORIZATION: basic {}",
            STANDARD.encode(credentials)
        )
    }
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Where and what to clone.
#[derive(Debug, Clone)]
pub struct CloneArgs {
    /// Credentials, absent for local (`file://`) remotes.
    pub auth: Option<BasicAuth>,
    /// Remote base, e.g. `https://github.com`.
    pub base_url: String,
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Branch to clone.
    pub branch: String,
    /// Ref checked out after the clone.
    pub target_ref: String,
}

impl CloneArgs {
    /// Returns the full remote URL.
    #[must_use]
    pub fn repo_url(&self) -> String {
        format!("{}/{}/{}.git", self.base_url, self.owner, self.repo)
    }
}

/// Committer identity used for promotion commits.
#[derive(Debug, Clone)]
pub struct Committer {
    pub name: String,
    pub email: String,
}

/// One raw entry of a tree-to-tree diff.
///
/// `(None, Some)` is an addition, `(Some, None)` a deletion, equal paths a
/// modification and differing paths a rename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    pub from_path: Option<String>,
    pub to_path: Option<String>,
}

/// A commit hash plus its full message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMessage {
    pub hash: String,
    pub message: String,
}

/// A cloned repository checkout, scoped to the lifetime of the run.
pub struct Workspace {
    root: PathBuf,
    auth: Option<BasicAuth>,
    _clone_dir: Option<TempDir>,
}

impl Workspace {
    /// Clones the repository into a scoped temporary directory and force
    /// checks out the target ref.
    ///
    /// The clone fetches all branches (`--no-single-branch`) so that the
    /// commit range and provenance walks can resolve any revision.
    ///
    /// # Errors
    ///
    /// Fails when the ref is empty, the clone fails, or the target ref does
    /// not resolve.
    pub fn clone(args: &CloneArgs) -> Result<Self, GitError> {
        if args.target_ref.is_empty() {
            return Err(GitError::NoRefProvided);
        }

        let dir = tempfile::tempdir()?;
        let root = dir.path().join("repo");

        let mut cmd = base_command();
        if let Some(auth) = &args.auth {
            cmd.arg("-c").arg(auth.extraheader());
        }
        cmd.arg("clone")
            .arg("--branch")
            .arg(&args.branch)
            .arg("--no-single-branch")
            .arg(args.repo_url())
            .arg(&root);
        run(cmd, "clone")?;

        let workspace = Self {
            root,
            auth: args.auth.clone(),
            _clone_dir: Some(dir),
        };

        let hash = workspace.resolve_revision(&args.target_ref)?;
        let mut checkout = workspace.command();
        checkout.arg("checkout").arg("--force").arg(&hash);
        run(checkout, "checkout")?;

        Ok(workspace)
    }

    /// Wraps an existing checkout without cloning. Used by tests.
    #[must_use]
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            auth: None,
            _clone_dir: None,
        }
    }

    /// Root of the checked-out worktree.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a revision expression to a full commit hash.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::ResolveRevision`] when the expression does not
    /// name a commit.
    pub fn resolve_revision(&self, rev: &str) -> Result<String, GitError> {
        let mut cmd = self.command();
        cmd.arg("rev-parse")
            .arg("--verify")
            .arg(format!("{rev}^{{commit}}"));
        match run(cmd, "rev-parse") {
            Ok(out) => Ok(out.trim().to_string()),
            Err(GitError::CommandFailed { reason, .. }) => Err(GitError::ResolveRevision {
                rev: rev.to_string(),
                reason,
            }),
            Err(err) => Err(err),
        }
    }

    /// Diffs two trees, with rename detection, into raw path pairs.
    ///
    /// # Errors
    ///
    /// Fails when the diff command fails or emits an unrecognised status.
    pub fn diff(&self, from: &str, to: &str) -> Result<Vec<DiffEntry>, GitError> {
        let mut cmd = self.command();
        cmd.arg("diff")
            .arg("--find-renames")
            .arg("--name-status")
            .arg(from)
            .arg(to);
        let out = run(cmd, "diff")?;

        let mut entries = Vec::new();
        for line in out.lines().filter(|l| !l.is_empty()) {
            entries.push(parse_diff_line(line)?);
        }
        Ok(entries)
    }

    /// Returns whether `path` exists as an object in the tree of `rev`.
    ///
    /// # Errors
    ///
    /// Fails only when git cannot be spawned; an unresolvable path reports
    /// non-existence.
    pub fn tree_exists(&self, rev: &str, path: &str) -> Result<bool, GitError> {
        let mut cmd = self.command();
        cmd.arg("cat-file").arg("-e").arg(format!("{rev}:{path}"));
        let output = cmd.output().map_err(GitError::Spawn)?;
        Ok(output.status.success())
    }

    /// Lists non-merge commits reachable from `to` but not from `from`,
    /// newest first, with their full messages.
    ///
    /// # Errors
    ///
    /// Fails when the log command fails.
    pub fn log_messages(&self, from: &str, to: &str) -> Result<Vec<CommitMessage>, GitError> {
        let mut cmd = self.command();
        cmd.arg("log")
            .arg("--no-merges")
            .arg("--format=%H%x01%B%x02")
            .arg(format!("{from}..{to}"));
        let out = run(cmd, "log")?;

        let mut commits = Vec::new();
        for record in out.split('\u{2}') {
            let record = record.trim_matches('\n');
            let Some((hash, message)) = record.split_once('\u{1}') else {
                continue;
            };
            commits.push(CommitMessage {
                hash: hash.trim().to_string(),
                message: message.to_string(),
            });
        }
        Ok(commits)
    }

    /// Creates (or resets) a branch at `start_ref` and force checks it out.
    ///
    /// # Errors
    ///
    /// Fails when the start ref does not resolve or the checkout fails.
    pub fn create_branch(&self, name: &str, start_ref: &str) -> Result<(), GitError> {
        let hash = self.resolve_revision(start_ref)?;
        let mut cmd = self.command();
        cmd.arg("checkout")
            .arg("--force")
            .arg("-B")
            .arg(name)
            .arg(&hash);
        run(cmd, "checkout")?;
        Ok(())
    }

    /// Stages every change in the worktree.
    ///
    /// # Errors
    ///
    /// Fails when `git add` fails.
    pub fn add_all(&self) -> Result<(), GitError> {
        let mut cmd = self.command();
        cmd.arg("add").arg("--all");
        run(cmd, "add")?;
        Ok(())
    }

    /// Commits the staged changes as `committer`, signing when a signer is
    /// configured.
    ///
    /// # Errors
    ///
    /// Fails when the commit fails (including signing failures).
    pub fn commit(
        &self,
        message: &str,
        committer: &Committer,
        signer: Option<&CommitSigner>,
    ) -> Result<(), GitError> {
        let mut cmd = self.command();
        cmd.arg("-c")
            .arg(format!("user.name={}", committer.name))
            .arg("-c")
            .arg(format!("user.email={}", committer.email));
        if let Some(signer) = signer {
            for arg in signer.config_args() {
                cmd.arg("-c").arg(arg);
            }
            cmd.env("GNUPGHOME", signer.gnupg_home());
        }
        // An unchanged tree still gets its promotion commit, matching the
        // behaviour of staging-then-committing unconditionally.
        cmd.arg("commit").arg("--allow-empty").arg("-m").arg(message);
        run(cmd, "commit")?;
        Ok(())
    }

    /// Pushes a branch to `origin` with an explicit refspec.
    ///
    /// # Errors
    ///
    /// Fails when the push is rejected or the remote is unreachable.
    pub fn push(&self, branch: &str) -> Result<(), GitError> {
        let mut cmd = self.command();
        if let Some(auth) = &self.auth {
            cmd.arg("-c").arg(auth.extraheader());
        }
        cmd.arg("push")
            .arg("origin")
            .arg(format!("refs/heads/{branch}:refs/heads/{branch}"));
        run(cmd, "push")?;
        Ok(())
    }

    fn command(&self) -> Command {
        let mut cmd = base_command();
        cmd.current_dir(&self.root);
        cmd
    }
}

fn base_command() -> Command {
    let mut cmd = Command::new("git");
    cmd.env("GIT_TERMINAL_PROMPT", "0");
    cmd.env("GIT_CONFIG_NOSYSTEM", "1");
    cmd
}

fn run(mut cmd: Command, op: &'static str) -> Result<String, GitError> {
    let output = cmd.output().map_err(GitError::Spawn)?;

    if !output.status.success() {
        let mut reason = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if reason.is_empty() {
            reason = String::from_utf8_lossy(&output.stdout).trim().to_string();
        }
        if reason.is_empty() {
            reason = "git command failed with no output".to_string();
        }
        return Err(GitError::CommandFailed { op, reason });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn parse_diff_line(line: &str) -> Result<DiffEntry, GitError> {
    let mut fields = line.split('\t');
    let status = fields.next().unwrap_or_default();
    let first = fields.next();
    let second = fields.next();

    let entry = match (status.chars().next(), first, second) {
        (Some('A'), Some(path), None) => DiffEntry {
            from_path: None,
            to_path: Some(path.to_string()),
        },
        (Some('D'), Some(path), None) => DiffEntry {
            from_path: Some(path.to_string()),
            to_path: None,
        },
        (Some('M' | 'T'), Some(path), None) => DiffEntry {
            from_path: Some(path.to_string()),
            to_path: Some(path.to_string()),
        },
        (Some('R' | 'C'), Some(from), Some(to)) => DiffEntry {
            from_path: Some(from.to_string()),
            to_path: Some(to.to_string()),
        },
        _ => {
            return Err(GitError::UnexpectedDiffEntry {
                line: line.to_string(),
            })
        }
    };
    Ok(entry)
}
