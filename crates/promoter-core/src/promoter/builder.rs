//! Pull request rendering: title, description, and commit message.

use std::fmt::Write as _;
use std::path::Path;

use super::PromoteError;
use crate::environment::Env;
use crate::forge::Commit;
use crate::promotion::{Kind, Results};
use crate::repo::PromotionPullRequest;

/// Template appended verbatim to every promotion description. Its absence
/// fails the run.
pub const PR_TEMPLATE_PATH: &str = ".github/PULL_REQUEST_TEMPLATE/master.md";

const WEB_FLOW_USER: &str = "web-flow";

/// Builds the title, description, and commit message for a promotion pull
/// request.
#[derive(Debug)]
pub struct PullRequestBuilder {
    env: Env,
    pull_request_template: String,
}

impl PullRequestBuilder {
    /// Reads the repository's pull request template.
    ///
    /// # Errors
    ///
    /// Returns [`PromoteError::MissingPrTemplate`] when the template file
    /// does not exist.
    pub fn new(worktree: &Path, env: Env) -> Result<Self, PromoteError> {
        let path = worktree.join(PR_TEMPLATE_PATH);
        let pull_request_template = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(PromoteError::MissingPrTemplate {
                    path: PR_TEMPLATE_PATH.to_string(),
                })
            }
            Err(err) => return Err(crate::filesystem::FsError::from(err).into()),
        };

        Ok(Self {
            env,
            pull_request_template,
        })
    }

    /// Renders the pull request content for one promotion group.
    #[must_use]
    pub fn build(&self, results: &Results, commits: &[Commit], kind: Kind) -> PromotionPullRequest {
        PromotionPullRequest {
            commit_message: self.build_commit_message(results, commits),
            description: self.build_description(commits, results, kind),
            title: self.build_title(results),
        }
    }

    fn build_title(&self, results: &Results) -> String {
        let mut title = format!(
            "Promote {} to {}",
            results.workload_names().join(", "),
            self.env
        );

        if self.env != Env::Development {
            let _ = write!(title, " ({})", results.cluster_names().join(", "));
        }

        title
    }

    fn build_commit_message(&self, results: &Results, commits: &[Commit]) -> String {
        let mut message = self.build_title(results);

        if !commits.is_empty() {
            message.push('\n');
            for commit in commits {
                let _ = write!(
                    message,
                    "\nSource-commit: {} A:{} C:{}",
                    commit.hash, commit.author_login, commit.committer_login
                );
            }
        }
        message
    }

    fn build_description(&self, commits: &[Commit], results: &Results, kind: Kind) -> String {
        let mut out = String::from("### Origin\n\n");

        if kind == Kind::NewCluster {
            out.push_str(
                "This promotes all workloads to newly detected cluster(s).\n\n\
                 :warning: **Please update config files as needed** :warning:\n\n\n",
            );
        } else {
            let bullets = source_manifest_list(commits);
            if bullets.is_empty() {
                out.push_str("This promotion is based on unknown source manifest changes.\n\n");
            } else {
                out.push_str("This promotion is based on the following source manifest changes(s):\n");
                for bullet in bullets {
                    let _ = writeln!(out, "* {bullet}");
                }
                out.push('\n');
            }
        }

        out.push_str(&promotions_table(results, kind));
        out.push_str("### Description\n\n");
        out.push_str(&self.pull_request_template);
        out
    }
}

/// One bullet per provenance commit: `<hash> - @author`, plus the committer
/// when it differs and is not the forge's merge user.
fn source_manifest_list(commits: &[Commit]) -> Vec<String> {
    commits
        .iter()
        .map(|commit| {
            let mut item = format!("{} - @{}", commit.hash, commit.author_login);
            if commit.author_login != commit.committer_login
                && commit.committer_login != WEB_FLOW_USER
            {
                let _ = write!(item, " @{}", commit.committer_login);
            }
            item
        })
        .collect()
}

/// Markdown table of clusters (rows) against workloads (columns).
fn promotions_table(results: &Results, kind: Kind) -> String {
    if results.is_empty() {
        return String::new();
    }

    let workload_names = results.workload_names();

    let mut out = String::from("Promotions:\n");

    let mut header = vec![String::new()];
    let mut divider = vec!["-".to_string()];
    for name in &workload_names {
        header.push(name.clone());
        divider.push("-".to_string());
    }
    push_row(&mut out, &header);
    push_row(&mut out, &divider);

    for cluster_name in results.cluster_names() {
        let mut cluster_cell = cluster_name.clone();
        if kind == Kind::NewCluster {
            cluster_cell.push_str(" (new)");
        }

        let mut row = vec![cluster_cell];
        for workload_name in &workload_names {
            if results.contains(&cluster_name, workload_name) {
                row.push(":heavy_check_mark:".to_string());
            } else {
                row.push("-".to_string());
            }
        }
        push_row(&mut out, &row);
    }

    out
}

fn push_row(out: &mut String, cells: &[String]) {
    let _ = writeln!(out, "|{}|", cells.join("|"));
}
