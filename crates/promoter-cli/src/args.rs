//! Command line surface and credential loading.

use std::path::PathBuf;

use clap::Parser;
use secrecy::SecretString;
use thiserror::Error;

use promoter_core::git::{BasicAuth, CloneArgs, CommitRange, CommitRangeError};
use promoter_core::promoter;

const GITHUB_BASE_URL: &str = "https://github.com";

/// Argument and environment validation errors.
#[derive(Debug, Error)]
pub enum ArgsError {
    /// A required flag is missing or blank.
    #[error("missing CLI argument: -{0} is a required argument")]
    MissingArg(&'static str),

    /// A required environment variable is not set.
    #[error("{0}: missing Env variable")]
    MissingEnv(&'static str),

    /// The commit range is malformed.
    #[error(transparent)]
    CommitRange(#[from] CommitRangeError),
}

/// Promotes workloads between the environments of a GitOps manifest
/// repository.
#[derive(Parser, Debug)]
#[command(name = "k8s-promoter", version, about, long_about = None)]
pub struct Cli {
    /// The repository organisation
    #[arg(long, default_value = "form3tech")]
    pub owner: String,

    /// The name of the target repository
    #[arg(long)]
    pub repository: Option<String>,

    /// The name of the branch you want the changes pushed into
    #[arg(long, default_value = "master")]
    pub branch: String,

    /// The PR commit range which introduces changes to the workloads
    #[arg(long = "commit-range")]
    pub commit_range: Option<String>,

    /// The target environment to receive promoted workload
    #[arg(long)]
    pub target: Option<String>,

    /// Path to the GPG key used to sign commits
    #[arg(long = "gpg-key-path", default_value = "key.gpg")]
    pub gpg_key_path: PathBuf,

    /// The name of the repository to fetch the config file
    #[arg(long = "config-repository")]
    pub config_repository: Option<String>,

    /// Path to the clusters config file
    #[arg(long = "config-path", default_value = "clusters.yaml")]
    pub config_path: String,

    /// Name of user to commit as
    #[arg(long = "committer-name")]
    pub committer_name: Option<String>,

    /// Email of user to commit as
    #[arg(long = "committer-email")]
    pub committer_email: Option<String>,

    /// GitHub user(s) that should not be assigned issues (comma-separated)
    #[arg(long = "no-issue-users", value_delimiter = ',')]
    pub no_issue_users: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log-level", default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// Validates the flags and assembles the promoter arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ArgsError::MissingArg`] for the first blank required flag,
    /// in flag declaration order, or a commit range parse failure.
    pub fn into_promoter_args(
        self,
        github_user: String,
        github_token: SecretString,
    ) -> Result<promoter::Args, ArgsError> {
        let owner = required("owner", Some(self.owner))?;
        let repository = required("repository", self.repository)?;
        let branch = required("branch", Some(self.branch))?;
        let commit_range = required("commit-range", self.commit_range)?;
        let target = required("target", self.target)?;
        let gpg_key_path = self.gpg_key_path;
        if gpg_key_path.as_os_str().is_empty() {
            return Err(ArgsError::MissingArg("gpg-key-path"));
        }
        let config_repository = required("config-repository", self.config_repository)?;
        let config_path = required("config-path", Some(self.config_path))?;
        let committer_name = required("committer-name", self.committer_name)?;
        let committer_email = required("committer-email", self.committer_email)?;

        let commit_range = CommitRange::parse(&commit_range)?;

        Ok(promoter::Args {
            clone_args: CloneArgs {
                auth: Some(BasicAuth {
                    username: github_user,
                    token: github_token,
                }),
                base_url: GITHUB_BASE_URL.to_string(),
                owner,
                repo: repository,
                branch,
                target_ref: commit_range.target_ref().to_string(),
            },
            commit_range,
            target_env: target,
            config_path,
            config_repository,
            gpg_key_path: Some(gpg_key_path),
            committer_name,
            committer_email,
            no_issue_users: self.no_issue_users,
        })
    }
}

/// Reads the basic-auth credentials from the environment.
///
/// # Errors
///
/// Returns [`ArgsError::MissingEnv`] naming the first absent variable.
pub fn credentials_from_env() -> Result<(String, SecretString), ArgsError> {
    let user = std::env::var("GITHUB_USER").map_err(|_| ArgsError::MissingEnv("GITHUB_USER"))?;
    let token = std::env::var("GITHUB_TOKEN").map_err(|_| ArgsError::MissingEnv("GITHUB_TOKEN"))?;
    Ok((user, SecretString::new(token)))
}

fn required(flag: &'static str, value: Option<String>) -> Result<String, ArgsError> {
    match value {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ArgsError::MissingArg(flag)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["k8s-promoter"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    fn complete_args() -> Vec<&'static str> {
        vec![
            "--repository",
            "manifests",
            "--commit-range",
            "abc...def",
            "--target",
            "development",
            "--config-repository",
            "cluster-config",
            "--committer-name",
            "promoter",
            "--committer-email",
            "promoter@example.com",
        ]
    }

    fn token() -> SecretString {
        SecretString::new("token".to_string())
    }

    #[test]
    fn complete_invocation_builds_args() {
        let args = cli(&complete_args())
            .into_promoter_args("user".to_string(), token())
            .expect("valid args");

        assert_eq!(args.clone_args.owner, "form3tech");
        assert_eq!(args.clone_args.repo, "manifests");
        assert_eq!(args.clone_args.branch, "master");
        assert_eq!(args.clone_args.target_ref, "def");
        assert_eq!(args.commit_range.from_prefix, "abc");
        assert_eq!(args.target_env, "development");
        assert_eq!(args.config_path, "clusters.yaml");
        assert_eq!(args.config_repository, "cluster-config");
    }

    #[test]
    fn missing_repository_is_reported_with_the_flag_name() {
        let mut args = complete_args();
        args.drain(0..2);
        let err = cli(&args)
            .into_promoter_args("user".to_string(), token())
            .expect_err("missing repository");
        assert_eq!(
            err.to_string(),
            "missing CLI argument: -repository is a required argument"
        );
    }

    #[test]
    fn blank_defaulted_flag_is_also_required() {
        let mut args = complete_args();
        args.extend_from_slice(&["--owner", ""]);
        let err = cli(&args)
            .into_promoter_args("user".to_string(), token())
            .expect_err("blank owner");
        assert_eq!(
            err.to_string(),
            "missing CLI argument: -owner is a required argument"
        );
    }

    #[test]
    fn two_dot_commit_range_is_rejected() {
        let mut args = complete_args();
        args[3] = "abc..def";
        let err = cli(&args)
            .into_promoter_args("user".to_string(), token())
            .expect_err("two dots");
        assert!(err.to_string().contains("commit range incorrect"));
    }

    #[test]
    fn no_issue_users_are_comma_separated() {
        let mut args = complete_args();
        args.extend_from_slice(&["--no-issue-users", "bot-1,bot-2"]);
        let parsed = cli(&args)
            .into_promoter_args("user".to_string(), token())
            .expect("valid args");
        assert_eq!(parsed.no_issue_users, ["bot-1", "bot-2"]);
    }
}
