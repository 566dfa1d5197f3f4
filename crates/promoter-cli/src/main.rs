//! k8s-promoter - workload promotion for the flux manifest repository.
//!
//! Copies changed workload manifests into downstream clusters, regenerates
//! the kustomization index files, and raises the promotion pull requests.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use promoter_core::forge::GitHubForgeProvider;
use promoter_core::promoter::Promoter;

mod args;

use args::{credentials_from_env, Cli};

const API_SLEEP: Duration = Duration::from_secs(1);

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let (github_user, github_token) = credentials_from_env()?;
    let args = cli.into_promoter_args(github_user.clone(), github_token.clone())?;

    let forge = Arc::new(GitHubForgeProvider::new(
        args.clone_args.owner.clone(),
        args.clone_args.repo.clone(),
        github_user,
        github_token,
    )?);

    let promoter = Promoter::new(args, forge, API_SLEEP)?;
    promoter.promote()?;

    Ok(())
}
