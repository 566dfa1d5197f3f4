//! Shared fixtures: a local remote with a working clone for authoring
//! commits, and an in-memory forge fake.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

use promoter_core::forge::{Commit, CreatePrArgs, CreatedPr, ForgeError, ForgeProvider};
use promoter_core::git::{CloneArgs, CommitRange};
use promoter_core::promoter;

pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .output()
        .expect("spawn git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn git_status(dir: &Path, args: &[&str]) -> bool {
    Command::new("git")
        .current_dir(dir)
        .args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .output()
        .expect("spawn git")
        .status
        .success()
}

/// A bare `form3tech/manifests` remote plus a working clone to author
/// commits in.
pub struct TestRepo {
    _dir: tempfile::TempDir,
    pub remote_base: PathBuf,
    pub bare: PathBuf,
    pub work: PathBuf,
}

impl TestRepo {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let remote_base = dir.path().join("remote");
        let bare = remote_base.join("form3tech").join("manifests.git");
        let work = dir.path().join("work");

        std::fs::create_dir_all(&bare).expect("bare dir");
        git(&bare, &["init", "--bare", "."]);
        git(&bare, &["symbolic-ref", "HEAD", "refs/heads/master"]);

        std::fs::create_dir_all(&work).expect("work dir");
        git(&work, &["init", "."]);
        git(&work, &["symbolic-ref", "HEAD", "refs/heads/master"]);
        git(&work, &["remote", "add", "origin", bare.to_str().expect("path")]);

        Self {
            _dir: dir,
            remote_base,
            bare,
            work,
        }
    }

    pub fn base_url(&self) -> String {
        format!("file://{}", self.remote_base.display())
    }

    pub fn write(&self, rel: &str, contents: &str) {
        let path = self.work.join(rel);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(path, contents).expect("write");
    }

    pub fn remove(&self, rel: &str) {
        let path = self.work.join(rel);
        if path.is_dir() {
            std::fs::remove_dir_all(path).expect("remove dir");
        } else {
            std::fs::remove_file(path).expect("remove file");
        }
    }

    pub fn rename(&self, from: &str, to: &str) {
        let to_path = self.work.join(to);
        std::fs::create_dir_all(to_path.parent().expect("parent")).expect("mkdir");
        std::fs::rename(self.work.join(from), to_path).expect("rename");
    }

    /// Stages everything, commits, pushes master, and returns the hash.
    pub fn commit(&self, message: &str) -> String {
        git(&self.work, &["add", "--all"]);
        git(
            &self.work,
            &[
                "-c",
                "user.name=test-author",
                "-c",
                "user.email=test-author@example.com",
                "commit",
                "--allow-empty",
                "-m",
                message,
            ],
        );
        git(&self.work, &["push", "origin", "master"]);
        git(&self.work, &["rev-parse", "HEAD"]).trim().to_string()
    }

    /// File contents at `rev:path` in the remote.
    pub fn show(&self, rev: &str, path: &str) -> String {
        git(&self.bare, &["show", &format!("{rev}:{path}")])
    }

    pub fn exists(&self, rev: &str, path: &str) -> bool {
        git_status(&self.bare, &["cat-file", "-e", &format!("{rev}:{path}")])
    }

    pub fn commit_message(&self, rev: &str) -> String {
        git(&self.bare, &["log", "-1", "--format=%B", rev])
    }

    pub fn promoter_args(&self, range: &str, target: &str) -> promoter::Args {
        let commit_range = CommitRange::parse(range).expect("range");
        promoter::Args {
            clone_args: CloneArgs {
                auth: None,
                base_url: self.base_url(),
                owner: "form3tech".to_string(),
                repo: "manifests".to_string(),
                branch: "master".to_string(),
                target_ref: commit_range.target_ref().to_string(),
            },
            commit_range,
            target_env: target.to_string(),
            config_path: "clusters.yaml".to_string(),
            config_repository: "cluster-config".to_string(),
            gpg_key_path: None,
            committer_name: "k8s-promoter".to_string(),
            committer_email: "k8s-promoter@example.com".to_string(),
            no_issue_users: Vec::new(),
        }
    }
}

/// One cluster configuration document.
pub fn cluster_doc(name: &str, env: &str, folder: &str, cloud: &str) -> String {
    format!(
        r#"version: v0.1
configType: Cluster
metadata:
  name: {name}
  labels:
    environment: {env}
    cloud: {cloud}
spec:
  manifestFolder: /flux/promoted/{env}/{folder}/{cloud}
  configFolder: /flux/config/{env}/{folder}/{cloud}
"#
    )
}

pub fn config_stream(docs: &[String]) -> String {
    docs.join("---\n")
}

#[derive(Debug, Clone)]
pub struct RecordedPr {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

/// In-memory forge: serves the cluster configuration and records every pull
/// request mutation.
#[derive(Default)]
pub struct FakeForge {
    pub config_yaml: Mutex<String>,
    pub compare: Mutex<Vec<Commit>>,
    pub prs: Mutex<Vec<RecordedPr>>,
    pub labels: Mutex<Vec<(u64, Vec<String>)>>,
    pub assignees: Mutex<Vec<(u64, Vec<String>)>>,
}

impl FakeForge {
    pub fn with_config(config_yaml: String) -> Self {
        Self {
            config_yaml: Mutex::new(config_yaml),
            ..Self::default()
        }
    }

    pub fn set_compare(&self, commits: Vec<Commit>) {
        *self.compare.lock().expect("compare lock") = commits;
    }

    pub fn recorded_prs(&self) -> Vec<RecordedPr> {
        self.prs.lock().expect("prs lock").clone()
    }

    pub fn recorded_assignees(&self) -> Vec<(u64, Vec<String>)> {
        self.assignees.lock().expect("assignees lock").clone()
    }

    pub fn recorded_labels(&self) -> Vec<(u64, Vec<String>)> {
        self.labels.lock().expect("labels lock").clone()
    }
}

impl ForgeProvider for FakeForge {
    fn compare_commits(&self, _base: &str, _head: &str) -> Result<Vec<Commit>, ForgeError> {
        Ok(self.compare.lock().expect("compare lock").clone())
    }

    fn file_contents(&self, repo: &str, path: &str, _reference: &str) -> Result<String, ForgeError> {
        if repo != "cluster-config" || path != "clusters.yaml" {
            return Err(ForgeError::Api {
                status: 404,
                message: format!("{repo}/{path} not found"),
            });
        }
        Ok(self.config_yaml.lock().expect("config lock").clone())
    }

    fn create_pull_request(&self, args: &CreatePrArgs) -> Result<CreatedPr, ForgeError> {
        let mut prs = self.prs.lock().expect("prs lock");
        let number = prs.len() as u64 + 1;
        prs.push(RecordedPr {
            number,
            title: args.title.clone(),
            body: args.body.clone(),
            head: args.head.clone(),
            base: args.base.clone(),
        });
        Ok(CreatedPr {
            number,
            url: format!("https://example.com/form3tech/manifests/pull/{number}"),
        })
    }

    fn add_labels(&self, pr_number: u64, labels: &[String]) -> Result<(), ForgeError> {
        self.labels
            .lock()
            .expect("labels lock")
            .push((pr_number, labels.to_vec()));
        Ok(())
    }

    fn add_assignees(&self, pr_number: u64, assignees: &[String]) -> Result<(), ForgeError> {
        self.assignees
            .lock()
            .expect("assignees lock")
            .push((pr_number, assignees.to_vec()));
        Ok(())
    }

    fn is_assignee(&self, _login: &str) -> Result<bool, ForgeError> {
        Ok(true)
    }
}
