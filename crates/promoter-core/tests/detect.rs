//! Change inference over real git history.

use std::sync::Arc;

use promoter_core::clusterconf::{Clusters, FsWorkloadRegistry};
use promoter_core::detect::{Detect, DetectError, Operation, Workload, WorkloadChange};
use promoter_core::environment::Env;
use promoter_core::git::{CommitRange, Workspace};

mod common;

use common::TestRepo;

fn detect_for(repo: &TestRepo, from: &str, to: &str) -> Detect {
    let ws = Arc::new(Workspace::open(&repo.work));
    let registry = Arc::new(FsWorkloadRegistry::new(&repo.work, "flux/manifests"));
    let range = CommitRange::parse(&format!("{from}...{to}")).expect("range");
    Detect::new(ws, range, registry)
}

fn copy(env: &str, name: &str) -> WorkloadChange {
    WorkloadChange {
        op: Operation::Copy,
        workload: Workload {
            source_env: env.to_string(),
            name: name.to_string(),
        },
    }
}

fn remove(env: &str, name: &str) -> WorkloadChange {
    WorkloadChange {
        op: Operation::Remove,
        workload: Workload {
            source_env: env.to_string(),
            name: name.to_string(),
        },
    }
}

#[test]
fn added_source_manifest_infers_a_copy() {
    let repo = TestRepo::new();
    repo.write("README.md", "readme");
    let c0 = repo.commit("initial");

    repo.write("flux/manifests/foo/file", "new-content");
    let c1 = repo.commit("add foo");

    let changes = detect_for(&repo, &c0, &c1)
        .workload_changes()
        .expect("changes");
    assert_eq!(changes, vec![copy("manifests", "foo")]);
}

#[test]
fn modified_source_manifest_infers_a_copy() {
    let repo = TestRepo::new();
    repo.write("flux/manifests/foo/file", "new-content");
    let c0 = repo.commit("initial");

    repo.write("flux/manifests/foo/file", "new-content2");
    let c1 = repo.commit("edit foo");

    let changes = detect_for(&repo, &c0, &c1)
        .workload_changes()
        .expect("changes");
    assert_eq!(changes, vec![copy("manifests", "foo")]);
}

#[test]
fn changes_are_deduplicated_and_sorted_by_workload() {
    let repo = TestRepo::new();
    repo.write("README.md", "readme");
    let c0 = repo.commit("initial");

    repo.write("flux/manifests/zoo/a", "a");
    repo.write("flux/manifests/zoo/b", "b");
    repo.write("flux/manifests/abc/a", "a");
    let c1 = repo.commit("add workloads");

    let changes = detect_for(&repo, &c0, &c1)
        .workload_changes()
        .expect("changes");
    assert_eq!(
        changes,
        vec![copy("manifests", "abc"), copy("manifests", "zoo")]
    );
}

#[test]
fn deleted_file_is_a_copy_while_the_workload_still_exists() {
    let repo = TestRepo::new();
    repo.write("flux/manifests/foo/keep", "keep");
    repo.write("flux/manifests/foo/drop", "drop");
    let c0 = repo.commit("initial");

    repo.remove("flux/manifests/foo/drop");
    let c1 = repo.commit("drop one manifest");

    let changes = detect_for(&repo, &c0, &c1)
        .workload_changes()
        .expect("changes");
    assert_eq!(changes, vec![copy("manifests", "foo")]);
}

#[test]
fn deleted_workload_is_a_removal() {
    let repo = TestRepo::new();
    repo.write("flux/manifests/foo/file", "content");
    repo.write("flux/manifests/bar/file", "content");
    let c0 = repo.commit("initial");

    repo.remove("flux/manifests/foo");
    let c1 = repo.commit("drop foo");

    let changes = detect_for(&repo, &c0, &c1)
        .workload_changes()
        .expect("changes");
    assert_eq!(changes, vec![remove("manifests", "foo")]);
}

#[test]
fn renamed_promoted_workload_is_a_removal_plus_copy() {
    let repo = TestRepo::new();
    repo.write(
        "flux/promoted/development/dev2/cloud1/workload2/file",
        "release name: workload2, some additional content to lower impact on name change",
    );
    let c0 = repo.commit("initial");

    repo.rename(
        "flux/promoted/development/dev2/cloud1/workload2",
        "flux/promoted/development/dev2/cloud1/tool-echo",
    );
    let c1 = repo.commit("rename workload2 to tool-echo");

    let changes = detect_for(&repo, &c0, &c1)
        .workload_changes()
        .expect("changes");
    assert_eq!(
        changes,
        vec![
            copy("development", "tool-echo"),
            remove("development", "workload2"),
        ]
    );
}

#[test]
fn manifest_moved_between_existing_workloads_copies_both() {
    let repo = TestRepo::new();
    repo.write("flux/manifests/foo/moved", "the payload of the moved manifest");
    repo.write("flux/manifests/foo/keep", "keep");
    repo.write("flux/manifests/bar/file", "bar");
    let c0 = repo.commit("initial");

    repo.rename("flux/manifests/foo/moved", "flux/manifests/bar/moved");
    let c1 = repo.commit("move manifest from foo to bar");

    let changes = detect_for(&repo, &c0, &c1)
        .workload_changes()
        .expect("changes");
    assert_eq!(
        changes,
        vec![copy("manifests", "bar"), copy("manifests", "foo")]
    );
}

#[test]
fn non_workload_changes_yield_no_change() {
    let repo = TestRepo::new();
    repo.write("README.md", "readme");
    let c0 = repo.commit("initial");

    repo.write("README.md", "updated readme");
    repo.write("flux/promoted/development/dev1/cloud1/kustomization.yaml", "generated");
    let c1 = repo.commit("docs only");

    let err = detect_for(&repo, &c0, &c1)
        .workload_changes()
        .expect_err("no change");
    assert!(matches!(err, DetectError::NoChange { .. }));
}

#[test]
fn empty_range_yields_no_change() {
    let repo = TestRepo::new();
    repo.write("flux/manifests/foo/file", "content");
    let c0 = repo.commit("initial");

    let err = detect_for(&repo, &c0, &c0)
        .workload_changes()
        .expect_err("empty range");
    assert!(matches!(err, DetectError::NoChange { .. }));
}

#[test]
fn source_commit_trailers_are_harvested_newest_first() {
    let repo = TestRepo::new();
    repo.write("README.md", "readme");
    let c0 = repo.commit("initial");

    repo.write("flux/manifests/foo/file", "one");
    repo.commit("Promote foo to test\n\nSource-commit: abc123 A:alice C:bob");

    repo.write("flux/manifests/foo/file", "two");
    let c2 = repo.commit(
        "Promote foo to test\n\nSource-commit: def456 A:carol C:web-flow\r\nSource-commit: 789abc A:dave C:dave",
    );

    let commits = detect_for(&repo, &c0, &c2)
        .source_commits()
        .expect("source commits");

    let hashes: Vec<&str> = commits.iter().map(|c| c.hash.as_str()).collect();
    assert_eq!(hashes, ["def456", "789abc", "abc123"]);
    assert_eq!(commits[0].author_login, "carol");
    assert_eq!(commits[0].committer_login, "web-flow");
}

#[test]
fn commits_outside_the_range_carry_no_provenance() {
    let repo = TestRepo::new();
    repo.write("README.md", "readme");
    repo.commit("Source-commit: old111 A:old C:old");
    let c1 = repo.commit("plain commit");

    let commits = detect_for(&repo, &c1, &c1)
        .source_commits()
        .expect("source commits");
    assert!(commits.is_empty());
}

#[test]
fn new_cluster_workloads_for_development_come_from_the_registry() {
    let repo = TestRepo::new();
    repo.write("flux/manifests/bar/file", "bar");
    repo.write("flux/manifests/foo/file", "foo");
    let c0 = repo.commit("initial");

    let changes = detect_for(&repo, &c0, &c0)
        .new_cluster_workloads(Env::Development, &Clusters::default())
        .expect("changes");

    assert_eq!(
        changes,
        vec![copy("manifests", "bar"), copy("manifests", "foo")]
    );
}

#[test]
fn new_cluster_workloads_for_test_come_from_previous_env_clusters() {
    let repo = TestRepo::new();
    repo.write("flux/promoted/development/dev1/cloud1/bar/file", "bar");
    repo.write("flux/promoted/development/dev2/cloud1/foo/file", "foo");
    repo.write("flux/promoted/development/dev2/cloud1/bar/file", "bar");
    let c0 = repo.commit("initial");

    let dev_clusters = Clusters::parse(&common::config_stream(&[
        common::cluster_doc("dev1", "development", "dev1", "cloud1"),
        common::cluster_doc("dev2", "development", "dev2", "cloud1"),
    ]))
    .expect("clusters");

    let changes = detect_for(&repo, &c0, &c0)
        .new_cluster_workloads(Env::Test, &dev_clusters)
        .expect("changes");

    assert_eq!(
        changes,
        vec![copy("development", "bar"), copy("development", "foo")]
    );
}
