//! Generated kustomization index files and new-cluster config seeding.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use tracing::{debug, info};

use crate::clusterconf::{Cluster, Clusters};
use crate::filesystem::{self, FsError};

/// Name of the generated index file.
pub const KUSTOMIZATION_FILE: &str = "kustomization.yaml";

/// Placeholder content for a seeded workload config file.
pub const CONFIG_CONTENT: &str = "# Please add tenant configuration\n";

/// Skeleton kustomization seeded into a new cluster's config folder.
pub const CLUSTER_KUSTOMIZATION: &str = "---\n\
apiVersion: kustomize.config.k8s.io/v1beta1\n\
kind: Kustomization\n\
generatorOptions:\n    disableNameSuffixHash: true\n";

/// Regenerates the kustomization index of a cluster's manifest folder.
///
/// The index lists the immediate subdirectories, sorted lexicographically.
/// When the folder holds no workload directories, any existing index file is
/// deleted instead.
///
/// # Errors
///
/// Fails when the folder cannot be listed or the file cannot be written.
pub fn write_workload_index(root: &Path, cluster: &Cluster) -> Result<(), FsError> {
    let dir_names = filesystem::dirs_in_dir(root, cluster.manifest_folder())?;

    let index_path = filesystem::resolve(
        root,
        &format!("{}/{KUSTOMIZATION_FILE}", cluster.manifest_folder()),
    );

    if dir_names.is_empty() {
        debug!(path = %index_path.display(), "deleting kustomization.yaml");
        return match std::fs::remove_file(&index_path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        };
    }

    debug!(path = %index_path.display(), "updating kustomization.yaml");
    std::fs::write(&index_path, render_index(&dir_names))?;
    Ok(())
}

fn render_index(dir_names: &[String]) -> String {
    let mut out = String::from(
        "---\napiVersion: kustomize.config.k8s.io/v1beta1\nkind: Kustomization\nresources:",
    );
    for name in dir_names {
        let _ = write!(out, "\n  - ./{name}");
    }
    out.push('\n');
    out
}

/// Seeds the config folder of each newly promoted cluster with one
/// placeholder config file per workload and a skeleton kustomization.
/// Existing files are never overwritten.
///
/// # Errors
///
/// Fails when a file cannot be created.
pub fn seed_cluster_config(
    root: &Path,
    clusters: &Clusters,
    workloads_per_cluster: &BTreeMap<String, Vec<String>>,
) -> Result<(), FsError> {
    for cluster in clusters {
        let Some(workloads) = workloads_per_cluster.get(cluster.name()) else {
            continue;
        };

        for workload in workloads {
            let config_path = filesystem::resolve(
                root,
                &format!("{}/{workload}-config.yaml", cluster.config_folder()),
            );
            write_if_absent(&config_path, CONFIG_CONTENT)?;
        }

        let kustomization_path = filesystem::resolve(
            root,
            &format!("{}/{KUSTOMIZATION_FILE}", cluster.config_folder()),
        );
        write_if_absent(&kustomization_path, CLUSTER_KUSTOMIZATION)?;
    }

    info!("Added kustomization.yaml and config files for new cluster");
    Ok(())
}

fn write_if_absent(path: &Path, contents: &str) -> Result<(), FsError> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)?;
    Ok(())
}
