//! Cluster configuration document and workload metadata.
//!
//! The cluster configuration is a multi-document YAML stream fetched from a
//! separate repository; workload metadata lives next to the manifests in the
//! promoted repository itself.

use thiserror::Error;

use crate::environment::EnvironmentError;

pub mod cluster;
pub mod inspecter;
pub mod registry;
pub mod workload;

pub use cluster::{Cluster, Clusters, Labels};
pub use inspecter::{ClusterDetection, ClusterInspecter};
pub use registry::{FsWorkloadRegistry, WorkloadRegistry};
pub use workload::{Exclusion, Operator, WorkloadConfig};

/// Top-level directory every tracked manifest sits under.
pub const TOP_LEVEL_DIR: &str = "flux";

/// Returns `path` prefixed with the top-level directory segment.
#[must_use]
pub fn flux_path(path: &str) -> String {
    format!("/{TOP_LEVEL_DIR}/{}", path.trim_start_matches('/'))
}

/// Errors raised while parsing or evaluating configuration documents.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A YAML document failed to decode.
    #[error("could not read config file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A cluster document failed its invariants.
    #[error("invalid cluster document: {0}")]
    InvalidCluster(String),

    /// The cluster's environment label is not promotable.
    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    /// A workload exclusion names an operator that is not recognised.
    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    /// A workload config failed its invariants.
    #[error("invalid workload config: {0}")]
    InvalidWorkload(String),

    /// A workload config file could not be read or decoded.
    #[error("error loading workload '{workload}': {reason}")]
    WorkloadLoad {
        /// The workload identifier.
        workload: String,
        /// What went wrong.
        reason: String,
    },

    /// A filesystem probe failed.
    #[error("inspect cluster folders: {0}")]
    Io(#[from] std::io::Error),
}
