//! Cluster documents and filter combinators.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{ConfigError, WorkloadConfig};
use crate::environment::Env;

/// Cluster labels. Ordered so that derived output is deterministic.
pub type Labels = BTreeMap<String, String>;

/// One document of the cluster configuration stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    #[serde(default)]
    pub version: String,
    #[serde(rename = "configType", default)]
    pub config_type: String,
    #[serde(default)]
    pub metadata: ClusterMetadata,
    #[serde(default)]
    pub spec: ClusterSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub labels: Labels,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    #[serde(rename = "manifestFolder", default)]
    pub manifest_folder: String,
    #[serde(rename = "configFolder", default)]
    pub config_folder: String,
}

impl Cluster {
    /// Cluster name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Folder the promoted workload manifests live under.
    #[must_use]
    pub fn manifest_folder(&self) -> &str {
        &self.spec.manifest_folder
    }

    /// Folder the tenant configuration lives under.
    #[must_use]
    pub fn config_folder(&self) -> &str {
        &self.spec.config_folder
    }

    /// The cluster's `environment` label, when present.
    #[must_use]
    pub fn environment(&self) -> Option<&str> {
        self.metadata.labels.get("environment").map(String::as_str)
    }

    /// Path of a workload's manifests inside this cluster.
    #[must_use]
    pub fn workload_path(&self, workload: &str) -> String {
        format!("{}/{workload}", self.spec.manifest_folder.trim_end_matches('/'))
    }

    /// A workload is allowed unless one of its exclusions matches the
    /// cluster labels. A zero-exclusion config always passes.
    #[must_use]
    pub fn allow_workload(&self, config: &WorkloadConfig) -> bool {
        !config
            .spec
            .exclusions
            .iter()
            .any(|exclusion| exclusion.excludes(&self.metadata.labels))
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.name().is_empty() {
            return Err(ConfigError::InvalidCluster("name is required".to_string()));
        }
        if self.spec.manifest_folder.is_empty() {
            return Err(ConfigError::InvalidCluster(
                "manifestFolder is required".to_string(),
            ));
        }
        Env::promotable(self.environment().unwrap_or_default())?;
        Ok(())
    }
}

/// An ordered list of clusters, in configuration document order.
///
/// Document order is load-bearing: the source cluster for a copy is the
/// first previous-environment cluster that admits the workload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clusters(Vec<Cluster>);

impl Clusters {
    #[must_use]
    pub fn new(clusters: Vec<Cluster>) -> Self {
        Self(clusters)
    }

    /// Parses a multi-document YAML stream, validating every document.
    ///
    /// # Errors
    ///
    /// Fails on the first document that does not decode or breaks a cluster
    /// invariant.
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let mut clusters = Vec::new();
        for document in serde_yaml::Deserializer::from_str(input) {
            let cluster = Cluster::deserialize(document)?;
            cluster.validate()?;
            clusters.push(cluster);
        }
        Ok(Self(clusters))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Cluster> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn first(&self) -> Option<&Cluster> {
        self.0.first()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|cluster| cluster.name() == name)
    }

    /// Returns the clusters matching `predicate`, preserving order.
    #[must_use]
    pub fn filter(&self, predicate: impl Fn(&Cluster) -> bool) -> Self {
        Self(self.0.iter().filter(|c| predicate(c)).cloned().collect())
    }

    /// Clusters whose `environment` label equals `environment`.
    #[must_use]
    pub fn by_environment(&self, environment: &str) -> Self {
        self.filter(|cluster| cluster.environment() == Some(environment))
    }

    /// Clusters that admit the workload under its exclusion rules.
    #[must_use]
    pub fn allowing_workload(&self, config: &WorkloadConfig) -> Self {
        self.filter(|cluster| cluster.allow_workload(config))
    }

    /// Clusters not present (by name) in `other`.
    #[must_use]
    pub fn without(&self, other: &Self) -> Self {
        self.filter(|cluster| !other.contains(cluster.name()))
    }

    /// Groups clusters into pull-request units: all development clusters
    /// together, test/production clusters one per group.
    #[must_use]
    pub fn group(&self, target: Env) -> Vec<Self> {
        if target == Env::Development {
            return vec![self.clone()];
        }

        self.0
            .iter()
            .map(|cluster| Self(vec![cluster.clone()]))
            .collect()
    }
}

impl<'a> IntoIterator for &'a Clusters {
    type Item = &'a Cluster;
    type IntoIter = std::slice::Iter<'a, Cluster>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<Cluster> for Clusters {
    fn from_iter<T: IntoIterator<Item = Cluster>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
