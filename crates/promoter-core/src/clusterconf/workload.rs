//! Workload configuration and exclusion rules.

use serde::{Deserialize, Serialize};

use super::{ConfigError, Labels};

/// Per-workload metadata, read from `flux/manifests/<workload>/workload.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadConfig {
    #[serde(default)]
    pub version: String,
    #[serde(rename = "configType", default)]
    pub config_type: String,
    #[serde(default)]
    pub metadata: WorkloadMetadata,
    #[serde(default)]
    pub spec: WorkloadSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    #[serde(default)]
    pub exclusions: Vec<Exclusion>,
}

impl WorkloadConfig {
    /// The zero-exclusion config a workload gets when it carries no
    /// `workload.yaml`.
    #[must_use]
    pub fn named(id: &str) -> Self {
        Self {
            version: "v0.1".to_string(),
            config_type: "Workload".to_string(),
            metadata: WorkloadMetadata {
                name: id.to_string(),
                description: String::new(),
            },
            spec: WorkloadSpec::default(),
        }
    }

    /// Workload name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Checks the config invariants.
    ///
    /// # Errors
    ///
    /// Fails on a blank name, a blank exclusion key/value, or an unknown
    /// operator.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name().is_empty() {
            return Err(ConfigError::InvalidWorkload(
                "workload name must not be blank".to_string(),
            ));
        }

        for exclusion in &self.spec.exclusions {
            exclusion.validate()?;
        }
        Ok(())
    }
}

/// Exclusion rule operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Equal,
    NotEqual,
    /// Any operator name the document carried that is not recognised.
    /// Rejected by validation.
    #[serde(untagged)]
    Unknown(String),
}

/// A label-matching rule that keeps a workload off matching clusters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusion {
    #[serde(default)]
    pub key: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: String,
}

impl Exclusion {
    /// Returns whether any of `labels` matches this rule.
    #[must_use]
    pub fn excludes(&self, labels: &Labels) -> bool {
        labels.iter().any(|(key, value)| match self.operator {
            Operator::NotEqual => self.key == *key && self.value != *value,
            Operator::Equal => self.key == *key && self.value == *value,
            Operator::Unknown(_) => false,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.key.is_empty() {
            return Err(ConfigError::InvalidWorkload(
                "Exclusion.Key must not be empty".to_string(),
            ));
        }
        if self.value.is_empty() {
            return Err(ConfigError::InvalidWorkload(
                "Exclusion.Value must not be empty".to_string(),
            ));
        }
        match &self.operator {
            Operator::Equal | Operator::NotEqual => Ok(()),
            Operator::Unknown(name) => Err(ConfigError::UnknownOperator(name.clone())),
        }
    }
}
