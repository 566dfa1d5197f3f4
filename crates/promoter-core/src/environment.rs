//! Environment chain for the manifest repository.
//!
//! Environments form a linear promotion chain: `manifests` (the authoring
//! tree) feeds `development`, which feeds `test`, which feeds `production`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when resolving or validating environments.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum EnvironmentError {
    /// The environment has no manifest source.
    #[error("{0}: unknown environment")]
    Unknown(String),

    /// The name is not a promotable environment.
    #[error("env '{0}' is not one of development, test, production")]
    Invalid(String),
}

/// An environment in the promotion chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Env {
    /// Not an environment, but the source of all manifests.
    #[serde(rename = "manifests")]
    SourceManifest,
    /// First promoted environment.
    Development,
    Test,
    Production,
}

impl Env {
    /// Returns the wire/directory name of the environment.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SourceManifest => "manifests",
            Self::Development => "development",
            Self::Test => "test",
            Self::Production => "production",
        }
    }

    /// Parses a promotable environment name (`development`, `test`,
    /// `production`).
    ///
    /// # Errors
    ///
    /// Returns [`EnvironmentError::Invalid`] for any other name, including
    /// `manifests`.
    pub fn promotable(name: &str) -> Result<Self, EnvironmentError> {
        match name {
            "development" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            "production" => Ok(Self::Production),
            other => Err(EnvironmentError::Invalid(other.to_string())),
        }
    }

    /// Returns the environment whose manifests feed this one.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironmentError::Unknown`] when the environment has no
    /// source (the authoring tree itself).
    pub fn manifest_source(self) -> Result<Self, EnvironmentError> {
        match self {
            Self::Production => Ok(Self::Test),
            Self::Test => Ok(Self::Development),
            Self::Development => Ok(Self::SourceManifest),
            Self::SourceManifest => {
                Err(EnvironmentError::Unknown(self.as_str().to_string()))
            }
        }
    }
}

impl std::fmt::Display for Env {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
