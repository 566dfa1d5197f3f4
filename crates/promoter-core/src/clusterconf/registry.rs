//! Workload metadata lookup backed by the worktree.

use std::io::ErrorKind;
use std::path::PathBuf;

use tracing::debug;

use super::{ConfigError, WorkloadConfig};

const WORKLOAD_CONFIG_FILE: &str = "workload.yaml";

/// Lookup of per-workload metadata.
pub trait WorkloadRegistry {
    /// Returns the config for `workload_id`, or the zero-exclusion default
    /// when the workload carries no config file.
    ///
    /// # Errors
    ///
    /// Fails when the file exists but cannot be read or decoded, or when the
    /// decoded config is invalid.
    fn get(&self, workload_id: &str) -> Result<WorkloadConfig, ConfigError>;

    /// Enumerates every workload directory.
    ///
    /// # Errors
    ///
    /// Fails when the root directory cannot be listed or any config is
    /// invalid.
    fn get_all(&self) -> Result<Vec<WorkloadConfig>, ConfigError>;
}

/// Filesystem-backed registry rooted at `<worktree>/flux/manifests`.
pub struct FsWorkloadRegistry {
    root: PathBuf,
}

impl FsWorkloadRegistry {
    /// `root_dir` is relative to the worktree, e.g. `flux/manifests`.
    #[must_use]
    pub fn new(worktree: impl Into<PathBuf>, root_dir: &str) -> Self {
        Self {
            root: worktree.into().join(root_dir.trim_start_matches('/')),
        }
    }

    fn parse_workload(&self, workload_id: &str) -> Result<WorkloadConfig, ConfigError> {
        let path = self.root.join(workload_id).join(WORKLOAD_CONFIG_FILE);

        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(workload = workload_id, "workload seems to be missing config");
                return Ok(WorkloadConfig::named(workload_id));
            }
            Err(err) => {
                return Err(ConfigError::WorkloadLoad {
                    workload: workload_id.to_string(),
                    reason: err.to_string(),
                })
            }
        };

        if contents.trim().is_empty() {
            return Ok(WorkloadConfig::named(workload_id));
        }

        let mut config: WorkloadConfig =
            serde_yaml::from_str(&contents).map_err(|err| ConfigError::WorkloadLoad {
                workload: workload_id.to_string(),
                reason: format!("could not decode workload config file: {err}"),
            })?;
        if config.metadata.name.is_empty() {
            config.metadata.name = workload_id.to_string();
        }

        config.validate()?;
        Ok(config)
    }
}

impl WorkloadRegistry for FsWorkloadRegistry {
    fn get(&self, workload_id: &str) -> Result<WorkloadConfig, ConfigError> {
        self.parse_workload(workload_id)
    }

    fn get_all(&self) -> Result<Vec<WorkloadConfig>, ConfigError> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();

        names.iter().map(|name| self.get(name)).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn registry_with(files: &[(&str, &str)]) -> (tempfile::TempDir, FsWorkloadRegistry) {
        let dir = tempfile::tempdir().expect("tempdir");
        for (path, contents) in files {
            let full = dir.path().join(path);
            fs::create_dir_all(full.parent().expect("parent")).expect("mkdir");
            fs::write(full, contents).expect("write");
        }
        let registry = FsWorkloadRegistry::new(dir.path(), "flux/manifests");
        (dir, registry)
    }

    #[test]
    fn absent_config_file_yields_the_default() {
        let (_dir, registry) = registry_with(&[("flux/manifests/foo/deploy.yaml", "kind: Foo")]);

        let config = registry.get("foo").expect("default config");
        assert_eq!(config.name(), "foo");
        assert!(config.spec.exclusions.is_empty());
    }

    #[test]
    fn empty_config_file_yields_the_default() {
        let (_dir, registry) = registry_with(&[("flux/manifests/foo/workload.yaml", "")]);

        let config = registry.get("foo").expect("default config");
        assert_eq!(config.name(), "foo");
        assert!(config.spec.exclusions.is_empty());
    }

    #[test]
    fn parses_exclusions_from_the_config_file() {
        let (_dir, registry) = registry_with(&[(
            "flux/manifests/foo/workload.yaml",
            r#"version: v0.1
configType: Workload
metadata:
  name: foo
  description: a workload
spec:
  exclusions:
    - key: cloud
      operator: NotEqual
      value: cloud1
"#,
        )]);

        let config = registry.get("foo").expect("config");
        assert_eq!(config.name(), "foo");
        assert_eq!(config.spec.exclusions.len(), 1);
        assert_eq!(config.spec.exclusions[0].key, "cloud");
    }

    #[test]
    fn unknown_operator_fails() {
        let (_dir, registry) = registry_with(&[(
            "flux/manifests/foo/workload.yaml",
            r#"spec:
  exclusions:
    - key: cloud
      operator: Matches
      value: cloud1
"#,
        )]);

        let err = registry.get("foo").expect_err("unknown operator");
        assert_eq!(err.to_string(), "unknown operator: Matches");
    }

    #[test]
    fn get_all_lists_directories_sorted() {
        let (_dir, registry) = registry_with(&[
            ("flux/manifests/zoo/deploy.yaml", "kind: Zoo"),
            ("flux/manifests/bar/deploy.yaml", "kind: Bar"),
            ("flux/manifests/foo/workload.yaml", "metadata: { name: foo }"),
        ]);

        let all = registry.get_all().expect("all workloads");
        let names: Vec<&str> = all.iter().map(WorkloadConfig::name).collect();
        assert_eq!(names, ["bar", "foo", "zoo"]);
    }
}
