//! Workload change tuples.

use std::collections::HashSet;

/// What is done to a workload on the target clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Copy,
    Remove,
}

impl Operation {
    /// Canonical spelling, as written into logs and compared in tests.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Copy => "Copy",
            Self::Remove => "Remove",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A workload as observed in a diff: its name plus the environment the
/// change was observed in (`manifests`, `development`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Workload {
    /// Environment the diff was observed in.
    pub source_env: String,
    /// Workload name.
    pub name: String,
}

/// A change to be conducted over a given workload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkloadChange {
    pub op: Operation,
    pub workload: Workload,
}

impl WorkloadChange {
    #[must_use]
    pub fn copy(workload: Workload) -> Self {
        Self {
            op: Operation::Copy,
            workload,
        }
    }

    #[must_use]
    pub fn remove(workload: Workload) -> Self {
        Self {
            op: Operation::Remove,
            workload,
        }
    }
}

/// Collapses a multiset of changes to a set (identical tuples deduplicated,
/// first occurrence kept) ordered by workload name.
#[must_use]
pub fn distinct(changes: Vec<WorkloadChange>) -> Vec<WorkloadChange> {
    let mut seen = HashSet::new();
    let mut unique: Vec<WorkloadChange> = changes
        .into_iter()
        .filter(|change| seen.insert(change.clone()))
        .collect();

    unique.sort_by(|a, b| a.workload.name.cmp(&b.workload.name));
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(op: Operation, env: &str, name: &str) -> WorkloadChange {
        WorkloadChange {
            op,
            workload: Workload {
                source_env: env.to_string(),
                name: name.to_string(),
            },
        }
    }

    #[test]
    fn identical_tuples_are_deduplicated() {
        let changes = distinct(vec![
            change(Operation::Copy, "manifests", "foo"),
            change(Operation::Copy, "manifests", "foo"),
            change(Operation::Copy, "manifests", "bar"),
        ]);
        assert_eq!(
            changes,
            vec![
                change(Operation::Copy, "manifests", "bar"),
                change(Operation::Copy, "manifests", "foo"),
            ]
        );
    }

    #[test]
    fn differing_operations_on_one_workload_both_survive() {
        let changes = distinct(vec![
            change(Operation::Remove, "development", "foo"),
            change(Operation::Copy, "development", "foo"),
        ]);
        assert_eq!(changes.len(), 2);
    }

    #[test]
    fn output_is_sorted_by_workload_name() {
        let changes = distinct(vec![
            change(Operation::Copy, "manifests", "zoo"),
            change(Operation::Copy, "manifests", "abc"),
            change(Operation::Copy, "manifests", "mid"),
        ]);
        let names: Vec<&str> = changes.iter().map(|c| c.workload.name.as_str()).collect();
        assert_eq!(names, ["abc", "mid", "zoo"]);
    }
}
