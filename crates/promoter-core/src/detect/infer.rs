//! Turns raw diff entries into workload changes.

use std::sync::Arc;

use super::change::{Workload, WorkloadChange};
use super::convention::{classify, FLUX_DIR, SOURCE_MANIFEST_DIR};
use super::DetectError;
use crate::git::{DiffEntry, Workspace};

/// Converts native diff entries, which are unaware of workloads, into
/// changes carrying the affected workload and the operation to apply.
pub struct Inferer {
    ws: Arc<Workspace>,
    to_ref: String,
}

impl Inferer {
    #[must_use]
    pub fn new(ws: Arc<Workspace>, to_ref: impl Into<String>) -> Self {
        Self {
            ws,
            to_ref: to_ref.into(),
        }
    }

    /// Infers the changes implied by one diff entry. Non-workload paths
    /// yield no change.
    ///
    /// # Errors
    ///
    /// Fails on a malformed source-manifest path or a git probe failure.
    pub fn workload_changes(&self, entry: &DiffEntry) -> Result<Vec<WorkloadChange>, DetectError> {
        match (entry.from_path.as_deref(), entry.to_path.as_deref()) {
            (None, Some(to)) => self.addition(to),
            (Some(from), None) => self.deletion(from),
            (Some(from), Some(to)) if from == to => self.modification(from),
            (Some(from), Some(to)) => self.rename(from, to),
            (None, None) => Ok(Vec::new()),
        }
    }

    fn addition(&self, to: &str) -> Result<Vec<WorkloadChange>, DetectError> {
        let Some(workload) = classify(to)?.workload() else {
            return Ok(Vec::new());
        };
        Ok(vec![WorkloadChange::copy(workload)])
    }

    /// A deleted path is a real removal only when the workload no longer
    /// exists under the source manifests; otherwise the file merely moved
    /// and the workload is re-copied.
    fn deletion(&self, from: &str) -> Result<Vec<WorkloadChange>, DetectError> {
        let Some(workload) = classify(from)?.workload() else {
            return Ok(Vec::new());
        };

        let change = if self.workload_exists(&workload)? {
            WorkloadChange::copy(workload)
        } else {
            WorkloadChange::remove(workload)
        };
        Ok(vec![change])
    }

    fn modification(&self, path: &str) -> Result<Vec<WorkloadChange>, DetectError> {
        let Some(workload) = classify(path)?.workload() else {
            return Ok(Vec::new());
        };
        Ok(vec![WorkloadChange::copy(workload)])
    }

    fn rename(&self, from: &str, to: &str) -> Result<Vec<WorkloadChange>, DetectError> {
        let Some(from_workload) = classify(from)?.workload() else {
            return Ok(Vec::new());
        };
        let Some(to_workload) = classify(to)?.workload() else {
            return Ok(Vec::new());
        };

        // rename of a manifest within the same workload
        if from_workload == to_workload {
            return Ok(vec![WorkloadChange::copy(to_workload)]);
        }

        if self.workload_exists(&from_workload)? {
            // manifest moved between workloads
            Ok(vec![
                WorkloadChange::copy(from_workload),
                WorkloadChange::copy(to_workload),
            ])
        } else {
            // the whole workload was renamed
            Ok(vec![
                WorkloadChange::remove(from_workload),
                WorkloadChange::copy(to_workload),
            ])
        }
    }

    fn workload_exists(&self, workload: &Workload) -> Result<bool, DetectError> {
        let path = format!("{FLUX_DIR}/{SOURCE_MANIFEST_DIR}/{}", workload.name);
        Ok(self.ws.tree_exists(&self.to_ref, &path)?)
    }
}
