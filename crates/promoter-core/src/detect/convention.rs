//! The directory convention tracked paths must follow.
//!
//! Two layouts produce workload changes:
//! - source manifests: `flux/manifests/<workload>/<file>`
//! - promoted manifests: `flux/promoted/<env>/<cluster>/<cloud>/<workload>/<file>`
//!
//! Anything else is not a workload manifest. Promoted paths above the
//! workload level (cluster kustomizations, which are generated) are skipped
//! silently; a malformed path under `flux/manifests` is an error.

use super::{DetectError, Workload};

pub(crate) const FLUX_DIR: &str = "flux";
pub(crate) const SOURCE_MANIFEST_DIR: &str = "manifests";
pub(crate) const PROMOTED_DIR: &str = "promoted";

const SOURCE_MANIFEST_DEPTH: usize = 4;
const PROMOTED_DEPTH: usize = 7;

/// What a path means under the directory convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathClass {
    /// A file of a source-manifest workload.
    Source(Workload),
    /// A file of a promoted workload.
    Promoted(Workload),
    /// Not a workload manifest; produces no change.
    Other,
}

impl PathClass {
    /// The workload the path belongs to, if any.
    #[must_use]
    pub fn workload(self) -> Option<Workload> {
        match self {
            Self::Source(w) | Self::Promoted(w) => Some(w),
            Self::Other => None,
        }
    }
}

/// Classifies a slash-delimited repository path.
///
/// # Errors
///
/// Returns [`DetectError::UnknownPathConvention`] for a path under
/// `flux/manifests` that is too shallow to name a workload file.
pub fn classify(path: &str) -> Result<PathClass, DetectError> {
    let segments: Vec<&str> = path.split('/').collect();
    if segments.first() != Some(&FLUX_DIR) {
        return Ok(PathClass::Other);
    }

    match segments.get(1) {
        Some(&SOURCE_MANIFEST_DIR) => {
            if segments.len() < SOURCE_MANIFEST_DEPTH {
                return Err(DetectError::UnknownPathConvention {
                    path: path.to_string(),
                });
            }
            Ok(PathClass::Source(Workload {
                source_env: segments[1].to_string(),
                name: segments[2].to_string(),
            }))
        }
        Some(&PROMOTED_DIR) => {
            if segments.len() < PROMOTED_DEPTH {
                return Ok(PathClass::Other);
            }
            Ok(PathClass::Promoted(Workload {
                source_env: segments[2].to_string(),
                name: segments[5].to_string(),
            }))
        }
        _ => Ok(PathClass::Other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_manifest_paths_name_the_workload() {
        let class = classify("flux/manifests/foo/deploy.yaml").expect("source path");
        assert_eq!(
            class,
            PathClass::Source(Workload {
                source_env: "manifests".to_string(),
                name: "foo".to_string(),
            })
        );
    }

    #[test]
    fn nested_source_manifest_paths_resolve_to_the_workload() {
        let class = classify("flux/manifests/foo/overlays/prod.yaml").expect("source path");
        assert_eq!(
            class.workload().map(|w| w.name),
            Some("foo".to_string())
        );
    }

    #[test]
    fn shallow_source_manifest_paths_are_rejected() {
        let err = classify("flux/manifests/foo").expect_err("too shallow");
        assert!(matches!(err, DetectError::UnknownPathConvention { .. }));
    }

    #[test]
    fn promoted_paths_name_environment_and_workload() {
        let class =
            classify("flux/promoted/development/dev1/cloud1/foo/deploy.yaml").expect("promoted");
        assert_eq!(
            class,
            PathClass::Promoted(Workload {
                source_env: "development".to_string(),
                name: "foo".to_string(),
            })
        );
    }

    #[test]
    fn cluster_level_kustomizations_are_skipped() {
        let class =
            classify("flux/promoted/development/dev1/cloud1/kustomization.yaml").expect("skip");
        assert_eq!(class, PathClass::Other);
    }

    #[test]
    fn unrelated_paths_are_skipped() {
        assert_eq!(classify("README.md").expect("other"), PathClass::Other);
        assert_eq!(
            classify(".github/PULL_REQUEST_TEMPLATE/master.md").expect("other"),
            PathClass::Other
        );
        assert_eq!(classify("flux/config/x/y").expect("other"), PathClass::Other);
    }
}
