//! Worktree filesystem operations: directory replacement, recursive walks,
//! deterministic directory hashing, and tree copies.
//!
//! Paths coming from the cluster configuration start with `/flux/...`; they
//! are always resolved relative to the worktree root via [`resolve`].

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors raised by worktree mutation and hashing.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FsError {
    /// The copy source does not exist.
    #[error("source dir '{dir}' does not exist")]
    SourceDirNotExists {
        /// The missing directory.
        dir: String,
    },

    /// The copy source contains no files.
    #[error("source dir '{dir}' has no manifests")]
    SourceDirEmpty {
        /// The empty directory.
        dir: String,
    },

    /// The copy source is not a directory.
    #[error("source '{dir}' is not a directory")]
    NotADirectory {
        /// The offending path.
        dir: String,
    },

    /// A directory walk failed.
    #[error("walk directory {dir}: {source}")]
    Walk {
        /// The directory being walked.
        dir: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Any other filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Resolves a configuration path (possibly starting with `/`) against the
/// worktree root.
#[must_use]
pub fn resolve(root: &Path, path: &str) -> PathBuf {
    root.join(path.trim_start_matches('/'))
}

/// Replaces `target_dir` with the file tree under `src_dir`.
///
/// The target is removed first, then every regular file under the source is
/// re-created under the target, creating parent directories as needed.
///
/// # Errors
///
/// Fails when the source does not exist, is not a directory, or holds no
/// files.
pub fn replace(root: &Path, src_dir: &str, target_dir: &str) -> Result<(), FsError> {
    let src = resolve(root, src_dir);
    let target = resolve(root, target_dir);

    let metadata = std::fs::metadata(&src).map_err(|_| FsError::SourceDirNotExists {
        dir: src_dir.to_string(),
    })?;
    if !metadata.is_dir() {
        return Err(FsError::NotADirectory {
            dir: src_dir.to_string(),
        });
    }

    let files = files_in_dir(&src)?;
    if files.is_empty() {
        return Err(FsError::SourceDirEmpty {
            dir: src_dir.to_string(),
        });
    }

    remove_dir_if_exists(&target)?;

    for file in files {
        let relative = file.strip_prefix(&src).unwrap_or(&file);
        let destination = target.join(relative);
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&file, &destination)?;
    }
    Ok(())
}

/// Removes a directory tree, tolerating its absence.
///
/// # Errors
///
/// Fails on any other filesystem error.
pub fn remove_dir_if_exists(path: &Path) -> Result<(), FsError> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Calls `walker` for every regular file under `base`, depth first, entries
/// visited in name order.
///
/// # Errors
///
/// Fails when a directory cannot be listed or the walker fails.
pub fn walk_files(
    base: &Path,
    walker: &mut dyn FnMut(&Path) -> Result<(), FsError>,
) -> Result<(), FsError> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(base)
        .map_err(|source| FsError::Walk {
            dir: base.display().to_string(),
            source,
        })?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| FsError::Walk {
            dir: base.display().to_string(),
            source,
        })?
        .into_iter()
        .map(|entry| entry.path())
        .collect();
    entries.sort();

    for path in entries {
        if path.is_dir() {
            walk_files(&path, walker)?;
        } else {
            walker(&path)?;
        }
    }
    Ok(())
}

/// Returns every regular file under `dir`, in walk order.
///
/// # Errors
///
/// Fails when the directory cannot be walked.
pub fn files_in_dir(dir: &Path) -> Result<Vec<PathBuf>, FsError> {
    let mut files = Vec::new();
    walk_files(dir, &mut |path| {
        files.push(path.to_path_buf());
        Ok(())
    })?;
    Ok(files)
}

/// Hashes the contents of a directory, stable over file ordering.
///
/// Every file is keyed by its path relative to the directory root; the
/// digest combines one `<content-sha256>  /<relative-path>` line per file,
/// sorted by path.
///
/// # Errors
///
/// Fails when the directory cannot be walked or a file cannot be read.
pub fn dir_hash(root: &Path, dir: &str) -> Result<String, FsError> {
    let base = resolve(root, dir);
    let files = files_in_dir(&base)?;

    let mut lines = Vec::with_capacity(files.len());
    for file in &files {
        let contents = std::fs::read(file)?;
        let content_digest = Sha256::digest(&contents);
        let relative = file
            .strip_prefix(&base)
            .unwrap_or(file)
            .to_string_lossy()
            .replace('\\', "/");
        lines.push(format!("{content_digest:x}  /{relative}\n"));
    }
    lines.sort();

    let mut hasher = Sha256::new();
    for line in lines {
        hasher.update(line.as_bytes());
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Lists the names of the immediate subdirectories of `dir`, sorted.
///
/// # Errors
///
/// Fails when the directory cannot be listed.
pub fn dirs_in_dir(root: &Path, dir: &str) -> Result<Vec<String>, FsError> {
    let base = resolve(root, dir);
    let mut names = Vec::new();
    for entry in std::fs::read_dir(&base).map_err(|source| FsError::Walk {
        dir: dir.to_string(),
        source,
    })? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Copies every file under `src` into `target`, honouring `ignore`
/// predicates keyed on the path relative to `src`. Existing files are
/// overwritten.
///
/// # Errors
///
/// Fails when the walk or a copy fails.
pub fn copy_tree(
    src: &Path,
    target: &Path,
    ignore: &[&dyn Fn(&Path) -> bool],
) -> Result<(), FsError> {
    walk_files(src, &mut |file| {
        let relative = file.strip_prefix(src).unwrap_or(file);
        if ignore.iter().any(|predicate| predicate(relative)) {
            return Ok(());
        }

        let destination = target.join(relative);
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(file, &destination)?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, contents).expect("write");
    }

    #[test]
    fn replace_copies_nested_files_and_clears_stale_target() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        write(root, "flux/manifests/foo/deploy.yaml", "new");
        write(root, "flux/manifests/foo/sub/extra.yaml", "nested");
        write(root, "target/foo/stale.yaml", "stale");

        replace(root, "/flux/manifests/foo", "target/foo").expect("replace");

        assert_eq!(
            fs::read_to_string(root.join("target/foo/deploy.yaml")).expect("copied"),
            "new"
        );
        assert_eq!(
            fs::read_to_string(root.join("target/foo/sub/extra.yaml")).expect("nested"),
            "nested"
        );
        assert!(!root.join("target/foo/stale.yaml").exists());
    }

    #[test]
    fn replace_requires_an_existing_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = replace(dir.path(), "missing", "target").expect_err("missing source");
        assert!(matches!(err, FsError::SourceDirNotExists { .. }));
    }

    #[test]
    fn replace_requires_a_non_empty_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("empty")).expect("mkdir");
        let err = replace(dir.path(), "empty", "target").expect_err("empty source");
        assert!(matches!(err, FsError::SourceDirEmpty { .. }));
    }

    #[test]
    fn dir_hash_is_stable_and_content_addressed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        write(root, "a/one/file.yaml", "same");
        write(root, "a/one/other.yaml", "other");
        write(root, "b/one/file.yaml", "same");
        write(root, "b/one/other.yaml", "other");
        write(root, "c/one/file.yaml", "different");
        write(root, "c/one/other.yaml", "other");

        let first = dir_hash(root, "a/one").expect("hash");
        let second = dir_hash(root, "b/one").expect("hash");
        let third = dir_hash(root, "c/one").expect("hash");

        assert_eq!(first, second);
        assert_ne!(first, third);
        assert_eq!(first, dir_hash(root, "a/one").expect("repeat"));
    }

    #[test]
    fn dir_hash_keys_files_by_relative_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        write(root, "a/file.yaml", "content");
        write(root, "b/renamed.yaml", "content");

        assert_ne!(
            dir_hash(root, "a").expect("hash"),
            dir_hash(root, "b").expect("hash")
        );
    }

    #[test]
    fn dirs_in_dir_lists_sorted_subdirectories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        write(root, "base/zoo/file", "x");
        write(root, "base/bar/file", "x");
        write(root, "base/top-level-file", "x");

        let names = dirs_in_dir(root, "base").expect("names");
        assert_eq!(names, ["bar", "zoo"]);
    }

    #[test]
    fn copy_tree_honours_ignore_predicates() {
        let src = tempfile::tempdir().expect("src");
        let dst = tempfile::tempdir().expect("dst");
        write(src.path(), "keep/file.yaml", "kept");
        write(src.path(), "skip/file.yaml", "skipped");

        let ignore_skip = |path: &Path| path.starts_with("skip");
        copy_tree(src.path(), dst.path(), &[&ignore_skip]).expect("copy");

        assert!(dst.path().join("keep/file.yaml").exists());
        assert!(!dst.path().join("skip/file.yaml").exists());
    }
}
