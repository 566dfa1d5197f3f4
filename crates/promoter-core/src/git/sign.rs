//! PGP commit signing through gpg.
//!
//! The ASCII-armored private key is imported into a scoped `GNUPGHOME`
//! directory that lives for the duration of the run, and git is pointed at
//! the imported key via `user.signingkey`/`commit.gpgsign` configuration.

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;
use thiserror::Error;

/// Errors raised while preparing the signing key.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SignError {
    /// The gpg binary could not be spawned.
    #[error("failed to spawn gpg: {0}")]
    Spawn(#[source] std::io::Error),

    /// A gpg invocation failed.
    #[error("gpg {op} failed: {reason}")]
    Gpg {
        /// The operation being run.
        op: &'static str,
        /// What gpg reported.
        reason: String,
    },

    /// The key ring did not contain exactly one secret key.
    #[error("unexpected number of GPG keys {count}, expected 1")]
    UnexpectedKeyCount {
        /// Number of secret keys found after import.
        count: usize,
    },

    /// Scoped key directory setup failed.
    #[error("signing key setup failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A signing key imported into a scoped gpg home.
pub struct CommitSigner {
    gnupg_home: TempDir,
    fingerprint: String,
}

impl CommitSigner {
    /// Imports the armored private key at `key_path`.
    ///
    /// # Errors
    ///
    /// Fails when the import fails or the key ring does not end up holding
    /// exactly one secret key.
    pub fn from_key_file(key_path: &Path) -> Result<Self, SignError> {
        let gnupg_home = tempfile::Builder::new().prefix("k8s-promoter-gpg").tempdir()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(
                gnupg_home.path(),
                std::fs::Permissions::from_mode(0o700),
            )?;
        }

        let import = gpg_command(gnupg_home.path())
            .arg("--import")
            .arg(key_path)
            .output()
            .map_err(SignError::Spawn)?;
        if !import.status.success() {
            return Err(SignError::Gpg {
                op: "import",
                reason: String::from_utf8_lossy(&import.stderr).trim().to_string(),
            });
        }

        let list = gpg_command(gnupg_home.path())
            .arg("--with-colons")
            .arg("--list-secret-keys")
            .output()
            .map_err(SignError::Spawn)?;
        if !list.status.success() {
            return Err(SignError::Gpg {
                op: "list-secret-keys",
                reason: String::from_utf8_lossy(&list.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&list.stdout);
        let count = stdout.lines().filter(|l| l.starts_with("sec:")).count();
        if count != 1 {
            return Err(SignError::UnexpectedKeyCount { count });
        }

        let fingerprint = stdout
            .lines()
            .find(|l| l.starts_with("fpr:"))
            .and_then(|l| l.split(':').nth(9))
            .map(str::to_string)
            .ok_or(SignError::Gpg {
                op: "list-secret-keys",
                reason: "no fingerprint record in key listing".to_string(),
            })?;

        Ok(Self {
            gnupg_home,
            fingerprint,
        })
    }

    /// git `-c` configuration enabling signing with the imported key.
    #[must_use]
    pub fn config_args(&self) -> Vec<String> {
        vec![
            "commit.gpgsign=true".to_string(),
            format!("user.signingkey={}", self.fingerprint),
        ]
    }

    /// The scoped gpg home the key lives in.
    #[must_use]
    pub fn gnupg_home(&self) -> &Path {
        self.gnupg_home.path()
    }

    /// Fingerprint of the imported key.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

fn gpg_command(home: &Path) -> Command {
    let mut cmd = Command::new("gpg");
    cmd.env("GNUPGHOME", home).arg("--batch").arg("--quiet");
    cmd
}
