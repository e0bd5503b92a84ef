//! Loading configuration documents from disk.
//!
//! A root document may list further documents under `files`; those are merged
//! into it. Relative include paths are resolved against the working directory
//! of the process, not against the directory of the root document. When checksum
//! verification is enabled every document must be accompanied by a
//! `<file>.sha256` sidecar holding the hex encoded SHA-256 of its content.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::{Config, ConfigurationError, ConfigurationResult};

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;

/// Extension appended to a configuration file name to find its checksum.
pub const CHECKSUM_EXTENSION: &str = "sha256";

/// Reads configuration documents and resolves their includes.
///
/// # Examples
///
/// ```rust,no_run
/// use config_manager::ConfigLoader;
/// use std::path::Path;
///
/// let config = ConfigLoader::new()
///     .with_checksum_verification(true)
///     .load(Path::new("config.yaml"))
///     .unwrap();
/// println!("{} groups configured", config.groups.len());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    verify_checksums: bool,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables the `.sha256` sidecar check.
    pub fn with_checksum_verification(mut self, enabled: bool) -> Self {
        self.verify_checksums = enabled;
        self
    }

    /// Loads the root document at `path` and merges every included document.
    ///
    /// Included paths are used as written, so relative ones depend on the
    /// current working directory.
    ///
    /// # Errors
    ///
    /// * `FileAccessError` if a document cannot be read
    /// * `ParseError` if a document is not valid YAML or has unknown keys
    /// * `ChecksumMissing` / `ChecksumMismatch` when verification is enabled
    /// * `DuplicateDefinition` if two documents define the same group or project
    /// * `NestedInclude` if an included document has its own `files` list
    pub fn load(&self, path: &Path) -> ConfigurationResult<Config> {
        let mut config = self.load_document(path)?;

        for file in config.files.clone() {
            let include_path = PathBuf::from(file);
            let included = self.load_document(&include_path)?;
            if !included.files.is_empty() {
                return Err(ConfigurationError::NestedInclude {
                    path: include_path.display().to_string(),
                });
            }

            config.merge(included, &include_path.display().to_string())?;
            debug!(path = %include_path.display(), "Merged included configuration file");
        }

        info!(
            path = %path.display(),
            groups = config.groups.len(),
            projects = config.projects.len(),
            included_files = config.files.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    fn load_document(&self, path: &Path) -> ConfigurationResult<Config> {
        let content = fs::read(path).map_err(|e| ConfigurationError::FileAccessError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        if self.verify_checksums {
            verify_checksum(path, &content)?;
        }

        serde_yaml::from_slice(&content).map_err(|e| ConfigurationError::ParseError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

/// Returns the hex encoded SHA-256 of `content`.
pub fn checksum(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Returns the path of the checksum sidecar belonging to `path`.
pub fn checksum_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(CHECKSUM_EXTENSION);
    PathBuf::from(name)
}

/// Compares `content` with the checksum stored next to `path`.
///
/// Only the first whitespace separated token of the sidecar is read, so files
/// written by `sha256sum` are accepted as is.
///
/// # Errors
///
/// Returns `ChecksumMissing` if the sidecar cannot be read and
/// `ChecksumMismatch` if the digests differ.
pub fn verify_checksum(path: &Path, content: &[u8]) -> ConfigurationResult<()> {
    let sidecar = checksum_path(path);
    let stored =
        fs::read_to_string(&sidecar).map_err(|_| ConfigurationError::ChecksumMissing {
            path: path.display().to_string(),
        })?;
    let expected = stored
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    let actual = checksum(content);

    if expected != actual {
        return Err(ConfigurationError::ChecksumMismatch {
            path: path.display().to_string(),
            expected,
            actual,
        });
    }

    debug!(path = %path.display(), "Configuration checksum verified");
    Ok(())
}
