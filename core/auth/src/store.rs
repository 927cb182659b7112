//! File-backed credential cache.

use std::io::Write;
use std::path::{Path, PathBuf};

use gworks_common::{Error, Result};

use crate::tokens::Tokens;

/// Persists the token blob at a caller-supplied path.
///
/// The blob is created on first successful authorization, read and
/// conditionally rewritten on every check, and never deleted by this code.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Create a store bound to a credential file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default credential location under the user config directory,
    /// e.g. `~/.config/<app>/credentials.json`.
    pub fn default_path(app_name: &str) -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(app_name)
            .join("credentials.json")
    }

    /// The credential file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a credential blob exists at the path.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the stored blob.
    ///
    /// A missing file is `Ok(None)`: that is the designed trigger for the
    /// first-time authorization flow, not an error. A malformed file is a
    /// serialization error and must not be treated as "needs new auth".
    pub fn load(&self) -> Result<Option<Tokens>> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let tokens = serde_json::from_str(&data).map_err(|e| {
            Error::Serialization(format!(
                "Malformed credential file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        Ok(Some(tokens))
    }

    /// Overwrite the stored blob in full.
    ///
    /// The blob is staged in a temporary file in the target directory and
    /// renamed into place, so readers never observe a partial write.
    pub fn save(&self, tokens: &Tokens) -> Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                std::fs::create_dir_all(parent)?;
                parent
            }
            _ => Path::new("."),
        };

        let data = serde_json::to_string_pretty(tokens)
            .map_err(|e| Error::Serialization(format!("Failed to serialize tokens: {}", e)))?;

        let mut staged = tempfile::NamedTempFile::new_in(parent)?;
        staged.write_all(data.as_bytes())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(staged.path(), std::fs::Permissions::from_mode(0o600))?;
        }

        staged.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}
