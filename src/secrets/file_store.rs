//! secrets::file_store
//!
//! TOML-file secret storage at `~/.hookwise/secrets.toml`.
//!
//! # Security
//!
//! - File permissions are set to 0600 on Unix before any content is written
//! - Writes go to a temp file that is renamed over the original
//! - Values never appear in errors or logs

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use super::traits::{SecretError, SecretStore};

type Secrets = BTreeMap<String, String>;

/// File-based secret storage.
#[derive(Debug)]
pub struct FileSecretStore {
    path: PathBuf,
}

impl FileSecretStore {
    /// Store at the default location, `~/.hookwise/secrets.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self, SecretError> {
        let home = dirs::home_dir()
            .ok_or_else(|| SecretError::ReadError("cannot determine home directory".into()))?;
        Ok(Self::with_path(home.join(".hookwise").join("secrets.toml")))
    }

    /// Store at a custom path.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Secrets, SecretError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Secrets::new()),
            Err(e) => {
                return Err(SecretError::ReadError(format!(
                    "cannot read secrets file: {}",
                    e
                )))
            }
        };

        toml::from_str(&content)
            .map_err(|_| SecretError::ReadError("cannot parse secrets file".into()))
    }

    fn save(&self, secrets: &Secrets) -> Result<(), SecretError> {
        let write_err = |what: &str, e: std::io::Error| {
            SecretError::WriteError(format!("cannot {}: {}", what, e))
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| write_err("create directory", e))?;
        }

        let content = toml::to_string_pretty(secrets)
            .map_err(|e| SecretError::WriteError(format!("cannot serialize secrets: {}", e)))?;

        let temp_path = self.path.with_extension("toml.tmp");
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .map_err(|e| write_err("create temp file", e))?;

            #[cfg(unix)]
            file.set_permissions(fs::Permissions::from_mode(0o600))
                .map_err(|e| write_err("set permissions", e))?;

            file.write_all(content.as_bytes())
                .map_err(|e| write_err("write secrets", e))?;
            file.sync_all().map_err(|e| write_err("sync to disk", e))?;
        }

        fs::rename(&temp_path, &self.path).map_err(|e| write_err("rename temp file", e))
    }

    /// Load, apply `change`, and save only when something changed.
    fn update<F>(&self, change: F) -> Result<(), SecretError>
    where
        F: FnOnce(&mut Secrets) -> bool,
    {
        let mut secrets = self.load()?;
        if change(&mut secrets) {
            self.save(&secrets)?;
        }
        Ok(())
    }
}

impl SecretStore for FileSecretStore {
    fn get(&self, key: &str) -> Result<Option<String>, SecretError> {
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SecretError> {
        self.update(|secrets| {
            secrets.insert(key.to_string(), value.to_string()).as_deref() != Some(value)
        })
    }

    fn delete(&self, key: &str) -> Result<(), SecretError> {
        self.update(|secrets| secrets.remove(key).is_some())
    }
}
