//! core::config
//!
//! Configuration schema and loading.
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Global config file
//! 3. Environment overrides (`HOOKWISE_CALLBACK_URL`)
//! 4. CLI flags (not handled here)
//!
//! # Config Locations
//!
//! Searched in order:
//! 1. `$HOOKWISE_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/hookwise/config.toml`
//! 3. `~/.hookwise/config.toml` (canonical write location)
//!
//! # Example
//!
//! ```no_run
//! use hookwise::core::config::Config;
//!
//! let config = Config::load().unwrap();
//! println!("API: {}", config.api_base());
//! if let Some(url) = config.callback_url() {
//!     println!("Webhooks deliver to {}", url);
//! }
//! ```

pub mod schema;

pub use schema::{
    EventSourceKind, GlobalConfig, PollingConfig, SecretsConfig, DEFAULT_API_BASE,
    DEFAULT_POLL_INTERVAL_SECS,
};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "HOOKWISE_CONFIG";

/// Environment variable overriding the configured callback URL.
pub const CALLBACK_URL_ENV: &str = "HOOKWISE_CALLBACK_URL";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("failed to write config file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("home directory not found")]
    NoHomeDir,
}

/// Loaded configuration with accessors that apply defaults.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Parsed file contents (plus environment overrides)
    pub global: GlobalConfig,
    /// Path the configuration was loaded from, if any
    path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default locations and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or if
    /// any value fails validation. A missing file is not an error.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::locate() {
            Some(path) => Self::load_file(&path)?,
            None => Config::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Load and validate a specific config file.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let global: GlobalConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        global.validate()?;

        Ok(Config {
            global,
            path: Some(path.to_path_buf()),
        })
    }

    /// Find the config file to load, if any exists.
    fn locate() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("hookwise/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        dirs::home_dir()
            .map(|home| home.join(".hookwise/config.toml"))
            .filter(|path| path.exists())
    }

    /// Apply environment overrides using the given lookup.
    ///
    /// Takes a lookup function rather than reading the process environment
    /// directly so overrides can be exercised without mutating global state.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(CALLBACK_URL_ENV).filter(|u| !u.is_empty()) {
            self.global.callback_url = Some(url);
        }
        self.global.validate()
    }

    /// Get the canonical path for the config file.
    ///
    /// Returns `~/.hookwise/config.toml`.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".hookwise/config.toml"))
    }

    /// Write configuration atomically to `path`.
    ///
    /// Creates parent directories if needed. Uses atomic write
    /// (write to temp file, then rename) to prevent corruption.
    pub fn write(path: &Path, config: &GlobalConfig) -> Result<(), ConfigError> {
        config.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let contents =
            toml::to_string_pretty(config).map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

        let temp_path = path.with_extension("toml.tmp");
        let mut file = fs::File::create(&temp_path).map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;

        file.write_all(contents.as_bytes())
            .map_err(|e| ConfigError::WriteError {
                path: temp_path.clone(),
                source: e,
            })?;

        file.sync_all().map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;

        fs::rename(&temp_path, path).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }

    // =========================================================================
    // Accessor methods with defaults
    // =========================================================================

    /// The callback URL managed webhooks deliver to, if configured.
    pub fn callback_url(&self) -> Option<&str> {
        self.global.callback_url.as_deref()
    }

    /// The API base URL.
    ///
    /// Defaults to `https://api.github.com`.
    pub fn api_base(&self) -> &str {
        self.global.api_base.as_deref().unwrap_or(DEFAULT_API_BASE)
    }

    /// The selected event source strategy.
    ///
    /// Defaults to webhooks.
    pub fn event_source(&self) -> EventSourceKind {
        self.global.event_source.unwrap_or_default()
    }

    /// Minimum interval between activity feed polls.
    pub fn poll_interval(&self) -> Duration {
        let secs = self
            .global
            .polling
            .as_ref()
            .and_then(|p| p.interval_secs)
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
        Duration::from_secs(secs)
    }

    /// Path of the subscription state file.
    ///
    /// Defaults to `~/.hookwise/subscriptions.json`.
    pub fn state_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.global.state_path {
            Some(path) => Ok(path.clone()),
            None => {
                let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
                Ok(home.join(".hookwise/subscriptions.json"))
            }
        }
    }

    /// Get the secrets provider.
    ///
    /// Defaults to "file" if not configured.
    pub fn secrets_provider(&self) -> &str {
        self.global
            .secrets
            .as_ref()
            .and_then(|s| s.provider.as_deref())
            .unwrap_or("file")
    }

    /// Get the path the configuration was loaded from.
    pub fn loaded_from(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
