//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Location
//!
//! Searched in order of precedence:
//! 1. `$HOOKWISE_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/hookwise/config.toml`
//! 3. `~/.hookwise/config.toml` (canonical write location)
//!
//! # Validation
//!
//! Config values are validated after parsing so a bad callback URL or
//! polling interval is reported at load time, not on first use.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Default GitHub API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Default polling interval in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Global configuration.
///
/// # Example
///
/// ```toml
/// callback_url = "https://hooks.example.com/webhooks"
/// api_base = "https://api.github.com"
/// event_source = "webhook"
///
/// [polling]
/// interval_secs = 60
///
/// [secrets]
/// provider = "file"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalConfig {
    /// Externally reachable URL every managed webhook delivers to
    pub callback_url: Option<String>,

    /// API base URL (GitHub Enterprise installs use `https://host/api/v3`)
    pub api_base: Option<String>,

    /// Which event source strategy to use
    pub event_source: Option<EventSourceKind>,

    /// Path of the subscription state file
    pub state_path: Option<PathBuf>,

    /// Polling settings (only used with `event_source = "polling"`)
    pub polling: Option<PollingConfig>,

    /// Secret storage settings
    pub secrets: Option<SecretsConfig>,
}

impl GlobalConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.callback_url {
            validate_http_url("callback_url", url)?;
        }

        if let Some(base) = &self.api_base {
            validate_http_url("api_base", base)?;
        }

        if let Some(polling) = &self.polling {
            polling.validate()?;
        }

        if let Some(secrets) = &self.secrets {
            secrets.validate()?;
        }

        Ok(())
    }
}

fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let parsed = reqwest::Url::parse(value)
        .map_err(|e| ConfigError::InvalidValue(format!("{field} '{value}' is not a URL: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::InvalidValue(format!(
            "{field} must use http or https, got '{other}'"
        ))),
    }
}

/// Event source strategy.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventSourceKind {
    /// Remote webhooks pushed to the callback URL
    #[default]
    Webhook,
    /// Periodic diff of the repository activity feed
    Polling,
}

/// Polling settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PollingConfig {
    /// Minimum seconds between polls of one repository
    pub interval_secs: Option<u64>,
}

impl PollingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == Some(0) {
            return Err(ConfigError::InvalidValue(
                "polling.interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Secrets configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SecretsConfig {
    /// Provider to use
    pub provider: Option<String>,
}

impl SecretsConfig {
    /// Valid secret providers.
    pub const VALID_PROVIDERS: &'static [&'static str] = &["file"];

    /// Validate the secrets configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(provider) = &self.provider {
            if !Self::VALID_PROVIDERS.contains(&provider.as_str()) {
                return Err(ConfigError::InvalidValue(format!(
                    "invalid secrets provider '{}', must be one of: {}",
                    provider,
                    Self::VALID_PROVIDERS.join(", ")
                )));
            }
        }
        Ok(())
    }
}
