//! secrets
//!
//! Secret storage for API tokens.
//!
//! # Architecture
//!
//! Secrets are stored through the [`SecretStore`] trait. The only provider
//! is [`FileSecretStore`], selected by `[secrets] provider = "file"`.
//!
//! # Token Resolution
//!
//! [`resolve_token`] looks in this order:
//! 1. `GITHUB_TOKEN` environment variable
//! 2. `github.token` in the secret store
//!
//! # Example
//!
//! ```ignore
//! use hookwise::secrets::{create_store, resolve_token};
//!
//! let store = create_store("file")?;
//! match resolve_token(store.as_ref(), |name| std::env::var(name).ok())? {
//!     Some(token) => { /* use token (never print it!) */ }
//!     None => eprintln!("run `hookwise auth` first"),
//! }
//! ```

mod file_store;
mod traits;

pub use file_store::FileSecretStore;
pub use traits::{SecretError, SecretStore};

/// The default secret store provider name.
pub const DEFAULT_PROVIDER: &str = "file";

/// Secret store key holding the GitHub token.
pub const GITHUB_TOKEN_KEY: &str = "github.token";

/// Environment variable that overrides the stored token.
pub const TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Where a resolved token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Environment,
    Store,
}

/// A resolved API token.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    pub value: String,
    pub source: TokenSource,
}

// Custom Debug to avoid exposing the value
impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Create a secret store based on the provider name.
///
/// # Errors
///
/// - Unknown provider name
/// - Initialization errors from the store
pub fn create_store(provider: &str) -> Result<Box<dyn SecretStore>, SecretError> {
    match provider {
        "file" => Ok(Box::new(FileSecretStore::new()?)),
        other => Err(SecretError::ProviderNotAvailable(format!(
            "unknown secret provider: '{}' (valid: file)",
            other
        ))),
    }
}

/// Find the GitHub token, preferring the environment over the store.
///
/// Empty values are treated as unset.
pub fn resolve_token<F>(store: &dyn SecretStore, env: F) -> Result<Option<Token>, SecretError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = env(TOKEN_ENV).filter(|v| !v.trim().is_empty()) {
        return Ok(Some(Token {
            value,
            source: TokenSource::Environment,
        }));
    }

    Ok(store
        .get(GITHUB_TOKEN_KEY)?
        .filter(|v| !v.trim().is_empty())
        .map(|value| Token {
            value,
            source: TokenSource::Store,
        }))
}
