//! forge::traits
//!
//! Gateway traits for the remote webhook and activity APIs.
//!
//! # Design
//!
//! Both traits are async because every call is a network round trip.
//! All methods return `Result` so transport failures reach the caller
//! intact; nothing here retries.
//!
//! The gateway is deliberately thin: it lists, creates, updates, and
//! deletes webhooks exactly as asked. Deciding *which* webhook to touch
//! (callback URL matching, tie-breaks, idempotency) belongs to
//! [`crate::subscriptions::SubscriptionManager`].
//!
//! # Example
//!
//! ```ignore
//! use hookwise::forge::{HookGateway, HookSpec};
//!
//! async fn ensure_push(gateway: &dyn HookGateway, repo: &RepositoryKey) -> Result<(), ForgeError> {
//!     let hooks = gateway.list_hooks(repo).await?;
//!     if hooks.is_empty() {
//!         let spec = HookSpec::json("https://hooks.example.com", [EventType::Push].into());
//!         gateway.create_hook(repo, &spec).await?;
//!     }
//!     Ok(())
//! }
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::core::types::{EventType, HookId, RepositoryKey};

/// Errors from forge operations.
///
/// These error types map to common failure modes when interacting
/// with the remote API.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ForgeError {
    /// Authentication is required but not available.
    #[error("authentication required")]
    AuthRequired,

    /// Authentication failed (invalid token, expired, insufficient permissions).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded.
    #[error("rate limited")]
    RateLimited,

    /// API returned an error.
    #[error("API error: {status} - {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Network or connection error.
    #[error("network error: {0}")]
    NetworkError(String),
}

/// The gateway call that was in flight when an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOperation {
    List,
    Create,
    Update,
    Delete,
}

impl fmt::Display for HookOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookOperation::List => write!(f, "list"),
            HookOperation::Create => write!(f, "create"),
            HookOperation::Update => write!(f, "update"),
            HookOperation::Delete => write!(f, "delete"),
        }
    }
}

/// A webhook as reported by the remote listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteHook {
    /// Remote identifier
    pub id: HookId,
    /// Delivery target; `None` for hooks without a URL config (e.g. apps)
    pub url: Option<String>,
    /// Subscribed event classes
    pub events: BTreeSet<EventType>,
    /// Event names reported by the remote that could not be parsed
    pub unrecognized: Vec<String>,
}

impl RemoteHook {
    pub fn new(id: HookId, url: Option<String>, events: BTreeSet<EventType>) -> Self {
        Self {
            id,
            url,
            events,
            unrecognized: Vec::new(),
        }
    }

    /// Whether this hook delivers to `callback_url`.
    pub fn targets(&self, callback_url: &str) -> bool {
        self.url.as_deref() == Some(callback_url)
    }
}

/// Desired configuration for a create or update call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookSpec {
    /// Full event set the hook should end up with
    pub events: BTreeSet<EventType>,
    /// Delivery target
    pub url: String,
    /// Payload encoding (`json` or `form`)
    pub content_type: String,
}

impl HookSpec {
    /// A JSON-encoded hook delivering `events` to `url`.
    pub fn json(url: impl Into<String>, events: BTreeSet<EventType>) -> Self {
        Self {
            events,
            url: url.into(),
            content_type: "json".to_string(),
        }
    }
}

/// Remote webhook management.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to allow use across async tasks.
///
/// # Error Handling
///
/// All methods return `Result<T, ForgeError>`. Callers should handle:
/// - `AuthRequired` / `AuthFailed`: Prompt user to authenticate
/// - `NotFound`: Repository or hook doesn't exist (or no admin access)
/// - `RateLimited`: Back off and retry
/// - `ApiError`: Display error message to user
/// - `NetworkError`: Check connectivity
#[async_trait]
pub trait HookGateway: Send + Sync {
    /// Get the gateway name (e.g., "github", "mock").
    fn name(&self) -> &'static str;

    /// List every webhook on the repository, following pagination.
    async fn list_hooks(&self, repo: &RepositoryKey) -> Result<Vec<RemoteHook>, ForgeError>;

    /// Create a webhook and return its identifier.
    async fn create_hook(&self, repo: &RepositoryKey, spec: &HookSpec)
        -> Result<HookId, ForgeError>;

    /// Replace a webhook's event set and target in a single call.
    async fn update_hook(
        &self,
        repo: &RepositoryKey,
        id: HookId,
        spec: &HookSpec,
    ) -> Result<(), ForgeError>;

    /// Delete a webhook.
    async fn delete_hook(&self, repo: &RepositoryKey, id: HookId) -> Result<(), ForgeError>;
}

/// One entry from a repository's activity feed.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityEvent {
    /// Feed entry identifier
    pub id: String,
    /// Feed event type (`IssuesEvent`, `PushEvent`, ...)
    pub event_type: String,
    /// When the activity happened
    pub created_at: DateTime<Utc>,
    /// Raw event payload
    pub payload: serde_json::Value,
}

/// The newest slice of a repository's activity feed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityPage {
    /// Events, newest first as returned by the remote
    pub events: Vec<ActivityEvent>,
    /// Minimum delay the remote asks for before the next poll
    pub poll_interval: Option<Duration>,
}

/// Repository activity feed, used by the polling event source.
#[async_trait]
pub trait ActivityFeed: Send + Sync {
    async fn repo_events(&self, repo: &RepositoryKey) -> Result<ActivityPage, ForgeError>;
}
