//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`RepositoryKey`] - Validated `owner/name` pair
//! - [`EventType`] - Remote webhook event class (`issues`, `push`, ...)
//! - [`EventKind`] - Symbolic event a subscriber cares about (`issueOpened`, ...)
//! - [`EventKey`] - Kind plus the scope it was raised on
//! - [`HookId`] - Opaque remote webhook identifier
//! - [`WebhookRecord`] - Local mirror of one managed remote webhook
//!
//! # Validation
//!
//! These types enforce validity at construction time. Invalid values
//! cannot be represented, preventing entire classes of bugs.
//!
//! # Examples
//!
//! ```
//! use hookwise::core::types::{EventKind, EventType, RepositoryKey};
//!
//! let repo: RepositoryKey = "octocat/hello-world".parse().unwrap();
//! assert_eq!(repo.owner(), "octocat");
//! assert_eq!(EventKind::IssueClosed.event_type(), EventType::Issues);
//!
//! assert!(RepositoryKey::new("octocat", "").is_err());
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid repository: {0}")]
    InvalidRepository(String),

    #[error("invalid event type: {0}")]
    InvalidEventType(String),

    #[error("unknown event kind: {0}")]
    UnknownEventKind(String),

    #[error("unknown issue kind: {0} (expected issue or pr)")]
    UnknownIssueKind(String),
}

/// A validated `(owner, name)` repository identifier.
///
/// Case is preserved exactly; the remote service decides whether
/// `Octocat/Hello` and `octocat/hello` name the same repository, so two keys
/// only compare equal when they are byte-identical.
///
/// # Example
///
/// ```
/// use hookwise::core::types::RepositoryKey;
///
/// let key = RepositoryKey::new("octocat", "hello-world").unwrap();
/// assert_eq!(key.to_string(), "octocat/hello-world");
///
/// assert!(RepositoryKey::new("octo cat", "repo").is_err());
/// assert!(RepositoryKey::new("octocat", "a/b").is_err());
/// assert!("no-slash".parse::<RepositoryKey>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepositoryKey {
    owner: String,
    name: String,
}

impl RepositoryKey {
    /// Create a new validated repository key.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidRepository` if either part is empty or
    /// contains `/`, whitespace, or control characters.
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Result<Self, TypeError> {
        let owner = owner.into();
        let name = name.into();
        Self::validate_part("owner", &owner)?;
        Self::validate_part("name", &name)?;
        Ok(Self { owner, name })
    }

    fn validate_part(label: &str, value: &str) -> Result<(), TypeError> {
        if value.is_empty() {
            return Err(TypeError::InvalidRepository(format!(
                "{label} cannot be empty"
            )));
        }
        if value.contains('/') {
            return Err(TypeError::InvalidRepository(format!(
                "{label} cannot contain '/'"
            )));
        }
        if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(TypeError::InvalidRepository(format!(
                "{label} cannot contain whitespace or control characters"
            )));
        }
        Ok(())
    }

    /// The owning user or organization.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The repository name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for RepositoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepositoryKey {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (owner, name) = s.split_once('/').ok_or_else(|| {
            TypeError::InvalidRepository(format!("expected 'owner/name', got '{s}'"))
        })?;
        Self::new(owner, name)
    }
}

impl TryFrom<String> for RepositoryKey {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RepositoryKey> for String {
    fn from(key: RepositoryKey) -> Self {
        key.to_string()
    }
}

/// Remote webhook event class.
///
/// This is the vocabulary the remote service records on a webhook's event
/// list. It is open-ended: names this crate has no variant for are carried
/// through as [`EventType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EventType {
    Issues,
    PullRequest,
    Push,
    Release,
    IssueComment,
    Other(String),
}

impl EventType {
    /// Parse a remote event name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidEventType` for an empty name or one
    /// containing whitespace.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        if name.is_empty() {
            return Err(TypeError::InvalidEventType(
                "event type cannot be empty".into(),
            ));
        }
        if name.chars().any(char::is_whitespace) {
            return Err(TypeError::InvalidEventType(format!(
                "event type cannot contain whitespace: '{name}'"
            )));
        }
        let known = match name.as_str() {
            "issues" => Some(EventType::Issues),
            "pull_request" => Some(EventType::PullRequest),
            "push" => Some(EventType::Push),
            "release" => Some(EventType::Release),
            "issue_comment" => Some(EventType::IssueComment),
            _ => None,
        };
        Ok(known.unwrap_or(EventType::Other(name)))
    }

    /// The remote event name.
    pub fn as_str(&self) -> &str {
        match self {
            EventType::Issues => "issues",
            EventType::PullRequest => "pull_request",
            EventType::Push => "push",
            EventType::Release => "release",
            EventType::IssueComment => "issue_comment",
            EventType::Other(name) => name,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for EventType {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EventType> for String {
    fn from(event: EventType) -> Self {
        event.as_str().to_string()
    }
}

/// Symbolic event a subscriber can listen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    IssueOpened,
    IssueClosed,
    PullRequestOpened,
    PullRequestClosed,
    Push,
    ReleasePublished,
    CommentCreated,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [EventKind; 7] = [
        EventKind::IssueOpened,
        EventKind::IssueClosed,
        EventKind::PullRequestOpened,
        EventKind::PullRequestClosed,
        EventKind::Push,
        EventKind::ReleasePublished,
        EventKind::CommentCreated,
    ];

    /// The remote webhook event class that delivers this kind.
    pub fn event_type(self) -> EventType {
        match self {
            EventKind::IssueOpened | EventKind::IssueClosed => EventType::Issues,
            EventKind::PullRequestOpened | EventKind::PullRequestClosed => EventType::PullRequest,
            EventKind::Push => EventType::Push,
            EventKind::ReleasePublished => EventType::Release,
            EventKind::CommentCreated => EventType::IssueComment,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::IssueOpened => "issueOpened",
            EventKind::IssueClosed => "issueClosed",
            EventKind::PullRequestOpened => "pullRequestOpened",
            EventKind::PullRequestClosed => "pullRequestClosed",
            EventKind::Push => "push",
            EventKind::ReleasePublished => "releasePublished",
            EventKind::CommentCreated => "commentCreated",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| TypeError::UnknownEventKind(s.to_string()))
    }
}

/// Where an event was raised.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "camelCase")]
pub enum EventScope {
    /// Raised on the repository itself.
    Repository { repository: RepositoryKey },
    /// Raised on a numbered resource inside the repository (issue, pull request).
    Resource {
        repository: RepositoryKey,
        number: u64,
    },
}

impl EventScope {
    pub fn repository(&self) -> &RepositoryKey {
        match self {
            EventScope::Repository { repository } | EventScope::Resource { repository, .. } => {
                repository
            }
        }
    }
}

/// An event kind bound to its scope.
///
/// # Example
///
/// ```
/// use hookwise::core::types::{EventKey, EventKind, EventScope, RepositoryKey};
///
/// let repo = RepositoryKey::new("octocat", "hello-world").unwrap();
/// let key = EventKey::resource(EventKind::IssueClosed, repo.clone(), 42);
/// assert_eq!(key.scope.repository(), &repo);
/// assert_eq!(key.to_string(), "issueClosed@octocat/hello-world#42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventKey {
    pub kind: EventKind,
    #[serde(flatten)]
    pub scope: EventScope,
}

impl EventKey {
    /// Key for an event raised on the repository.
    pub fn repository(kind: EventKind, repository: RepositoryKey) -> Self {
        Self {
            kind,
            scope: EventScope::Repository { repository },
        }
    }

    /// Key for an event raised on a numbered resource.
    pub fn resource(kind: EventKind, repository: RepositoryKey, number: u64) -> Self {
        Self {
            kind,
            scope: EventScope::Resource { repository, number },
        }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            EventScope::Repository { repository } => write!(f, "{}@{}", self.kind, repository),
            EventScope::Resource { repository, number } => {
                write!(f, "{}@{}#{}", self.kind, repository, number)
            }
        }
    }
}

/// Opaque remote webhook identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HookId(pub u64);

impl fmt::Display for HookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Local mirror of one managed remote webhook.
///
/// Exactly one record exists per repository with at least one active
/// subscription; `events` is never empty for a stored record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookRecord {
    pub id: HookId,
    pub url: String,
    pub events: BTreeSet<EventType>,
}

impl WebhookRecord {
    pub fn new(id: HookId, url: impl Into<String>, events: BTreeSet<EventType>) -> Self {
        Self {
            id,
            url: url.into(),
            events,
        }
    }
}
