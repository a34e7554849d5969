//! events::classify
//!
//! Classification of inbound webhook deliveries into event keys.
//!
//! # Rules
//!
//! | Payload                                      | Kind                | Scope                |
//! |----------------------------------------------|---------------------|----------------------|
//! | `action=opened`, `issue`                     | `issueOpened`       | repository           |
//! | `action=closed`, `issue`, no `comment`       | `issueClosed`       | issue number         |
//! | `action=opened`, `pull_request`              | `pullRequestOpened` | repository           |
//! | `action=closed`, `pull_request`              | `pullRequestClosed` | pull request number  |
//! | `action=published` or `created`, `release`   | `releasePublished`  | repository           |
//! | `action=created`, `comment`, `issue`         | `commentCreated`    | issue number and repository |
//! | `pusher`                                     | `push`              | repository           |
//!
//! A payload without a `repository` is an error. A well-formed payload that
//! matches no rule classifies to nothing.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::dispatch::{DeliveredEvent, EventDispatcher};
use crate::core::types::{EventKey, EventKind, RepositoryKey, TypeError};

/// Errors from classifying an inbound delivery.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload has no repository")]
    MissingRepository,

    #[error("payload repository is invalid: {0}")]
    InvalidRepository(#[from] TypeError),
}

#[derive(Debug, Deserialize)]
struct InboundPayload {
    action: Option<String>,
    repository: Option<PayloadRepository>,
    issue: Option<Numbered>,
    pull_request: Option<Numbered>,
    release: Option<Value>,
    comment: Option<Value>,
    pusher: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct PayloadRepository {
    owner: PayloadOwner,
    name: String,
}

#[derive(Debug, Deserialize)]
struct PayloadOwner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct Numbered {
    number: u64,
}

/// Classify a delivery payload.
///
/// Returns the repository the delivery belongs to and every event key it
/// raises, in table order.
///
/// # Example
///
/// ```
/// use hookwise::core::types::EventKind;
/// use hookwise::events::classify;
/// use serde_json::json;
///
/// let payload = json!({
///     "action": "closed",
///     "issue": {"number": 42},
///     "repository": {"name": "hello", "owner": {"login": "octocat"}}
/// });
/// let (repo, keys) = classify(&payload).unwrap();
/// assert_eq!(repo.to_string(), "octocat/hello");
/// assert_eq!(keys[0].kind, EventKind::IssueClosed);
/// ```
pub fn classify(payload: &Value) -> Result<(RepositoryKey, Vec<EventKey>), ClassifyError> {
    let inbound = InboundPayload::deserialize(payload)?;
    let repository = inbound.repository.ok_or(ClassifyError::MissingRepository)?;
    let repo = RepositoryKey::new(repository.owner.login, repository.name)?;

    let action = inbound.action.as_deref();
    let mut keys = Vec::new();

    if let Some(issue) = &inbound.issue {
        match action {
            Some("opened") => keys.push(EventKey::repository(EventKind::IssueOpened, repo.clone())),
            Some("closed") if inbound.comment.is_none() => keys.push(EventKey::resource(
                EventKind::IssueClosed,
                repo.clone(),
                issue.number,
            )),
            _ => {}
        }
    }

    if let Some(pull) = &inbound.pull_request {
        match action {
            Some("opened") => keys.push(EventKey::repository(
                EventKind::PullRequestOpened,
                repo.clone(),
            )),
            Some("closed") => keys.push(EventKey::resource(
                EventKind::PullRequestClosed,
                repo.clone(),
                pull.number,
            )),
            _ => {}
        }
    }

    if inbound.release.is_some() && matches!(action, Some("published" | "created")) {
        keys.push(EventKey::repository(EventKind::ReleasePublished, repo.clone()));
    }

    if let (Some("created"), Some(_), Some(issue)) = (action, &inbound.comment, &inbound.issue) {
        keys.push(EventKey::resource(
            EventKind::CommentCreated,
            repo.clone(),
            issue.number,
        ));
        keys.push(EventKey::repository(EventKind::CommentCreated, repo.clone()));
    }

    if inbound.pusher.is_some() {
        keys.push(EventKey::repository(EventKind::Push, repo.clone()));
    }

    Ok((repo, keys))
}

/// Entry point for raw webhook deliveries.
///
/// Parses the body, classifies it, and emits every resulting event to the
/// dispatcher against one shared payload.
#[derive(Clone)]
pub struct InboundHandler {
    dispatcher: Arc<dyn EventDispatcher>,
}

impl std::fmt::Debug for InboundHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundHandler").finish_non_exhaustive()
    }
}

impl InboundHandler {
    pub fn new(dispatcher: Arc<dyn EventDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Handle one delivery body and return the keys that were emitted.
    ///
    /// # Errors
    ///
    /// Returns `ClassifyError` if the body is not JSON or has no valid
    /// repository. Nothing is emitted in that case.
    pub fn handle(&self, body: &[u8]) -> Result<Vec<EventKey>, ClassifyError> {
        let payload: Value = serde_json::from_slice(body)?;
        self.handle_value(payload)
    }

    pub fn handle_value(&self, payload: Value) -> Result<Vec<EventKey>, ClassifyError> {
        let (repo, keys) = classify(&payload)?;
        if keys.is_empty() {
            debug!(repo = %repo, "delivery matched no event kind");
            return Ok(keys);
        }

        let payload = Arc::new(payload);
        for key in &keys {
            self.dispatcher
                .emit(DeliveredEvent::new(key.clone(), Arc::clone(&payload)));
        }
        Ok(keys)
    }
}
