//! events::source
//!
//! Strategies for learning about remote activity.
//!
//! # Strategies
//!
//! - [`WebhookSource`] keeps the repository's managed webhook in step with
//!   the kinds subscribers care about. Deliveries arrive through
//!   [`InboundHandler`](super::InboundHandler).
//! - [`PollingSource`] periodically reads the repository activity feed and
//!   emits whatever is newer than the last poll.
//!
//! Configuration picks exactly one strategy per process.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::dispatch::{DeliveredEvent, EventDispatcher};
use crate::core::types::{EventKey, EventKind, RepositoryKey};
use crate::forge::{ActivityEvent, ActivityFeed, ForgeError};
use crate::subscriptions::{KeyedLocks, SubscriptionError, SubscriptionManager};

/// Errors from an event source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    #[error("failed to read activity feed for {repo}: {source}")]
    Feed {
        repo: RepositoryKey,
        #[source]
        source: ForgeError,
    },
}

/// Subscribe-side interface shared by every strategy.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Start delivering `kind` for `repo`. Subscribing twice is a no-op.
    async fn subscribe(&self, repo: &RepositoryKey, kind: EventKind) -> Result<(), SourceError>;

    /// Stop delivering `kind` for `repo`. Unsubscribing an absent kind is a no-op.
    async fn unsubscribe(&self, repo: &RepositoryKey, kind: EventKind)
        -> Result<(), SourceError>;

    /// Kinds currently subscribed for `repo`.
    fn kinds(&self, repo: &RepositoryKey) -> BTreeSet<EventKind>;
}

type Interest = HashMap<RepositoryKey, BTreeSet<EventKind>>;

/// Event source backed by one managed webhook per repository.
///
/// Several kinds share a remote event type (`issueOpened` and
/// `issueClosed` both arrive as `issues`), so the event type is only
/// unregistered once no subscribed kind needs it.
pub struct WebhookSource {
    manager: Arc<SubscriptionManager>,
    interest: Mutex<Interest>,
    locks: KeyedLocks<RepositoryKey>,
}

impl WebhookSource {
    pub fn new(manager: Arc<SubscriptionManager>) -> Self {
        Self {
            manager,
            interest: Mutex::new(HashMap::new()),
            locks: KeyedLocks::new(),
        }
    }

    fn interest(&self) -> std::sync::MutexGuard<'_, Interest> {
        self.interest.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl EventSource for WebhookSource {
    async fn subscribe(&self, repo: &RepositoryKey, kind: EventKind) -> Result<(), SourceError> {
        let _guard = self.locks.lock(repo).await;

        self.manager.register(repo, &kind.event_type()).await?;
        self.interest().entry(repo.clone()).or_default().insert(kind);
        debug!(repo = %repo, kind = %kind, "webhook interest added");
        Ok(())
    }

    async fn unsubscribe(
        &self,
        repo: &RepositoryKey,
        kind: EventKind,
    ) -> Result<(), SourceError> {
        let _guard = self.locks.lock(repo).await;

        let shared = {
            let interest = self.interest();
            let Some(kinds) = interest.get(repo).filter(|kinds| kinds.contains(&kind)) else {
                debug!(repo = %repo, kind = %kind, "not subscribed");
                return Ok(());
            };
            kinds
                .iter()
                .any(|other| *other != kind && other.event_type() == kind.event_type())
        };

        if !shared {
            self.manager.unregister(repo, &kind.event_type()).await?;
        }

        let mut interest = self.interest();
        if let Some(kinds) = interest.get_mut(repo) {
            kinds.remove(&kind);
            if kinds.is_empty() {
                interest.remove(repo);
            }
        }
        Ok(())
    }

    fn kinds(&self, repo: &RepositoryKey) -> BTreeSet<EventKind> {
        self.interest().get(repo).cloned().unwrap_or_default()
    }
}

#[derive(Debug, Default)]
struct Watch {
    kinds: BTreeSet<EventKind>,
    /// Newest activity timestamp already seen.
    last_seen: Option<DateTime<Utc>>,
    /// Ids of the entries already seen at exactly `last_seen`. The feed has
    /// one-second resolution, so later entries can share that timestamp.
    boundary: BTreeSet<String>,
    /// Whether the first poll has recorded a baseline.
    primed: bool,
}

/// Result of one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollOutcome {
    /// Events handed to the dispatcher
    pub emitted: usize,
    /// Minimum delay the remote asked for
    pub poll_interval: Option<Duration>,
}

/// Event source that diffs the activity feed against the last poll.
///
/// The first poll of a repository only records where the feed stands;
/// nothing that happened before the watch started is emitted.
pub struct PollingSource {
    feed: Arc<dyn ActivityFeed>,
    dispatcher: Arc<dyn EventDispatcher>,
    interval: Duration,
    watches: Mutex<HashMap<RepositoryKey, Watch>>,
}

impl PollingSource {
    pub fn new(
        feed: Arc<dyn ActivityFeed>,
        dispatcher: Arc<dyn EventDispatcher>,
        interval: Duration,
    ) -> Self {
        Self {
            feed,
            dispatcher,
            interval,
            watches: Mutex::new(HashMap::new()),
        }
    }

    fn watches(&self) -> std::sync::MutexGuard<'_, HashMap<RepositoryKey, Watch>> {
        self.watches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read the feed once and emit new activity.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Feed` if the feed cannot be read; the baseline
    /// is left unchanged.
    pub async fn poll_once(&self, repo: &RepositoryKey) -> Result<PollOutcome, SourceError> {
        if !self.watches().contains_key(repo) {
            debug!(repo = %repo, "not watched, skipping poll");
            return Ok(PollOutcome::default());
        }

        let page = self
            .feed
            .repo_events(repo)
            .await
            .map_err(|source| SourceError::Feed {
                repo: repo.clone(),
                source,
            })?;
        let newest = page.events.iter().map(|e| e.created_at).max();

        let pending = {
            let mut watches = self.watches();
            // Unsubscribed while the feed was being read.
            let Some(watch) = watches.get_mut(repo) else {
                return Ok(PollOutcome::default());
            };

            if !watch.primed {
                watch.primed = true;
                watch.last_seen = newest;
                watch.boundary = ids_at(&page.events, newest);
                debug!(repo = %repo, baseline = ?newest, "recorded activity baseline");
                return Ok(PollOutcome {
                    emitted: 0,
                    poll_interval: page.poll_interval,
                });
            }

            let since = watch.last_seen;
            let mut fresh: Vec<&ActivityEvent> = page
                .events
                .iter()
                .filter(|e| match since {
                    None => true,
                    Some(seen) => {
                        e.created_at > seen
                            || (e.created_at == seen && !watch.boundary.contains(&e.id))
                    }
                })
                .collect();
            fresh.sort_by_key(|e| e.created_at);

            if newest > watch.last_seen {
                watch.last_seen = newest;
                watch.boundary = ids_at(&page.events, newest);
            } else if newest.is_some() && newest == watch.last_seen {
                watch.boundary.extend(ids_at(&page.events, newest));
            }

            fresh
                .into_iter()
                .flat_map(|e| {
                    let payload = Arc::new(e.payload.clone());
                    activity_keys(repo, e)
                        .into_iter()
                        .map(move |key| (key, Arc::clone(&payload)))
                })
                .filter(|(key, _)| watch.kinds.contains(&key.kind))
                .collect::<Vec<_>>()
        };

        let emitted = pending.len();
        for (key, payload) in pending {
            self.dispatcher.emit(DeliveredEvent::new(key, payload));
        }
        if emitted > 0 {
            info!(repo = %repo, emitted, "emitted polled activity");
        }

        Ok(PollOutcome {
            emitted,
            poll_interval: page.poll_interval,
        })
    }

    /// Poll `repo` until it is no longer watched.
    ///
    /// Waits the larger of the configured interval and the remote's hint
    /// between polls. Feed errors are logged and retried on the next tick.
    pub async fn run(&self, repo: &RepositoryKey) {
        let mut hint = None;
        loop {
            match self.poll_once(repo).await {
                Ok(outcome) => hint = outcome.poll_interval.or(hint),
                Err(e) => warn!(repo = %repo, error = %e, "poll failed"),
            }

            if !self.watches().contains_key(repo) {
                debug!(repo = %repo, "watch removed, stopping");
                return;
            }
            tokio::time::sleep(next_delay(self.interval, hint)).await;
        }
    }
}

/// Ids of the feed entries created exactly at `at`.
fn ids_at(events: &[ActivityEvent], at: Option<DateTime<Utc>>) -> BTreeSet<String> {
    events
        .iter()
        .filter(|e| Some(e.created_at) == at)
        .map(|e| e.id.clone())
        .collect()
}

fn next_delay(interval: Duration, hint: Option<Duration>) -> Duration {
    hint.map_or(interval, |hint| interval.max(hint))
}

#[async_trait]
impl EventSource for PollingSource {
    async fn subscribe(&self, repo: &RepositoryKey, kind: EventKind) -> Result<(), SourceError> {
        self.watches().entry(repo.clone()).or_default().kinds.insert(kind);
        debug!(repo = %repo, kind = %kind, "watching");
        Ok(())
    }

    async fn unsubscribe(
        &self,
        repo: &RepositoryKey,
        kind: EventKind,
    ) -> Result<(), SourceError> {
        let mut watches = self.watches();
        if let Some(watch) = watches.get_mut(repo) {
            watch.kinds.remove(&kind);
            if watch.kinds.is_empty() {
                watches.remove(repo);
            }
        }
        Ok(())
    }

    fn kinds(&self, repo: &RepositoryKey) -> BTreeSet<EventKind> {
        self.watches()
            .get(repo)
            .map(|watch| watch.kinds.clone())
            .unwrap_or_default()
    }
}

/// Map an activity feed entry to the keys a delivery of it would raise.
pub fn activity_keys(repo: &RepositoryKey, event: &ActivityEvent) -> Vec<EventKey> {
    let action = event.payload.get("action").and_then(Value::as_str);
    let number = |field: &str| {
        event
            .payload
            .get(field)
            .and_then(|v| v.get("number"))
            .and_then(Value::as_u64)
    };

    match (event.event_type.as_str(), action) {
        ("IssuesEvent", Some("opened")) => {
            vec![EventKey::repository(EventKind::IssueOpened, repo.clone())]
        }
        ("IssuesEvent", Some("closed")) => number("issue")
            .map(|n| EventKey::resource(EventKind::IssueClosed, repo.clone(), n))
            .into_iter()
            .collect(),
        ("PullRequestEvent", Some("opened")) => {
            vec![EventKey::repository(EventKind::PullRequestOpened, repo.clone())]
        }
        ("PullRequestEvent", Some("closed")) => number("pull_request")
            .or_else(|| event.payload.get("number").and_then(Value::as_u64))
            .map(|n| EventKey::resource(EventKind::PullRequestClosed, repo.clone(), n))
            .into_iter()
            .collect(),
        ("PushEvent", _) => vec![EventKey::repository(EventKind::Push, repo.clone())],
        ("ReleaseEvent", Some("published" | "created")) => {
            vec![EventKey::repository(EventKind::ReleasePublished, repo.clone())]
        }
        ("IssueCommentEvent", Some("created")) => {
            let mut keys: Vec<EventKey> = number("issue")
                .map(|n| EventKey::resource(EventKind::CommentCreated, repo.clone(), n))
                .into_iter()
                .collect();
            keys.push(EventKey::repository(EventKind::CommentCreated, repo.clone()));
            keys
        }
        _ => Vec::new(),
    }
}
