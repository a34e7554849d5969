//! subscriptions::manager
//!
//! Idempotent register/unregister of event types, multiplexed onto one
//! webhook per repository.
//!
//! # Reconciliation
//!
//! Every call runs the same sequence while holding the repository's lock,
//! both the in-process [`KeyedLocks`] entry and the store's cross-process
//! [`RepositoryLock`](super::lock::RepositoryLock), so two processes sharing
//! one state file never interleave their list and mutate steps:
//!
//! 1. **Discover**: list the repository's hooks remotely and pick the one
//!    targeting the configured callback URL. The local cache is never
//!    trusted for this decision.
//! 2. **Reconcile**: compute the new event set and issue at most one remote
//!    create, update, or delete.
//! 3. **Persist**: mirror the remote result into the local store, only after
//!    the remote call succeeded.
//!
//! Hooks targeting any other URL are read but never mutated. When several
//! hooks target the callback URL the one with the lowest id is managed and
//! the rest are left alone. A managed hook whose remote event list holds
//! names that cannot be parsed is not mutated either, since the rewrite
//! would drop them.
//!
//! Local records written for a different callback URL are orphaned. They
//! are moved aside rather than overwritten or deleted, and stay listed by
//! [`SubscriptionManager::orphaned`] until
//! [`SubscriptionManager::forget_orphaned`] drops them.
//!
//! # Failure
//!
//! A failed remote call returns before anything local is written. If the
//! remote call succeeds but persisting fails, the error is returned and the
//! next call repairs the cache from the remote listing.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use hookwise::core::types::{EventType, RepositoryKey};
//! use hookwise::forge::mock::MockForge;
//! use hookwise::subscriptions::{MemorySubscriptionStore, RegisterOutcome, SubscriptionManager};
//!
//! # tokio_test::block_on(async {
//! let manager = SubscriptionManager::new(
//!     Arc::new(MockForge::new()),
//!     Arc::new(MemorySubscriptionStore::new()),
//!     Some("https://hooks.example.com/github".to_string()),
//! );
//! let repo = RepositoryKey::new("octocat", "hello").unwrap();
//!
//! let first = manager.register(&repo, &EventType::Issues).await.unwrap();
//! let again = manager.register(&repo, &EventType::Issues).await.unwrap();
//! assert!(matches!(first, RegisterOutcome::Created(_)));
//! assert_eq!(again, RegisterOutcome::AlreadySubscribed(first.hook_id()));
//! # });
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::lock::{KeyedLocks, RepositoryLock};
use super::store::{StoreError, SubscriptionStore};
use crate::core::types::{EventType, HookId, RepositoryKey, WebhookRecord};
use crate::forge::{ForgeError, HookGateway, HookOperation, HookSpec, RemoteHook};

/// Errors from subscription operations.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// A credential or the callback URL is missing; nothing was changed.
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// The remote call failed; local state is unchanged.
    #[error("failed to {operation} webhook for '{event}' on {repo}: {source}")]
    Transport {
        repo: RepositoryKey,
        event: EventType,
        operation: HookOperation,
        #[source]
        source: ForgeError,
    },

    /// The local state store failed.
    #[error("failed to persist subscription state for {repo}: {source}")]
    Store {
        repo: RepositoryKey,
        #[source]
        source: StoreError,
    },

    /// Another process kept the repository locked for too long.
    #[error("{repo} is being reconciled by another process (waited {waited:?})")]
    Busy { repo: RepositoryKey, waited: Duration },

    /// The managed webhook lists event names that cannot be round-tripped.
    #[error(
        "webhook {hook} on {repo} carries unparseable event names ({}), refusing to modify it",
        names.join(", ")
    )]
    UnrecognizedEvents {
        repo: RepositoryKey,
        hook: HookId,
        names: Vec<String>,
    },

    /// The local state store could not be read as a whole.
    #[error("failed to read subscription state: {0}")]
    State(#[from] StoreError),
}

/// How long to wait for another process to release a repository.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

const LOCK_RETRY: Duration = Duration::from_millis(25);

/// Result of a successful register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// A new webhook was created for the event.
    Created(HookId),
    /// The event was added to the existing webhook.
    Updated(HookId),
    /// The webhook already carried the event; nothing was mutated remotely.
    AlreadySubscribed(HookId),
}

impl RegisterOutcome {
    pub fn hook_id(&self) -> HookId {
        match self {
            RegisterOutcome::Created(id)
            | RegisterOutcome::Updated(id)
            | RegisterOutcome::AlreadySubscribed(id) => *id,
        }
    }
}

/// Result of a successful unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnregisterOutcome {
    /// The event was the last one; the webhook was deleted.
    Deleted(HookId),
    /// The event was removed from a webhook that still has others.
    Updated(HookId),
    /// No managed webhook carried the event; nothing was mutated remotely.
    NotSubscribed,
}

/// Orchestrates webhook reconciliation for every repository.
pub struct SubscriptionManager {
    gateway: Arc<dyn HookGateway>,
    store: Arc<dyn SubscriptionStore>,
    callback_url: Option<String>,
    locks: KeyedLocks<RepositoryKey>,
    lock_timeout: Duration,
}

impl std::fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("gateway", &self.gateway.name())
            .field("callback_url", &self.callback_url)
            .finish_non_exhaustive()
    }
}

impl SubscriptionManager {
    /// Create a manager.
    ///
    /// `callback_url` may be `None` so read-only operations still work;
    /// register and unregister then fail with `NotConfigured`.
    pub fn new(
        gateway: Arc<dyn HookGateway>,
        store: Arc<dyn SubscriptionStore>,
        callback_url: Option<String>,
    ) -> Self {
        Self {
            gateway,
            store,
            callback_url,
            locks: KeyedLocks::new(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Give up on a repository held by another process after `timeout`.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// The callback URL managed webhooks deliver to.
    pub fn callback_url(&self) -> Option<&str> {
        self.callback_url.as_deref()
    }

    fn require_callback(&self) -> Result<&str, SubscriptionError> {
        self.callback_url().ok_or_else(|| {
            SubscriptionError::NotConfigured(
                "no callback URL configured (set callback_url or HOOKWISE_CALLBACK_URL)".into(),
            )
        })
    }

    /// Ensure the repository's managed webhook delivers `event`.
    ///
    /// # Errors
    ///
    /// - `NotConfigured` if the callback URL or API token is missing
    /// - `Transport` if a remote call fails (local state untouched)
    /// - `Store` if the remote change succeeded but could not be persisted
    /// - `Busy` if another process held the repository past the lock timeout
    /// - `UnrecognizedEvents` if the managed hook cannot be rewritten safely
    pub async fn register(
        &self,
        repo: &RepositoryKey,
        event: &EventType,
    ) -> Result<RegisterOutcome, SubscriptionError> {
        let callback = self.require_callback()?;
        let _guard = self.locks.lock(repo).await;
        let _lock = self.lock_repository(repo).await?;

        match self.discover(repo, event, callback).await? {
            Some(hook) if hook.events.contains(event) => {
                debug!(repo = %repo, event = %event, hook = %hook.id, "already subscribed");
                self.refresh_cache(repo, &hook, callback)?;
                Ok(RegisterOutcome::AlreadySubscribed(hook.id))
            }
            Some(hook) => {
                check_mutable(repo, &hook)?;
                let mut events = hook.events;
                events.insert(event.clone());
                let spec = HookSpec::json(callback, events);

                self.gateway
                    .update_hook(repo, hook.id, &spec)
                    .await
                    .map_err(|e| self.remote_error(repo, event, HookOperation::Update, e))?;
                info!(repo = %repo, event = %event, hook = %hook.id, "added event to webhook");

                self.persist(repo, WebhookRecord::new(hook.id, callback, spec.events))?;
                Ok(RegisterOutcome::Updated(hook.id))
            }
            None => {
                let spec = HookSpec::json(callback, BTreeSet::from([event.clone()]));

                let id = self
                    .gateway
                    .create_hook(repo, &spec)
                    .await
                    .map_err(|e| self.remote_error(repo, event, HookOperation::Create, e))?;
                info!(repo = %repo, event = %event, hook = %id, "created webhook");

                self.persist(repo, WebhookRecord::new(id, callback, spec.events))?;
                Ok(RegisterOutcome::Created(id))
            }
        }
    }

    /// Ensure the repository's managed webhook no longer delivers `event`.
    ///
    /// Deletes the webhook when `event` was its last event. Unregistering an
    /// event that is not subscribed succeeds without remote mutation.
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register).
    pub async fn unregister(
        &self,
        repo: &RepositoryKey,
        event: &EventType,
    ) -> Result<UnregisterOutcome, SubscriptionError> {
        let callback = self.require_callback()?;
        let _guard = self.locks.lock(repo).await;
        let _lock = self.lock_repository(repo).await?;

        let hook = match self.discover(repo, event, callback).await? {
            Some(hook) if hook.events.contains(event) => hook,
            Some(hook) => {
                debug!(repo = %repo, event = %event, hook = %hook.id, "event not subscribed");
                self.refresh_cache(repo, &hook, callback)?;
                return Ok(UnregisterOutcome::NotSubscribed);
            }
            None => {
                debug!(repo = %repo, event = %event, "no managed webhook");
                self.drop_stale(repo, callback)?;
                return Ok(UnregisterOutcome::NotSubscribed);
            }
        };
        check_mutable(repo, &hook)?;

        let mut events = hook.events;
        events.remove(event);

        if events.is_empty() {
            self.gateway
                .delete_hook(repo, hook.id)
                .await
                .map_err(|e| self.remote_error(repo, event, HookOperation::Delete, e))?;
            info!(repo = %repo, event = %event, hook = %hook.id, "deleted webhook");

            self.remove_record(repo, callback)?;
            Ok(UnregisterOutcome::Deleted(hook.id))
        } else {
            let spec = HookSpec::json(callback, events);
            self.gateway
                .update_hook(repo, hook.id, &spec)
                .await
                .map_err(|e| self.remote_error(repo, event, HookOperation::Update, e))?;
            info!(repo = %repo, event = %event, hook = %hook.id, "removed event from webhook");

            self.persist(repo, WebhookRecord::new(hook.id, callback, spec.events))?;
            Ok(UnregisterOutcome::Updated(hook.id))
        }
    }

    /// All locally recorded subscriptions.
    pub fn subscriptions(&self) -> Result<Vec<(RepositoryKey, WebhookRecord)>, StoreError> {
        self.store.list()
    }

    /// Local records that belong to a previous callback URL.
    ///
    /// This covers records still filed under a repository whose URL differs
    /// from the current callback URL, and records that reconciliation moved
    /// aside. They are never adopted or mutated; they are reported so an
    /// operator can remove the old webhooks and then
    /// [`forget`](Self::forget_orphaned) them.
    pub fn orphaned(&self) -> Result<Vec<(RepositoryKey, WebhookRecord)>, SubscriptionError> {
        let mut orphaned = self.store.orphaned()?;
        if let Some(callback) = self.callback_url() {
            orphaned.extend(
                self.store
                    .list()?
                    .into_iter()
                    .filter(|(_, record)| record.url != callback),
            );
        }
        orphaned.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(orphaned)
    }

    /// Drop the orphaned records for `repo` and return them.
    ///
    /// Nothing remote is touched: the old webhooks must be removed by hand.
    pub async fn forget_orphaned(
        &self,
        repo: &RepositoryKey,
    ) -> Result<Vec<WebhookRecord>, SubscriptionError> {
        let _guard = self.locks.lock(repo).await;
        let _lock = self.lock_repository(repo).await?;

        if let Some(callback) = self.callback_url() {
            self.retire_foreign(repo, callback)?;
        }
        let forgotten = self
            .store
            .forget_orphaned(repo)
            .map_err(|source| SubscriptionError::Store {
                repo: repo.clone(),
                source,
            })?;
        if !forgotten.is_empty() {
            info!(repo = %repo, count = forgotten.len(), "forgot orphaned records");
        }
        Ok(forgotten)
    }

    /// Wait for the store's cross-process lock on `repo`.
    async fn lock_repository(
        &self,
        repo: &RepositoryKey,
    ) -> Result<RepositoryLock, SubscriptionError> {
        let started = Instant::now();
        let mut logged = false;
        loop {
            let attempt = self
                .store
                .try_lock(repo)
                .map_err(|source| SubscriptionError::Store {
                    repo: repo.clone(),
                    source,
                })?;
            if let Some(lock) = attempt {
                return Ok(lock);
            }

            let waited = started.elapsed();
            if waited >= self.lock_timeout {
                return Err(SubscriptionError::Busy {
                    repo: repo.clone(),
                    waited,
                });
            }
            if !logged {
                debug!(repo = %repo, "waiting for another process to finish with repository");
                logged = true;
            }
            tokio::time::sleep(LOCK_RETRY).await;
        }
    }

    /// List remotely and select the managed hook.
    async fn discover(
        &self,
        repo: &RepositoryKey,
        event: &EventType,
        callback: &str,
    ) -> Result<Option<RemoteHook>, SubscriptionError> {
        let hooks = self
            .gateway
            .list_hooks(repo)
            .await
            .map_err(|e| self.remote_error(repo, event, HookOperation::List, e))?;

        let mut matching: Vec<RemoteHook> =
            hooks.into_iter().filter(|h| h.targets(callback)).collect();
        matching.sort_by_key(|h| h.id);

        if matching.len() > 1 {
            let ignored: Vec<String> = matching[1..].iter().map(|h| h.id.to_string()).collect();
            warn!(
                repo = %repo,
                managed = %matching[0].id,
                ignored = %ignored.join(","),
                "multiple webhooks target the callback URL, managing the lowest id"
            );
        }

        Ok(matching.into_iter().next())
    }

    /// Rewrite the cached record from a hook that was not mutated.
    fn refresh_cache(
        &self,
        repo: &RepositoryKey,
        hook: &RemoteHook,
        callback: &str,
    ) -> Result<(), SubscriptionError> {
        if hook.events.is_empty() {
            return self.drop_stale(repo, callback);
        }

        let remote = WebhookRecord::new(hook.id, callback, hook.events.clone());
        let cached = self.retire_foreign(repo, callback)?;
        if cached.as_ref() != Some(&remote) {
            warn!(repo = %repo, hook = %hook.id, "local record disagreed with remote, refreshing");
            self.persist(repo, remote)?;
        }
        Ok(())
    }

    /// Remove a cached record that has no remote counterpart.
    fn drop_stale(&self, repo: &RepositoryKey, callback: &str) -> Result<(), SubscriptionError> {
        if let Some(stale) = self.remove_record(repo, callback)? {
            warn!(repo = %repo, hook = %stale.id, "dropped local record with no managed webhook");
        }
        Ok(())
    }

    /// Delete the cached record for `callback`, leaving orphans in place.
    fn remove_record(
        &self,
        repo: &RepositoryKey,
        callback: &str,
    ) -> Result<Option<WebhookRecord>, SubscriptionError> {
        let Some(record) = self.retire_foreign(repo, callback)? else {
            return Ok(None);
        };
        self.store.delete(repo).map_err(|source| SubscriptionError::Store {
            repo: repo.clone(),
            source,
        })?;
        Ok(Some(record))
    }

    /// The cached record for `callback`, after moving a record written for
    /// any other URL to the orphaned list.
    fn retire_foreign(
        &self,
        repo: &RepositoryKey,
        callback: &str,
    ) -> Result<Option<WebhookRecord>, SubscriptionError> {
        let store_err = |source| SubscriptionError::Store {
            repo: repo.clone(),
            source,
        };
        match self.store.get(repo).map_err(store_err)? {
            Some(record) if record.url != callback => {
                warn!(
                    repo = %repo,
                    hook = %record.id,
                    url = %record.url,
                    "keeping record for a previous callback URL as orphaned"
                );
                self.store.retire(repo).map_err(store_err)?;
                Ok(None)
            }
            cached => Ok(cached),
        }
    }

    fn persist(&self, repo: &RepositoryKey, record: WebhookRecord) -> Result<(), SubscriptionError> {
        self.retire_foreign(repo, &record.url)?;
        self.store
            .set(repo, &record)
            .map_err(|source| SubscriptionError::Store {
                repo: repo.clone(),
                source,
            })
    }

    fn remote_error(
        &self,
        repo: &RepositoryKey,
        event: &EventType,
        operation: HookOperation,
        source: ForgeError,
    ) -> SubscriptionError {
        match source {
            ForgeError::AuthRequired => {
                SubscriptionError::NotConfigured("no API token configured".into())
            }
            source => SubscriptionError::Transport {
                repo: repo.clone(),
                event: event.clone(),
                operation,
                source,
            },
        }
    }
}

/// Refuse to rewrite a hook whose event list would lose entries.
fn check_mutable(repo: &RepositoryKey, hook: &RemoteHook) -> Result<(), SubscriptionError> {
    if hook.unrecognized.is_empty() {
        return Ok(());
    }
    Err(SubscriptionError::UnrecognizedEvents {
        repo: repo.clone(),
        hook: hook.id,
        names: hook.unrecognized.clone(),
    })
}
