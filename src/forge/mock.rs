//! forge::mock
//!
//! Mock forge implementation for deterministic testing.
//!
//! # Design
//!
//! The mock forge keeps webhooks and activity feeds in memory, records
//! every call, and can be told to fail a specific operation. An optional
//! latency is awaited inside every call so concurrent callers genuinely
//! interleave between discovery and mutation.
//!
//! # Example
//!
//! ```
//! use hookwise::core::types::{EventType, RepositoryKey};
//! use hookwise::forge::mock::MockForge;
//! use hookwise::forge::{HookGateway, HookSpec};
//!
//! # tokio_test::block_on(async {
//! let forge = MockForge::new();
//! let repo = RepositoryKey::new("octocat", "hello").unwrap();
//!
//! let spec = HookSpec::json("https://hooks.example.com", [EventType::Push].into());
//! let id = forge.create_hook(&repo, &spec).await.unwrap();
//!
//! let hooks = forge.list_hooks(&repo).await.unwrap();
//! assert_eq!(hooks.len(), 1);
//! assert_eq!(hooks[0].id, id);
//! # });
//! ```

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::traits::{
    ActivityEvent, ActivityFeed, ActivityPage, ForgeError, HookGateway, HookSpec, RemoteHook,
};
use crate::core::types::{EventType, HookId, RepositoryKey};

/// Mock forge for testing.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping.
#[derive(Debug, Clone)]
pub struct MockForge {
    /// Internal state shared across clones.
    inner: Arc<Mutex<MockForgeInner>>,
}

/// Internal mutable state.
#[derive(Debug)]
struct MockForgeInner {
    /// Hooks per repository, in creation order.
    hooks: HashMap<RepositoryKey, Vec<RemoteHook>>,
    /// Next hook id to assign.
    next_hook_id: u64,
    /// Activity feed per repository, newest first.
    activity: HashMap<RepositoryKey, Vec<ActivityEvent>>,
    /// Poll interval hint returned with activity pages.
    poll_interval: Option<Duration>,
    /// Delay awaited inside every call.
    latency: Option<Duration>,
    /// Method to fail on (for testing error paths).
    fail_on: Option<FailOn>,
    /// Recorded operations for verification.
    operations: Vec<MockOperation>,
}

/// Configuration for which operation should fail.
#[derive(Debug, Clone)]
pub enum FailOn {
    ListHooks(ForgeError),
    CreateHook(ForgeError),
    UpdateHook(ForgeError),
    DeleteHook(ForgeError),
    RepoEvents(ForgeError),
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    ListHooks {
        repo: RepositoryKey,
    },
    CreateHook {
        repo: RepositoryKey,
        url: String,
        events: BTreeSet<EventType>,
    },
    UpdateHook {
        repo: RepositoryKey,
        id: HookId,
        events: BTreeSet<EventType>,
    },
    DeleteHook {
        repo: RepositoryKey,
        id: HookId,
    },
    RepoEvents {
        repo: RepositoryKey,
    },
}

impl MockOperation {
    /// Whether this operation changed remote state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            MockOperation::CreateHook { .. }
                | MockOperation::UpdateHook { .. }
                | MockOperation::DeleteHook { .. }
        )
    }
}

impl MockForge {
    /// Create a new empty mock forge.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockForgeInner {
                hooks: HashMap::new(),
                next_hook_id: 1,
                activity: HashMap::new(),
                poll_interval: None,
                latency: None,
                fail_on: None,
                operations: Vec::new(),
            })),
        }
    }

    /// Seed a repository with pre-existing hooks.
    ///
    /// New ids are assigned above the highest seeded id.
    pub fn with_hooks(self, repo: &RepositoryKey, hooks: Vec<RemoteHook>) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            let max_id = hooks.iter().map(|h| h.id.0).max().unwrap_or(0);
            inner.next_hook_id = inner.next_hook_id.max(max_id + 1);
            inner.hooks.entry(repo.clone()).or_default().extend(hooks);
        }
        self
    }

    /// Await `latency` inside every call.
    pub fn with_latency(self, latency: Duration) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.latency = Some(latency);
        }
        self
    }

    /// Configure the mock to fail on a specific operation.
    ///
    /// # Example
    ///
    /// ```
    /// use hookwise::forge::mock::{MockForge, FailOn};
    /// use hookwise::forge::ForgeError;
    ///
    /// let forge = MockForge::new()
    ///     .fail_on(FailOn::CreateHook(ForgeError::RateLimited));
    /// ```
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        self.set_fail_on(fail_on);
        self
    }

    /// Configure a failure on an already shared mock.
    pub fn set_fail_on(&self, fail_on: FailOn) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_on = Some(fail_on);
    }

    /// Clear the failure configuration.
    pub fn clear_fail_on(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_on = None;
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<MockOperation> {
        let inner = self.inner.lock().unwrap();
        inner.operations.clone()
    }

    /// Recorded operations that changed remote state.
    pub fn mutations(&self) -> Vec<MockOperation> {
        self.operations()
            .into_iter()
            .filter(MockOperation::is_mutation)
            .collect()
    }

    /// Clear recorded operations.
    pub fn clear_operations(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.operations.clear();
    }

    /// Current hooks on a repository (for test verification).
    pub fn hooks(&self, repo: &RepositoryKey) -> Vec<RemoteHook> {
        let inner = self.inner.lock().unwrap();
        inner.hooks.get(repo).cloned().unwrap_or_default()
    }

    /// Change a hook behind the manager's back (out-of-band edit).
    pub fn replace_hook(&self, repo: &RepositoryKey, hook: RemoteHook) {
        let mut inner = self.inner.lock().unwrap();
        let hooks = inner.hooks.entry(repo.clone()).or_default();
        match hooks.iter_mut().find(|h| h.id == hook.id) {
            Some(existing) => *existing = hook,
            None => hooks.push(hook),
        }
    }

    /// Remove a hook behind the manager's back.
    pub fn remove_hook(&self, repo: &RepositoryKey, id: HookId) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(hooks) = inner.hooks.get_mut(repo) {
            hooks.retain(|h| h.id != id);
        }
    }

    /// Add an activity feed entry; it becomes the newest entry.
    pub fn push_activity(&self, repo: &RepositoryKey, event: ActivityEvent) {
        let mut inner = self.inner.lock().unwrap();
        inner.activity.entry(repo.clone()).or_default().insert(0, event);
    }

    /// Set the poll interval hint returned with activity pages.
    pub fn set_poll_interval(&self, interval: Option<Duration>) {
        let mut inner = self.inner.lock().unwrap();
        inner.poll_interval = interval;
    }

    /// Record an operation.
    fn record(&self, op: MockOperation) {
        let mut inner = self.inner.lock().unwrap();
        inner.operations.push(op);
    }

    /// Check if we should fail and return the error if so.
    fn check_fail(&self, expected: &str) -> Option<ForgeError> {
        let inner = self.inner.lock().unwrap();
        match &inner.fail_on {
            Some(FailOn::ListHooks(e)) if expected == "list_hooks" => Some(e.clone()),
            Some(FailOn::CreateHook(e)) if expected == "create_hook" => Some(e.clone()),
            Some(FailOn::UpdateHook(e)) if expected == "update_hook" => Some(e.clone()),
            Some(FailOn::DeleteHook(e)) if expected == "delete_hook" => Some(e.clone()),
            Some(FailOn::RepoEvents(e)) if expected == "repo_events" => Some(e.clone()),
            _ => None,
        }
    }

    /// Await the configured latency, if any.
    async fn delay(&self) {
        let latency = self.inner.lock().unwrap().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl Default for MockForge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HookGateway for MockForge {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn list_hooks(&self, repo: &RepositoryKey) -> Result<Vec<RemoteHook>, ForgeError> {
        self.record(MockOperation::ListHooks { repo: repo.clone() });
        if let Some(e) = self.check_fail("list_hooks") {
            return Err(e);
        }

        let hooks = self.hooks(repo);
        self.delay().await;
        Ok(hooks)
    }

    async fn create_hook(
        &self,
        repo: &RepositoryKey,
        spec: &HookSpec,
    ) -> Result<HookId, ForgeError> {
        self.record(MockOperation::CreateHook {
            repo: repo.clone(),
            url: spec.url.clone(),
            events: spec.events.clone(),
        });
        self.delay().await;
        if let Some(e) = self.check_fail("create_hook") {
            return Err(e);
        }
        if spec.events.is_empty() {
            return Err(ForgeError::ApiError {
                status: 422,
                message: "events cannot be empty".into(),
            });
        }

        let mut inner = self.inner.lock().unwrap();
        let id = HookId(inner.next_hook_id);
        inner.next_hook_id += 1;
        inner.hooks.entry(repo.clone()).or_default().push(RemoteHook::new(
            id,
            Some(spec.url.clone()),
            spec.events.clone(),
        ));
        Ok(id)
    }

    async fn update_hook(
        &self,
        repo: &RepositoryKey,
        id: HookId,
        spec: &HookSpec,
    ) -> Result<(), ForgeError> {
        self.record(MockOperation::UpdateHook {
            repo: repo.clone(),
            id,
            events: spec.events.clone(),
        });
        self.delay().await;
        if let Some(e) = self.check_fail("update_hook") {
            return Err(e);
        }

        let mut inner = self.inner.lock().unwrap();
        let hook = inner
            .hooks
            .get_mut(repo)
            .and_then(|hooks| hooks.iter_mut().find(|h| h.id == id))
            .ok_or_else(|| ForgeError::NotFound(format!("hook {id} on {repo}")))?;
        hook.url = Some(spec.url.clone());
        hook.events = spec.events.clone();
        Ok(())
    }

    async fn delete_hook(&self, repo: &RepositoryKey, id: HookId) -> Result<(), ForgeError> {
        self.record(MockOperation::DeleteHook {
            repo: repo.clone(),
            id,
        });
        self.delay().await;
        if let Some(e) = self.check_fail("delete_hook") {
            return Err(e);
        }

        let mut inner = self.inner.lock().unwrap();
        let hooks = inner
            .hooks
            .get_mut(repo)
            .ok_or_else(|| ForgeError::NotFound(format!("hook {id} on {repo}")))?;
        let before = hooks.len();
        hooks.retain(|h| h.id != id);
        if hooks.len() == before {
            return Err(ForgeError::NotFound(format!("hook {id} on {repo}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ActivityFeed for MockForge {
    async fn repo_events(&self, repo: &RepositoryKey) -> Result<ActivityPage, ForgeError> {
        self.record(MockOperation::RepoEvents { repo: repo.clone() });
        if let Some(e) = self.check_fail("repo_events") {
            return Err(e);
        }

        let inner = self.inner.lock().unwrap();
        Ok(ActivityPage {
            events: inner.activity.get(repo).cloned().unwrap_or_default(),
            poll_interval: inner.poll_interval,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> RepositoryKey {
        RepositoryKey::new("octocat", "hello").unwrap()
    }

    fn spec(events: &[EventType]) -> HookSpec {
        HookSpec::json("https://hooks.example.com", events.iter().cloned().collect())
    }

    #[tokio::test]
    async fn create_and_list() {
        let forge = MockForge::new();
        let id = forge.create_hook(&repo(), &spec(&[EventType::Push])).await.unwrap();
        assert_eq!(id, HookId(1));

        let hooks = forge.list_hooks(&repo()).await.unwrap();
        assert_eq!(hooks.len(), 1);
        assert!(hooks[0].targets("https://hooks.example.com"));
    }

    #[tokio::test]
    async fn seeded_hooks_advance_ids() {
        let existing = RemoteHook::new(
            HookId(40),
            Some("https://elsewhere.example.com".into()),
            [EventType::Push].into(),
        );
        let forge = MockForge::new().with_hooks(&repo(), vec![existing]);
        let id = forge.create_hook(&repo(), &spec(&[EventType::Issues])).await.unwrap();
        assert_eq!(id, HookId(41));
        assert_eq!(forge.hooks(&repo()).len(), 2);
    }

    #[tokio::test]
    async fn update_replaces_events() {
        let forge = MockForge::new();
        let id = forge.create_hook(&repo(), &spec(&[EventType::Push])).await.unwrap();
        forge
            .update_hook(&repo(), id, &spec(&[EventType::Issues, EventType::Release]))
            .await
            .unwrap();
        assert_eq!(
            forge.hooks(&repo())[0].events,
            [EventType::Issues, EventType::Release].into()
        );
    }

    #[tokio::test]
    async fn update_unknown_hook_is_not_found() {
        let forge = MockForge::new();
        let result = forge
            .update_hook(&repo(), HookId(9), &spec(&[EventType::Push]))
            .await;
        assert!(matches!(result, Err(ForgeError::NotFound(_))));
    }

    #[tokio::test]
    async fn delete_removes_hook() {
        let forge = MockForge::new();
        let id = forge.create_hook(&repo(), &spec(&[EventType::Push])).await.unwrap();
        forge.delete_hook(&repo(), id).await.unwrap();
        assert!(forge.hooks(&repo()).is_empty());
        assert!(matches!(
            forge.delete_hook(&repo(), id).await,
            Err(ForgeError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn fail_on_returns_error_and_leaves_state() {
        let forge = MockForge::new().fail_on(FailOn::CreateHook(ForgeError::RateLimited));
        let result = forge.create_hook(&repo(), &spec(&[EventType::Push])).await;
        assert_eq!(result, Err(ForgeError::RateLimited));
        assert!(forge.hooks(&repo()).is_empty());

        forge.clear_fail_on();
        assert!(forge.create_hook(&repo(), &spec(&[EventType::Push])).await.is_ok());
    }

    #[tokio::test]
    async fn operations_are_recorded() {
        let forge = MockForge::new();
        forge.list_hooks(&repo()).await.unwrap();
        forge.create_hook(&repo(), &spec(&[EventType::Push])).await.unwrap();

        let ops = forge.operations();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0], MockOperation::ListHooks { repo: repo() });
        assert_eq!(forge.mutations().len(), 1);

        forge.clear_operations();
        assert!(forge.operations().is_empty());
    }

    #[tokio::test]
    async fn activity_is_newest_first() {
        let forge = MockForge::new();
        let at = |secs| chrono::DateTime::from_timestamp(secs, 0).unwrap();
        for (id, secs) in [("1", 100), ("2", 200)] {
            forge.push_activity(
                &repo(),
                ActivityEvent {
                    id: id.into(),
                    event_type: "PushEvent".into(),
                    created_at: at(secs),
                    payload: serde_json::Value::Null,
                },
            );
        }
        forge.set_poll_interval(Some(Duration::from_secs(60)));

        let page = forge.repo_events(&repo()).await.unwrap();
        assert_eq!(page.events[0].id, "2");
        assert_eq!(page.poll_interval, Some(Duration::from_secs(60)));
    }
}
