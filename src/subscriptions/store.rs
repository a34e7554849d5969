//! subscriptions::store
//!
//! Durable mapping from repository to its managed webhook record.
//!
//! # Design
//!
//! The store is a cache of remote truth, never the authority. The manager
//! reads it only to detect drift and writes it only after a remote call has
//! succeeded.
//!
//! A record with an empty event set is never stored; "no subscriptions"
//! is represented by the absence of a record.
//!
//! A record left behind by a previous callback URL is never overwritten or
//! deleted by reconciliation. It is moved to the `orphaned` list instead
//! and stays there until an operator forgets it.
//!
//! # Storage
//!
//! [`FileSubscriptionStore`] keeps all records in one JSON document:
//!
//! ```json
//! {
//!   "version": 1,
//!   "subscriptions": {
//!     "octocat/hello": { "id": 12, "url": "https://hooks.example.com", "events": ["issues"] }
//!   },
//!   "orphaned": {
//!     "octocat/old": [{ "id": 5, "url": "https://old.example.com", "events": ["push"] }]
//!   }
//! }
//! ```
//!
//! Every read-modify-write holds an exclusive OS lock on a sibling
//! `.lock` file, and writes are atomic (temp file + rename), so concurrent
//! processes sharing a state file never interleave.
//!
//! Whole reconciliations are serialized separately through one lock file
//! per repository under a sibling `.locks/` directory (see
//! [`SubscriptionStore::try_lock`]).

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::lock::{LockTable, RepositoryLock};
use crate::core::types::{RepositoryKey, WebhookRecord};

/// Current state file format version.
pub const STATE_VERSION: u32 = 1;

/// Errors from subscription state storage.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access state file '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse state file '{path}': {message}")]
    Parse { path: PathBuf, message: String },

    #[error("unsupported state file version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("failed to lock state file '{path}': {source}")]
    Lock {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("refusing to store a record with no events for {0}")]
    EmptyRecord(RepositoryKey),

    #[error("state store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence for webhook records, keyed by repository.
pub trait SubscriptionStore: Send + Sync {
    fn get(&self, repo: &RepositoryKey) -> Result<Option<WebhookRecord>, StoreError>;

    /// Insert or replace the record for `repo`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EmptyRecord`] if `record.events` is empty.
    fn set(&self, repo: &RepositoryKey, record: &WebhookRecord) -> Result<(), StoreError>;

    /// Remove the record for `repo`. Removing an absent record succeeds.
    fn delete(&self, repo: &RepositoryKey) -> Result<(), StoreError>;

    /// All records, ordered by repository.
    fn list(&self) -> Result<Vec<(RepositoryKey, WebhookRecord)>, StoreError>;

    /// Try to take the exclusive reconciliation lock for `repo`.
    ///
    /// Returns `Ok(None)` while another holder (possibly another process
    /// sharing the same state) has it.
    fn try_lock(&self, repo: &RepositoryKey) -> Result<Option<RepositoryLock>, StoreError>;

    /// Move the record for `repo` to the orphaned list.
    ///
    /// Retiring an absent record succeeds.
    fn retire(&self, repo: &RepositoryKey) -> Result<(), StoreError>;

    /// Retired records, ordered by repository.
    fn orphaned(&self) -> Result<Vec<(RepositoryKey, WebhookRecord)>, StoreError>;

    /// Drop the retired records for `repo` and return them.
    fn forget_orphaned(&self, repo: &RepositoryKey) -> Result<Vec<WebhookRecord>, StoreError>;
}

type Records = BTreeMap<RepositoryKey, WebhookRecord>;
type Orphans = BTreeMap<RepositoryKey, Vec<WebhookRecord>>;

/// Move `repo`'s record into `orphans`. Returns whether anything changed.
fn retire_record(records: &mut Records, orphans: &mut Orphans, repo: &RepositoryKey) -> bool {
    let Some(record) = records.remove(repo) else {
        return false;
    };
    let retired = orphans.entry(repo.clone()).or_default();
    if !retired.contains(&record) {
        retired.push(record);
    }
    true
}

fn flatten_orphans(orphans: &Orphans) -> Vec<(RepositoryKey, WebhookRecord)> {
    orphans
        .iter()
        .flat_map(|(repo, records)| records.iter().map(move |r| (repo.clone(), r.clone())))
        .collect()
}

fn check_record(repo: &RepositoryKey, record: &WebhookRecord) -> Result<(), StoreError> {
    if record.events.is_empty() {
        return Err(StoreError::EmptyRecord(repo.clone()));
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    version: u32,
    #[serde(default)]
    subscriptions: Records,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    orphaned: Orphans,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            subscriptions: BTreeMap::new(),
            orphaned: BTreeMap::new(),
        }
    }
}

/// JSON file store shared safely between processes.
#[derive(Debug)]
pub struct FileSubscriptionStore {
    path: PathBuf,
}

impl FileSubscriptionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    /// Lock file serializing reconciliation of one repository.
    fn repository_lock_path(&self, repo: &RepositoryKey) -> PathBuf {
        self.path
            .with_extension("locks")
            .join(format!("{}@{}.lock", repo.owner(), repo.name()))
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Open the lock file and take an OS lock on it.
    ///
    /// The lock is released when the returned file is dropped.
    fn acquire(&self, exclusive: bool) -> Result<File, StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }

        let lock_path = self.lock_path();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|source| StoreError::Lock {
                path: lock_path.clone(),
                source,
            })?;

        let locked = if exclusive {
            file.lock_exclusive()
        } else {
            file.lock_shared()
        };
        locked.map_err(|source| StoreError::Lock {
            path: lock_path,
            source,
        })?;

        Ok(file)
    }

    fn read(&self) -> Result<StateFile, StoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StateFile::default()),
            Err(e) => return Err(self.io_err(e)),
        };

        let state: StateFile =
            serde_json::from_str(&contents).map_err(|e| StoreError::Parse {
                path: self.path.clone(),
                message: e.to_string(),
            })?;
        if state.version != STATE_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: state.version,
                expected: STATE_VERSION,
            });
        }
        Ok(state)
    }

    fn write(&self, state: &StateFile) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(state).map_err(|e| StoreError::Parse {
            path: self.path.clone(),
            message: e.to_string(),
        })?;

        let temp_path = self.path.with_extension("json.tmp");
        let mut file = File::create(&temp_path).map_err(|e| self.io_err(e))?;
        file.write_all(contents.as_bytes())
            .map_err(|e| self.io_err(e))?;
        file.sync_all().map_err(|e| self.io_err(e))?;
        fs::rename(&temp_path, &self.path).map_err(|e| self.io_err(e))
    }

    /// Read-modify-write under the exclusive lock.
    fn modify<F, T>(&self, change: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut StateFile) -> (bool, T),
    {
        let _lock = self.acquire(true)?;
        let mut state = self.read()?;
        let (changed, result) = change(&mut state);
        if changed {
            self.write(&state)?;
        }
        Ok(result)
    }
}

impl SubscriptionStore for FileSubscriptionStore {
    fn get(&self, repo: &RepositoryKey) -> Result<Option<WebhookRecord>, StoreError> {
        let _lock = self.acquire(false)?;
        Ok(self.read()?.subscriptions.remove(repo))
    }

    fn set(&self, repo: &RepositoryKey, record: &WebhookRecord) -> Result<(), StoreError> {
        check_record(repo, record)?;
        self.modify(|state| {
            let previous = state.subscriptions.insert(repo.clone(), record.clone());
            (previous.as_ref() != Some(record), ())
        })
    }

    fn delete(&self, repo: &RepositoryKey) -> Result<(), StoreError> {
        self.modify(|state| (state.subscriptions.remove(repo).is_some(), ()))
    }

    fn list(&self) -> Result<Vec<(RepositoryKey, WebhookRecord)>, StoreError> {
        let _lock = self.acquire(false)?;
        Ok(self.read()?.subscriptions.into_iter().collect())
    }

    fn try_lock(&self, repo: &RepositoryKey) -> Result<Option<RepositoryLock>, StoreError> {
        let path = self.repository_lock_path(repo);
        RepositoryLock::try_file(&path).map_err(|source| StoreError::Lock { path, source })
    }

    fn retire(&self, repo: &RepositoryKey) -> Result<(), StoreError> {
        self.modify(|state| {
            let changed = retire_record(&mut state.subscriptions, &mut state.orphaned, repo);
            (changed, ())
        })
    }

    fn orphaned(&self) -> Result<Vec<(RepositoryKey, WebhookRecord)>, StoreError> {
        let _lock = self.acquire(false)?;
        Ok(flatten_orphans(&self.read()?.orphaned))
    }

    fn forget_orphaned(&self, repo: &RepositoryKey) -> Result<Vec<WebhookRecord>, StoreError> {
        self.modify(|state| {
            let forgotten = state.orphaned.remove(repo).unwrap_or_default();
            (!forgotten.is_empty(), forgotten)
        })
    }
}

/// In-memory store for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemorySubscriptionStore {
    records: Mutex<Records>,
    orphans: Mutex<Orphans>,
    locks: LockTable,
    fail_writes: Mutex<bool>,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `set`/`delete` fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().unwrap_or_else(PoisonError::into_inner) = fail;
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if *self.fail_writes.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(StoreError::Unavailable("writes disabled".into()));
        }
        Ok(())
    }

    fn records(&self) -> std::sync::MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn orphans(&self) -> std::sync::MutexGuard<'_, Orphans> {
        self.orphans.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SubscriptionStore for MemorySubscriptionStore {
    fn get(&self, repo: &RepositoryKey) -> Result<Option<WebhookRecord>, StoreError> {
        Ok(self.records().get(repo).cloned())
    }

    fn set(&self, repo: &RepositoryKey, record: &WebhookRecord) -> Result<(), StoreError> {
        check_record(repo, record)?;
        self.check_writable()?;
        self.records().insert(repo.clone(), record.clone());
        Ok(())
    }

    fn delete(&self, repo: &RepositoryKey) -> Result<(), StoreError> {
        self.check_writable()?;
        self.records().remove(repo);
        Ok(())
    }

    fn list(&self) -> Result<Vec<(RepositoryKey, WebhookRecord)>, StoreError> {
        Ok(self
            .records()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn try_lock(&self, repo: &RepositoryKey) -> Result<Option<RepositoryLock>, StoreError> {
        Ok(RepositoryLock::try_table(&self.locks, repo))
    }

    fn retire(&self, repo: &RepositoryKey) -> Result<(), StoreError> {
        self.check_writable()?;
        retire_record(&mut self.records(), &mut self.orphans(), repo);
        Ok(())
    }

    fn orphaned(&self) -> Result<Vec<(RepositoryKey, WebhookRecord)>, StoreError> {
        Ok(flatten_orphans(&self.orphans()))
    }

    fn forget_orphaned(&self, repo: &RepositoryKey) -> Result<Vec<WebhookRecord>, StoreError> {
        self.check_writable()?;
        Ok(self.orphans().remove(repo).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{EventType, HookId};
    use tempfile::TempDir;

    fn repo(name: &str) -> RepositoryKey {
        RepositoryKey::new("octocat", name).unwrap()
    }

    fn record(id: u64, events: &[EventType]) -> WebhookRecord {
        record_at(id, "https://hooks.example.com", events)
    }

    fn record_at(id: u64, url: &str, events: &[EventType]) -> WebhookRecord {
        WebhookRecord::new(HookId(id), url, events.iter().cloned().collect())
    }

    fn stores(temp: &TempDir) -> Vec<Box<dyn SubscriptionStore>> {
        vec![
            Box::new(FileSubscriptionStore::new(
                temp.path().join("state/subscriptions.json"),
            )),
            Box::new(MemorySubscriptionStore::new()),
        ]
    }

    #[test]
    fn get_set_delete() {
        let temp = TempDir::new().unwrap();
        for store in stores(&temp) {
            assert!(store.get(&repo("a")).unwrap().is_none());

            store.set(&repo("a"), &record(1, &[EventType::Issues])).unwrap();
            assert_eq!(
                store.get(&repo("a")).unwrap(),
                Some(record(1, &[EventType::Issues]))
            );

            store.delete(&repo("a")).unwrap();
            assert!(store.get(&repo("a")).unwrap().is_none());
            store.delete(&repo("a")).unwrap();
        }
    }

    #[test]
    fn empty_records_are_rejected() {
        let temp = TempDir::new().unwrap();
        for store in stores(&temp) {
            let err = store.set(&repo("a"), &record(1, &[])).unwrap_err();
            assert!(matches!(err, StoreError::EmptyRecord(_)));
            assert!(store.list().unwrap().is_empty());
        }
    }

    #[test]
    fn list_is_ordered() {
        let temp = TempDir::new().unwrap();
        for store in stores(&temp) {
            store.set(&repo("zeta"), &record(2, &[EventType::Push])).unwrap();
            store.set(&repo("alpha"), &record(1, &[EventType::Push])).unwrap();
            let names: Vec<String> = store
                .list()
                .unwrap()
                .into_iter()
                .map(|(k, _)| k.to_string())
                .collect();
            assert_eq!(names, vec!["octocat/alpha", "octocat/zeta"]);
        }
    }

    #[test]
    fn file_store_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("subscriptions.json");
        FileSubscriptionStore::new(&path)
            .set(
                &repo("a"),
                &record(7, &[EventType::PullRequest, EventType::Issues]),
            )
            .unwrap();

        let reopened = FileSubscriptionStore::new(&path);
        assert_eq!(
            reopened.get(&repo("a")).unwrap(),
            Some(record(7, &[EventType::Issues, EventType::PullRequest]))
        );
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn file_format_is_versioned_json() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("subscriptions.json");
        FileSubscriptionStore::new(&path)
            .set(&repo("a"), &record(3, &[EventType::IssueComment]))
            .unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["subscriptions"]["octocat/a"]["id"], 3);
        assert_eq!(
            value["subscriptions"]["octocat/a"]["events"],
            serde_json::json!(["issue_comment"])
        );
    }

    #[test]
    fn unknown_version_is_refused() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("subscriptions.json");
        fs::write(&path, r#"{"version": 9, "subscriptions": {}}"#).unwrap();

        let err = FileSubscriptionStore::new(&path).list().unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedVersion { found: 9, .. }));
    }

    #[test]
    fn corrupt_file_is_a_parse_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("subscriptions.json");
        fs::write(&path, "{not json").unwrap();

        let err = FileSubscriptionStore::new(&path).get(&repo("a")).unwrap_err();
        assert!(matches!(err, StoreError::Parse { .. }));
    }

    #[test]
    fn memory_store_write_failures() {
        let store = MemorySubscriptionStore::new();
        store.fail_writes(true);
        assert!(matches!(
            store.set(&repo("a"), &record(1, &[EventType::Push])),
            Err(StoreError::Unavailable(_))
        ));
        store.fail_writes(false);
        store.set(&repo("a"), &record(1, &[EventType::Push])).unwrap();
    }

    // =========================================================================
    // Orphaned records
    // =========================================================================

    #[test]
    fn retire_moves_record_to_orphaned() {
        let temp = TempDir::new().unwrap();
        for store in stores(&temp) {
            let old = record_at(5, "https://old.example.com", &[EventType::Push]);
            store.set(&repo("a"), &old).unwrap();

            store.retire(&repo("a")).unwrap();
            store.retire(&repo("a")).unwrap();

            assert!(store.get(&repo("a")).unwrap().is_none());
            assert_eq!(store.orphaned().unwrap(), vec![(repo("a"), old.clone())]);

            // A new record for the same repository does not touch the orphan.
            store.set(&repo("a"), &record(9, &[EventType::Issues])).unwrap();
            store.delete(&repo("a")).unwrap();
            assert_eq!(store.orphaned().unwrap(), vec![(repo("a"), old.clone())]);

            assert_eq!(store.forget_orphaned(&repo("a")).unwrap(), vec![old]);
            assert!(store.orphaned().unwrap().is_empty());
            assert!(store.forget_orphaned(&repo("a")).unwrap().is_empty());
        }
    }

    #[test]
    fn orphans_survive_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("subscriptions.json");
        let old = record_at(5, "https://old.example.com", &[EventType::Push]);
        {
            let store = FileSubscriptionStore::new(&path);
            store.set(&repo("a"), &old).unwrap();
            store.retire(&repo("a")).unwrap();
        }

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["orphaned"]["octocat/a"][0]["id"], 5);
        assert_eq!(
            FileSubscriptionStore::new(&path).orphaned().unwrap(),
            vec![(repo("a"), old)]
        );
    }

    // =========================================================================
    // Reconciliation locks
    // =========================================================================

    #[test]
    fn reconciliation_lock_is_exclusive_per_repository() {
        let temp = TempDir::new().unwrap();
        for store in stores(&temp) {
            let held = store.try_lock(&repo("a")).unwrap().expect("lock is free");
            assert!(store.try_lock(&repo("a")).unwrap().is_none());
            assert!(store.try_lock(&repo("b")).unwrap().is_some());

            drop(held);
            assert!(store.try_lock(&repo("a")).unwrap().is_some());
        }
    }

    #[test]
    fn file_lock_is_shared_between_store_handles() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("subscriptions.json");
        let first = FileSubscriptionStore::new(&path);
        let second = FileSubscriptionStore::new(&path);

        let held = first.try_lock(&repo("a")).unwrap().unwrap();
        assert!(second.try_lock(&repo("a")).unwrap().is_none());
        assert!(held
            .path()
            .unwrap()
            .starts_with(temp.path().join("subscriptions.locks")));

        // Record writes use a different lock and are not blocked.
        second.set(&repo("a"), &record(1, &[EventType::Push])).unwrap();
        drop(held);
        assert!(second.try_lock(&repo("a")).unwrap().is_some());
    }
}
