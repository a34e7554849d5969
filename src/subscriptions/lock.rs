//! subscriptions::lock
//!
//! Mutual exclusion for repository reconciliation.
//!
//! Two layers cooperate:
//!
//! - [`KeyedLocks`] serializes tasks inside one process. Work on one key is
//!   serialized; work on different keys never waits on each other. Idle
//!   entries are pruned on the next acquisition, so the map only holds keys
//!   that are locked or awaited.
//! - [`RepositoryLock`] serializes processes. It is an OS advisory lock on a
//!   per-repository file (or an entry in a shared table for stores that
//!   live in memory) and is released on drop.
//!
//! # Example
//!
//! ```
//! use hookwise::subscriptions::RepositoryLock;
//! use tempfile::TempDir;
//!
//! let dir = TempDir::new().unwrap();
//! let path = dir.path().join("octocat@hello.lock");
//!
//! let held = RepositoryLock::try_file(&path).unwrap().expect("free");
//! assert!(RepositoryLock::try_file(&path).unwrap().is_none());
//!
//! drop(held);
//! assert!(RepositoryLock::try_file(&path).unwrap().is_some());
//! ```

use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File, OpenOptions};
use std::hash::Hash;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};

use fs2::FileExt;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::core::types::RepositoryKey;

/// A set of async mutexes indexed by key.
#[derive(Debug)]
pub struct KeyedLocks<K> {
    locks: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for exclusive access to `key`.
    ///
    /// Access is released when the returned guard is dropped.
    pub async fn lock(&self, key: &K) -> OwnedMutexGuard<()> {
        let slot = {
            let mut locks = self.locks.lock().await;
            // Entries referenced only by the map are idle.
            locks.retain(|_, slot| Arc::strong_count(slot) > 1);
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        slot.lock_owned().await
    }

    /// Number of keys currently locked or awaited.
    pub async fn active(&self) -> usize {
        let locks = self.locks.lock().await;
        locks
            .values()
            .filter(|slot| Arc::strong_count(slot) > 1)
            .count()
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Repositories currently locked through a [`RepositoryLock::try_table`].
pub type LockTable = Arc<std::sync::Mutex<BTreeSet<RepositoryKey>>>;

/// An exclusive lock on one repository's reconciliation.
///
/// The lock is automatically released when dropped.
#[derive(Debug)]
pub struct RepositoryLock {
    held: Held,
}

#[derive(Debug)]
enum Held {
    File { path: PathBuf, file: Option<File> },
    Table { repo: RepositoryKey, table: LockTable },
}

impl RepositoryLock {
    /// Try to take an exclusive OS lock on `path`, creating it if needed.
    ///
    /// Returns `Ok(None)` if another handle (in this or any other process)
    /// holds the lock.
    pub fn try_file(path: &Path) -> io::Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                held: Held::File {
                    path: path.to_path_buf(),
                    file: Some(file),
                },
            })),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Try to claim `repo` in an in-memory table.
    ///
    /// Returns `None` if the repository is already claimed.
    pub fn try_table(table: &LockTable, repo: &RepositoryKey) -> Option<Self> {
        let mut held = table.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(repo.clone()) {
            return None;
        }
        Some(Self {
            held: Held::Table {
                repo: repo.clone(),
                table: Arc::clone(table),
            },
        })
    }

    /// The lock file, for file-backed locks.
    pub fn path(&self) -> Option<&Path> {
        match &self.held {
            Held::File { path, .. } => Some(path),
            Held::Table { .. } => None,
        }
    }
}

impl Drop for RepositoryLock {
    fn drop(&mut self) {
        match &mut self.held {
            Held::File { file, .. } => {
                if let Some(file) = file.take() {
                    let _ = FileExt::unlock(&file);
                }
            }
            Held::Table { repo, table } => {
                table
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(repo);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn same_key_is_serialized() {
        let locks = Arc::new(KeyedLocks::new());
        let first = locks.lock(&"a").await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock(&"a").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should acquire after release")
            .unwrap();
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let _a = locks.lock(&"a").await;
        tokio::time::timeout(Duration::from_secs(1), locks.lock(&"b"))
            .await
            .expect("other key should not wait");
    }

    #[tokio::test]
    async fn idle_entries_are_pruned() {
        let locks = KeyedLocks::new();
        {
            let _a = locks.lock(&"a").await;
            assert_eq!(locks.active().await, 1);
        }
        assert_eq!(locks.active().await, 0);

        let _b = locks.lock(&"b").await;
        assert_eq!(locks.locks.lock().await.len(), 1);
    }

    #[test]
    fn file_lock_excludes_a_second_handle() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("locks").join("octocat@hello.lock");

        let first = RepositoryLock::try_file(&path).unwrap().unwrap();
        assert_eq!(first.path(), Some(path.as_path()));
        assert!(RepositoryLock::try_file(&path).unwrap().is_none());

        drop(first);
        assert!(RepositoryLock::try_file(&path).unwrap().is_some());
    }

    #[test]
    fn table_lock_is_per_repository() {
        let table = LockTable::default();
        let hello = RepositoryKey::new("octocat", "hello").unwrap();
        let other = RepositoryKey::new("octocat", "other").unwrap();

        let held = RepositoryLock::try_table(&table, &hello).unwrap();
        assert!(RepositoryLock::try_table(&table, &hello).is_none());
        assert!(RepositoryLock::try_table(&table, &other).is_some());

        drop(held);
        assert!(RepositoryLock::try_table(&table, &hello).is_some());
        assert!(table.lock().unwrap().is_empty());
    }
}
