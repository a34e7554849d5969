//! subscriptions
//!
//! Webhook subscription lifecycle.
//!
//! # Modules
//!
//! - [`manager`] - Idempotent register/unregister against the remote hooks
//! - [`store`] - Local mirror of managed webhooks
//! - [`lock`] - Per-repository serialization, in process and across processes
//!
//! The remote listing is the source of truth. The local store is a cache
//! that is rewritten only after a remote call succeeds.

pub mod lock;
pub mod manager;
pub mod store;

pub use lock::{KeyedLocks, LockTable, RepositoryLock};
pub use manager::{RegisterOutcome, SubscriptionError, SubscriptionManager, UnregisterOutcome};
pub use store::{
    FileSubscriptionStore, MemorySubscriptionStore, StoreError, SubscriptionStore, STATE_VERSION,
};
