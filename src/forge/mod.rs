//! forge
//!
//! Boundary to the remote hosting service.
//!
//! # Architecture
//!
//! The [`HookGateway`] trait is the only way the subscription manager
//! touches remote webhooks, and [`ActivityFeed`] is the only way the
//! polling source reads activity. Both are injected as trait objects so
//! tests can swap in [`mock::MockForge`].
//!
//! Gateway failures never touch local state; the caller decides whether to
//! retry.
//!
//! # Modules
//!
//! - `traits`: Gateway traits and request/response types
//! - [`github`]: GitHub REST implementation, plus collection traversal
//! - [`mock`]: In-memory implementation for deterministic testing
//! - `collection`: Paginated list endpoints
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use hookwise::forge::{github::GitHubForge, HookGateway};
//!
//! let gateway: Arc<dyn HookGateway> = Arc::new(GitHubForge::new(Some(token)));
//! let hooks = gateway.list_hooks(&repo).await?;
//! ```

mod collection;
pub mod github;
pub mod mock;
mod traits;

pub use collection::{Collection, IssueKind};
pub use traits::*;
