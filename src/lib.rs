//! Hookwise - GitHub webhook subscriptions and paginated traversal
//!
//! Hookwise keeps one webhook per repository in step with the events a
//! caller subscribes to, and walks server-paginated collections whichever
//! pagination idiom the endpoint uses.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface layer
//! - [`subscriptions`] - Register/unregister reconciliation and local state
//! - [`events`] - Inbound classification, dispatch, webhook and polling sources
//! - [`pagination`] - Link header parsing and next-page resolution
//! - [`forge`] - Remote API gateways (GitHub and an in-memory mock)
//! - [`core`] - Domain types and configuration
//! - [`secrets`] - Token storage
//!
//! # Correctness Invariants
//!
//! 1. A repository has a local webhook record iff its event set is non-empty
//! 2. Only webhooks targeting the configured callback URL are ever mutated
//! 3. The remote listing is consulted before every mutating decision
//! 4. Local state changes only after the remote change succeeded
//! 5. Register/unregister calls for one repository never interleave

pub mod cli;
pub mod core;
pub mod events;
pub mod forge;
pub mod pagination;
pub mod secrets;
pub mod subscriptions;
