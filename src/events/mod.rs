//! events
//!
//! Inbound event classification and delivery.
//!
//! # Modules
//!
//! - [`classify`] - Webhook payload to [`EventKey`](crate::core::types::EventKey) rules
//! - [`dispatch`] - In-process fan-out of classified events
//! - [`source`] - Webhook and polling subscription strategies

pub mod classify;
pub mod dispatch;
pub mod source;

pub use classify::{classify, ClassifyError, InboundHandler};
pub use dispatch::{BroadcastDispatcher, DeliveredEvent, EventDispatcher, DEFAULT_CAPACITY};
pub use source::{
    activity_keys, EventSource, PollOutcome, PollingSource, SourceError, WebhookSource,
};
