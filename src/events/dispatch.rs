//! events::dispatch
//!
//! Fan-out of classified events to in-process subscribers.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::core::types::EventKey;

/// Default number of events a slow receiver may lag behind.
pub const DEFAULT_CAPACITY: usize = 256;

/// A classified event and the payload it came from.
///
/// The payload is shared: an inbound delivery that yields several keys
/// emits them all against the same allocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveredEvent {
    #[serde(flatten)]
    pub key: EventKey,
    pub payload: Arc<Value>,
}

impl DeliveredEvent {
    pub fn new(key: EventKey, payload: Arc<Value>) -> Self {
        Self { key, payload }
    }
}

/// Receives classified events.
pub trait EventDispatcher: Send + Sync {
    /// Hand `event` to every current subscriber and return how many got it.
    fn emit(&self, event: DeliveredEvent) -> usize;
}

/// Dispatcher backed by a tokio broadcast channel.
///
/// Events emitted while nobody is subscribed are dropped.
#[derive(Debug, Clone)]
pub struct BroadcastDispatcher {
    sender: broadcast::Sender<DeliveredEvent>,
}

impl BroadcastDispatcher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Start receiving events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<DeliveredEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventDispatcher for BroadcastDispatcher {
    fn emit(&self, event: DeliveredEvent) -> usize {
        let key = event.key.to_string();
        match self.sender.send(event) {
            Ok(receivers) => {
                debug!(event = %key, receivers, "dispatched event");
                receivers
            }
            Err(_) => {
                debug!(event = %key, "no subscribers, event dropped");
                0
            }
        }
    }
}
