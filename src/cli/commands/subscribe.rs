//! subscribe/unsubscribe commands - Manage a repository's webhook events

use anyhow::{bail, Context as _, Result};

use super::subscription_manager;
use crate::cli::Context;
use crate::core::config::EventSourceKind;
use crate::core::types::{EventKind, EventType, RepositoryKey};
use crate::subscriptions::{RegisterOutcome, UnregisterOutcome};

/// Pick the remote event type from a kind or `--raw`.
fn event_type(kind: Option<EventKind>, raw: Option<EventType>) -> Result<EventType> {
    match (kind, raw) {
        (_, Some(raw)) => Ok(raw),
        (Some(kind), None) => Ok(kind.event_type()),
        (None, None) => bail!("an event kind or --raw <EVENT_TYPE> is required"),
    }
}

fn require_webhooks(ctx: &Context) -> Result<crate::core::config::Config> {
    let config = ctx.load_config()?;
    if config.event_source() == EventSourceKind::Polling {
        bail!(
            "event_source is 'polling'; webhooks are not managed in this mode. \
             Use 'hookwise poll' instead."
        );
    }
    Ok(config)
}

/// Add an event to the repository's managed webhook.
pub async fn subscribe(
    ctx: &Context,
    repo: &RepositoryKey,
    kind: Option<EventKind>,
    raw: Option<EventType>,
) -> Result<()> {
    let event = event_type(kind, raw)?;
    let config = require_webhooks(ctx)?;
    let manager = subscription_manager(&config)?;

    let outcome = manager
        .register(repo, &event)
        .await
        .with_context(|| format!("Failed to subscribe {} to '{}'", repo, event))?;

    if !ctx.quiet {
        match outcome {
            RegisterOutcome::Created(id) => {
                println!("Created webhook {} on {} for '{}'.", id, repo, event)
            }
            RegisterOutcome::Updated(id) => {
                println!("Added '{}' to webhook {} on {}.", event, id, repo)
            }
            RegisterOutcome::AlreadySubscribed(id) => {
                println!("Webhook {} on {} already delivers '{}'.", id, repo, event)
            }
        }
    }
    Ok(())
}

/// Remove an event from the repository's managed webhook.
pub async fn unsubscribe(
    ctx: &Context,
    repo: &RepositoryKey,
    kind: Option<EventKind>,
    raw: Option<EventType>,
) -> Result<()> {
    let event = event_type(kind, raw)?;
    let config = require_webhooks(ctx)?;
    let manager = subscription_manager(&config)?;

    let outcome = manager
        .unregister(repo, &event)
        .await
        .with_context(|| format!("Failed to unsubscribe {} from '{}'", repo, event))?;

    if !ctx.quiet {
        match outcome {
            UnregisterOutcome::Deleted(id) => {
                println!("Deleted webhook {} on {} ('{}' was its last event).", id, repo, event)
            }
            UnregisterOutcome::Updated(id) => {
                println!("Removed '{}' from webhook {} on {}.", event, id, repo)
            }
            UnregisterOutcome::NotSubscribed => {
                println!("{} is not subscribed to '{}'.", repo, event)
            }
        }
    }
    Ok(())
}
