//! status command - Show locally recorded subscriptions

use anyhow::{Context as _, Result};
use serde_json::json;

use super::subscription_manager;
use crate::cli::Context;
use crate::core::types::{RepositoryKey, WebhookRecord};

/// Print every local webhook record, flagging orphaned ones.
pub fn status(ctx: &Context, as_json: bool) -> Result<()> {
    let config = ctx.load_config()?;
    let manager = subscription_manager(&config)?;

    let records = manager
        .subscriptions()
        .context("Failed to read subscription state")?;
    let orphaned = manager
        .orphaned()
        .context("Failed to read subscription state")?;

    // Current records first, then orphans that are no longer filed under
    // their repository.
    let mut rows: Vec<(&RepositoryKey, &WebhookRecord, bool)> = records
        .iter()
        .map(|(repo, record)| {
            let is_orphan = orphaned.iter().any(|(r, o)| r == repo && o == record);
            (repo, record, is_orphan)
        })
        .collect();
    rows.extend(
        orphaned
            .iter()
            .filter(|(repo, record)| !records.iter().any(|(r, c)| r == repo && c == record))
            .map(|(repo, record)| (repo, record, true)),
    );

    if as_json {
        for (repo, record, is_orphan) in &rows {
            let line = json!({
                "repository": repo,
                "id": record.id,
                "url": record.url,
                "events": record.events,
                "orphaned": is_orphan,
            });
            println!("{}", line);
        }
        return Ok(());
    }

    if rows.is_empty() {
        if !ctx.quiet {
            println!("No subscriptions.");
        }
        return Ok(());
    }

    if !ctx.quiet {
        match manager.callback_url() {
            Some(url) => println!("Callback URL: {}", url),
            None => println!("Callback URL: (not set)"),
        }
    }

    for (repo, record, is_orphan) in &rows {
        let events: Vec<&str> = record.events.iter().map(|e| e.as_str()).collect();
        let marker = if *is_orphan {
            format!("  [orphaned: {}]", record.url)
        } else {
            String::new()
        };
        println!(
            "{}  hook {}  {}{}",
            repo,
            record.id,
            events.join(","),
            marker
        );
    }

    if !orphaned.is_empty() && !ctx.quiet {
        tracing::warn!(
            count = orphaned.len(),
            "records target a previous callback URL; run 'hookwise forget <repo>' once the old webhooks are removed"
        );
    }

    Ok(())
}
