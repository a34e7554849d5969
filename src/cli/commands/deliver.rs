//! deliver command - Classify a webhook delivery payload

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, Result};

use crate::cli::Context;
use crate::events::{BroadcastDispatcher, InboundHandler};

/// Classify one delivery and print the raised events as JSON lines.
pub fn deliver(ctx: &Context, file: Option<&Path>) -> Result<()> {
    let body = match file {
        Some(path) => std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut body = Vec::new();
            std::io::stdin()
                .read_to_end(&mut body)
                .context("Failed to read payload from stdin")?;
            body
        }
    };

    let dispatcher = BroadcastDispatcher::default();
    let mut events = dispatcher.subscribe();
    let handler = InboundHandler::new(Arc::new(dispatcher));

    let keys = handler
        .handle(&body)
        .context("Failed to classify delivery")?;

    while let Ok(event) = events.try_recv() {
        println!("{}", serde_json::to_string(&event.key)?);
    }

    if keys.is_empty() && !ctx.quiet {
        eprintln!("Delivery matched no event kind.");
    }
    Ok(())
}
