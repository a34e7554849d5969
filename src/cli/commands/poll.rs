//! poll command - Watch a repository's activity feed

use std::sync::Arc;

use anyhow::{Context as _, Result};
use tokio::sync::broadcast::error::RecvError;

use super::github;
use crate::cli::Context;
use crate::core::types::{EventKind, RepositoryKey};
use crate::events::{BroadcastDispatcher, DeliveredEvent, EventSource, PollingSource};

fn print_event(event: &DeliveredEvent) -> Result<()> {
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}

/// Poll `repo` and print new events as JSON lines.
///
/// With `once`, records the baseline, waits one interval, polls again, and
/// exits. Otherwise polls until the process is stopped.
pub async fn poll(ctx: &Context, repo: &RepositoryKey, kinds: &[EventKind], once: bool) -> Result<()> {
    let config = ctx.load_config()?;
    let forge = github(&config)?;
    let interval = config.poll_interval();

    let dispatcher = BroadcastDispatcher::default();
    let mut events = dispatcher.subscribe();
    let source = PollingSource::new(Arc::new(forge), Arc::new(dispatcher), interval);

    let kinds: Vec<EventKind> = if kinds.is_empty() {
        EventKind::ALL.to_vec()
    } else {
        kinds.to_vec()
    };
    for kind in kinds {
        source.subscribe(repo, kind).await?;
    }

    if !ctx.quiet {
        eprintln!("Watching {} every {}s.", repo, interval.as_secs());
    }

    if once {
        let baseline = source
            .poll_once(repo)
            .await
            .with_context(|| format!("Failed to read activity for {}", repo))?;
        let wait = baseline.poll_interval.map_or(interval, |hint| interval.max(hint));
        tokio::time::sleep(wait).await;
        source
            .poll_once(repo)
            .await
            .with_context(|| format!("Failed to read activity for {}", repo))?;

        while let Ok(event) = events.try_recv() {
            print_event(&event)?;
        }
        return Ok(());
    }

    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Err(e) = print_event(&event) {
                        tracing::warn!(error = %e, "failed to print event");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "output fell behind, events dropped")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    source.run(repo).await;
    drop(source);
    printer.await.context("Event printer failed")?;
    Ok(())
}
