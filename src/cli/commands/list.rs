//! list command - Traverse a paginated collection

use anyhow::{bail, Context as _, Result};

use super::github;
use crate::cli::Context;
use crate::forge::Collection;
use crate::pagination::cursor::QUERY;
use crate::pagination::{ArgValue, PageArgs};

/// Build request arguments from `--arg key=value` pairs and shorthands.
fn build_args(query: Option<String>, pairs: &[String], per_page: Option<u32>) -> Result<PageArgs> {
    let mut args = PageArgs::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Invalid --arg '{}': expected KEY=VALUE", pair);
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("Invalid --arg '{}': key cannot be empty", pair);
        }
        args.set(key, ArgValue::parse(value));
    }
    if let Some(query) = query {
        args.set(QUERY, query);
    }
    if let Some(per_page) = per_page {
        args.set("per_page", per_page);
    }
    Ok(args)
}

/// Print every item of `collection` as a JSON line.
pub async fn list(
    ctx: &Context,
    collection: &Collection,
    query: Option<String>,
    pairs: &[String],
    per_page: Option<u32>,
    limit: Option<usize>,
) -> Result<()> {
    let args = build_args(query, pairs, per_page)?;
    let config = ctx.load_config()?;
    let forge = github(&config)?;

    let items = forge
        .collect(collection, &args, limit)
        .await
        .with_context(|| format!("Failed to list {}", collection))?;

    for item in &items {
        println!("{}", serde_json::to_string(item)?);
    }
    tracing::debug!(collection = %collection, count = items.len(), "listed");
    Ok(())
}
