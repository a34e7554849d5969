//! forget command - Drop orphaned records for a repository

use anyhow::{Context as _, Result};

use super::subscription_manager;
use crate::cli::Context;
use crate::core::types::RepositoryKey;

/// Forget the orphaned records kept for `repo`.
pub async fn forget(ctx: &Context, repo: &RepositoryKey) -> Result<()> {
    let config = ctx.load_config()?;
    let manager = subscription_manager(&config)?;

    let forgotten = manager
        .forget_orphaned(repo)
        .await
        .with_context(|| format!("Failed to forget orphaned records for {}", repo))?;

    if !ctx.quiet {
        if forgotten.is_empty() {
            println!("No orphaned records for {}.", repo);
        }
        for record in &forgotten {
            println!(
                "Forgot webhook {} on {} ({}).",
                record.id, repo, record.url
            );
        }
    }
    Ok(())
}
