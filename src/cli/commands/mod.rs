//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Validates command-specific arguments
//! 2. Builds the library services it needs from configuration
//! 3. Formats and displays output
//!
//! # Async Commands
//!
//! Commands that talk to the API are async. [`crate::cli::run`] owns the
//! runtime and awaits [`dispatch`].

mod auth;
mod completion;
mod config_cmd;
mod deliver;
mod forget;
mod list;
mod poll;
mod status;
mod subscribe;

pub use auth::auth;
pub use completion::completion;
pub use config_cmd::{path as config_path, show as config_show};
pub use deliver::deliver;
pub use forget::forget;
pub use list::list;
pub use poll::poll;
pub use status::status;
pub use subscribe::{subscribe, unsubscribe};

use std::sync::Arc;

use anyhow::{Context as _, Result};

use crate::cli::args::{CollectionScope, Command, ConfigAction};
use crate::cli::Context;
use crate::core::config::Config;
use crate::forge::github::GitHubForge;
use crate::secrets::{self, Token};
use crate::subscriptions::{FileSubscriptionStore, SubscriptionManager};

/// Dispatch a command to its handler.
pub async fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Auth {
            token,
            status,
            logout,
            open,
        } => auth::auth(ctx, token.as_deref(), status, logout, open),
        Command::Subscribe { repo, kind, raw } => {
            subscribe::subscribe(ctx, &repo, kind, raw).await
        }
        Command::Unsubscribe { repo, kind, raw } => {
            subscribe::unsubscribe(ctx, &repo, kind, raw).await
        }
        Command::Status { json } => status::status(ctx, json),
        Command::Forget { repo } => forget::forget(ctx, &repo).await,
        Command::List {
            collection,
            owner,
            repo,
            number,
            kind,
            query,
            args,
            per_page,
            limit,
        } => {
            let scope = CollectionScope {
                owner,
                repo,
                number,
                kind,
            };
            let collection = collection.resolve(scope).map_err(anyhow::Error::msg)?;
            list::list(ctx, &collection, query, &args, per_page, limit).await
        }
        Command::Deliver { file } => deliver::deliver(ctx, file.as_deref()),
        Command::Poll { repo, kinds, once } => poll::poll(ctx, &repo, &kinds, once).await,
        Command::Config { action } => match action {
            ConfigAction::Show => config_cmd::show(ctx),
            ConfigAction::Path => config_cmd::path(ctx),
        },
        Command::Completion { shell } => completion::completion(shell),
    }
}

/// Resolve the API token from the environment or the configured store.
fn resolve_token(config: &Config) -> Result<Option<Token>> {
    let store = secrets::create_store(config.secrets_provider())
        .context("Failed to initialize secret store")?;
    secrets::resolve_token(store.as_ref(), |name| std::env::var(name).ok())
        .context("Failed to read API token")
}

/// A GitHub client for the configured API, authenticated when a token exists.
fn github(config: &Config) -> Result<GitHubForge> {
    let token = resolve_token(config)?;
    Ok(GitHubForge::with_api_base(
        token.map(|t| t.value),
        config.api_base(),
    ))
}

/// A subscription manager backed by GitHub and the configured state file.
fn subscription_manager(config: &Config) -> Result<SubscriptionManager> {
    let forge = github(config)?;
    let state_path = config.state_path().context("Failed to locate state file")?;
    Ok(SubscriptionManager::new(
        Arc::new(forge),
        Arc::new(FileSubscriptionStore::new(state_path)),
        config.callback_url().map(str::to_string),
    ))
}
