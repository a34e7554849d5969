//! cli::commands::auth
//!
//! Store, inspect, or remove the GitHub API token.
//!
//! # Design
//!
//! - Tokens are stored through the configured [`SecretStore`]
//! - Token values are NEVER printed to stdout/stderr
//! - `GITHUB_TOKEN` in the environment shadows the stored token

use std::io::{self, Write};

use anyhow::{bail, Context as _, Result};

use crate::cli::Context;
use crate::secrets::{self, SecretStore, TokenSource, GITHUB_TOKEN_KEY, TOKEN_ENV};

/// Page for creating a classic token with the scopes webhook management needs.
const TOKEN_PAGE: &str =
    "https://github.com/settings/tokens/new?scopes=admin:repo_hook,repo&description=hookwise";

/// Run the auth command.
///
/// # Security
///
/// This function NEVER prints the token value. It only confirms success/failure.
pub fn auth(
    ctx: &Context,
    token: Option<&str>,
    status: bool,
    logout: bool,
    open: bool,
) -> Result<()> {
    let config = ctx.load_config()?;
    let store = secrets::create_store(config.secrets_provider())
        .context("Failed to initialize secret store")?;

    if status {
        return show_status(store.as_ref(), ctx.quiet);
    }

    if logout {
        store
            .delete(GITHUB_TOKEN_KEY)
            .context("Failed to remove stored token")?;
        if !ctx.quiet {
            println!("Removed stored token.");
        }
        return Ok(());
    }

    if open && token.is_none() {
        if let Err(e) = open::that(TOKEN_PAGE) {
            tracing::warn!(error = %e, "could not open browser");
            println!("Create a token at: {}", TOKEN_PAGE);
        }
    }

    let value = read_token(ctx, token)?;
    validate_token(&value)?;

    store
        .set(GITHUB_TOKEN_KEY, &value)
        .context("Failed to store token")?;

    if !ctx.quiet {
        println!("Token stored.");
        if std::env::var(TOKEN_ENV).is_ok_and(|v| !v.trim().is_empty()) {
            println!("Note: {} is set and takes precedence.", TOKEN_ENV);
        }
    }

    Ok(())
}

fn show_status(store: &dyn SecretStore, quiet: bool) -> Result<()> {
    let token = secrets::resolve_token(store, |name| std::env::var(name).ok())
        .context("Failed to read stored token")?;

    match (quiet, token.map(|t| t.source)) {
        (true, Some(_)) => println!("authenticated"),
        (true, None) => println!("not_authenticated"),
        (false, Some(TokenSource::Environment)) => {
            println!("Authenticated via {}.", TOKEN_ENV)
        }
        (false, Some(TokenSource::Store)) => println!("Authenticated via stored token."),
        (false, None) => {
            println!("Not authenticated.");
            println!("Run 'hookwise auth' or set {}.", TOKEN_ENV);
        }
    }

    Ok(())
}

/// Get token from argument or interactive prompt.
fn read_token(ctx: &Context, token_arg: Option<&str>) -> Result<String> {
    if let Some(t) = token_arg {
        return Ok(t.to_string());
    }

    if !ctx.interactive {
        bail!("Token required. Use --token <TOKEN> or run interactively.");
    }

    print!("GitHub token: ");
    io::stdout().flush()?;

    let token = rpassword::read_password().context("Failed to read token")?;
    Ok(token.trim().to_string())
}

/// Basic format checks; the token is not verified against the API here.
fn validate_token(token: &str) -> Result<()> {
    if token.is_empty() {
        bail!("Token cannot be empty.");
    }

    if token.len() < 10 {
        bail!("Token appears to be too short.");
    }

    if token.chars().any(char::is_whitespace) {
        bail!("Token should not contain whitespace.");
    }

    Ok(())
}
