//! config command - Show the effective configuration or its path

use anyhow::{Context as _, Result};

use crate::cli::Context;
use crate::core::config::{Config, EventSourceKind, CALLBACK_URL_ENV};

/// Print the effective configuration as TOML, defaults included.
pub fn show(ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;

    match config.loaded_from() {
        Some(path) => println!("# Loaded from {}", path.display()),
        None => println!("# No config file found; showing defaults"),
    }
    if std::env::var(CALLBACK_URL_ENV).is_ok_and(|v| !v.is_empty()) {
        println!("# callback_url overridden by {}", CALLBACK_URL_ENV);
    }

    match config.callback_url() {
        Some(url) => println!("callback_url = {}", toml_string(url)),
        None => println!("# callback_url = (not set)"),
    }
    println!("api_base = {}", toml_string(config.api_base()));
    let event_source = match config.event_source() {
        EventSourceKind::Webhook => "webhook",
        EventSourceKind::Polling => "polling",
    };
    println!("event_source = {}", toml_string(event_source));
    let state_path = config.state_path().context("Failed to locate state file")?;
    println!("state_path = {}", toml_string(&state_path.display().to_string()));
    println!();
    println!("[polling]");
    println!("interval_secs = {}", config.poll_interval().as_secs());
    println!();
    println!("[secrets]");
    println!("provider = {}", toml_string(config.secrets_provider()));

    Ok(())
}

/// Print the config file in use, or where one would be created.
pub fn path(ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;
    let path = match config.loaded_from() {
        Some(path) => path.to_path_buf(),
        None => Config::default_path().context("Failed to determine config path")?,
    };
    println!("{}", path.display());
    Ok(())
}

fn toml_string(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}
