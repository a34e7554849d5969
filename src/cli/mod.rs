//! cli
//!
//! Command-line interface layer for hookwise.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Install logging
//! - Delegate to command handlers
//!
//! # Architecture
//!
//! The CLI layer is thin. Handlers load configuration, build the
//! [`SubscriptionManager`](crate::subscriptions::SubscriptionManager) or
//! forge they need, and format results. Reconciliation rules live in the
//! library.

pub mod args;
pub mod commands;

pub use args::{Cli, Shell};

use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use tracing_subscriber::EnvFilter;

use crate::core::config::Config;

/// Environment variable holding a tracing filter directive.
pub const LOG_ENV: &str = "HOOKWISE_LOG";

/// Per-invocation settings shared by every command.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Explicit config file from `--config`
    pub config_path: Option<PathBuf>,
    pub debug: bool,
    pub quiet: bool,
    /// Whether prompts may be shown
    pub interactive: bool,
}

impl Context {
    /// Load configuration, honouring `--config`.
    pub fn load_config(&self) -> Result<Config> {
        match &self.config_path {
            Some(path) => {
                let mut config = Config::load_file(path)
                    .with_context(|| format!("Failed to load config from {}", path.display()))?;
                config
                    .apply_overrides(|name| std::env::var(name).ok())
                    .context("Invalid configuration")?;
                Ok(config)
            }
            None => Config::load().context("Failed to load config"),
        }
    }
}

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();
    init_tracing(cli.debug, cli.quiet);

    let ctx = Context {
        config_path: cli.config.clone(),
        debug: cli.debug,
        quiet: cli.quiet,
        interactive: !cli.quiet && std::io::stdin().is_terminal(),
    };

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(commands::dispatch(cli.command, &ctx))
}

/// Install the stderr log subscriber.
///
/// `HOOKWISE_LOG` wins when set; otherwise `--debug` and `--quiet` pick the
/// level for this crate.
pub fn init_tracing(debug: bool, quiet: bool) {
    let default = if debug {
        "hookwise=debug"
    } else if quiet {
        "hookwise=warn"
    } else {
        "hookwise=info"
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

    // A subscriber may already be installed when embedded or under test.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
