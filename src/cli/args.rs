//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--config <path>`: Use this config file instead of the default search
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::core::types::{EventKind, EventType, RepositoryKey};
use crate::forge::{Collection, IssueKind};

/// Hookwise - webhook subscriptions and paginated traversal for GitHub
#[derive(Parser, Debug)]
#[command(name = "hookwise")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Use this config file instead of the default search
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Store or inspect the GitHub API token
    #[command(
        name = "auth",
        long_about = "Store or inspect the GitHub API token.\n\n\
            Hookwise needs a token with admin:repo_hook scope to manage webhooks. \
            The GITHUB_TOKEN environment variable always takes precedence over the \
            stored token.",
        after_help = "\
WORKFLOW EXAMPLES:
    # Store a token (prompts with hidden input)
    hookwise auth

    # Store a token non-interactively
    hookwise auth --token ghp_xxxx

    # Open the token creation page in a browser
    hookwise auth --open

    # Check which token would be used
    hookwise auth --status

    # Remove the stored token
    hookwise auth --logout"
    )]
    Auth {
        /// Token to store (prompted for when omitted)
        #[arg(long, conflicts_with_all = ["status", "logout"])]
        token: Option<String>,

        /// Show where the active token comes from
        #[arg(long)]
        status: bool,

        /// Remove the stored token
        #[arg(long, conflicts_with = "status")]
        logout: bool,

        /// Open the token creation page before prompting
        #[arg(long)]
        open: bool,
    },

    /// Subscribe a repository to an event
    #[command(
        name = "subscribe",
        long_about = "Subscribe a repository to an event.\n\n\
            Every event for a repository is multiplexed onto one webhook that \
            delivers to the configured callback URL. Subscribing to an event that is \
            already delivered changes nothing.",
        after_help = "\
WORKFLOW EXAMPLES:
    # Deliver issue openings
    hookwise subscribe octocat/hello issueOpened

    # Subscribe to a remote event type with no symbolic kind
    hookwise subscribe octocat/hello --raw workflow_run

KINDS:
    issueOpened, issueClosed, pullRequestOpened, pullRequestClosed,
    push, releasePublished, commentCreated"
    )]
    Subscribe {
        /// Repository as owner/name
        repo: RepositoryKey,

        /// Event kind
        #[arg(required_unless_present = "raw")]
        kind: Option<EventKind>,

        /// Remote event type name instead of a kind
        #[arg(long, value_name = "EVENT_TYPE", conflicts_with = "kind")]
        raw: Option<EventType>,
    },

    /// Unsubscribe a repository from an event
    #[command(
        name = "unsubscribe",
        long_about = "Unsubscribe a repository from an event.\n\n\
            Removes the event's remote event type from the repository's webhook and \
            deletes the webhook once no event is left. Kinds that share an event type \
            (issueOpened and issueClosed) are removed together.",
        after_help = "\
WORKFLOW EXAMPLES:
    hookwise unsubscribe octocat/hello push
    hookwise unsubscribe octocat/hello --raw workflow_run"
    )]
    Unsubscribe {
        /// Repository as owner/name
        repo: RepositoryKey,

        /// Event kind
        #[arg(required_unless_present = "raw")]
        kind: Option<EventKind>,

        /// Remote event type name instead of a kind
        #[arg(long, value_name = "EVENT_TYPE", conflicts_with = "kind")]
        raw: Option<EventType>,
    },

    /// Show locally recorded subscriptions
    #[command(
        name = "status",
        long_about = "Show locally recorded subscriptions.\n\n\
            Lists the webhook record kept for every subscribed repository. Records \
            whose URL differs from the configured callback URL are flagged as \
            orphaned: they belong to a previous callback URL and are never changed \
            by hookwise. Remove the old webhook by hand, then drop the record with \
            `hookwise forget`."
    )]
    Status {
        /// Print records as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Forget orphaned records for a repository
    #[command(
        name = "forget",
        long_about = "Forget orphaned records for a repository.\n\n\
            Orphaned records point at a previous callback URL. Hookwise keeps them \
            so the old webhooks are not forgotten before they are cleaned up. This \
            command drops the records only; the remote webhooks are left as they are.",
        after_help = "\
WORKFLOW EXAMPLES:
    # See what is orphaned
    hookwise status

    # After deleting the old webhook on GitHub
    hookwise forget octocat/hello"
    )]
    Forget {
        /// Repository as owner/name
        repo: RepositoryKey,
    },

    /// Traverse a paginated collection
    #[command(
        name = "list",
        long_about = "Traverse a paginated collection and print every item as a JSON line.\n\n\
            Pages are followed until the collection is exhausted or --limit items \
            have been printed.",
        after_help = "\
WORKFLOW EXAMPLES:
    # Closed issues, oldest first
    hookwise list issues --repo octocat/hello --arg state=closed --arg direction=asc

    # First 50 users
    hookwise list users --limit 50

    # Search one repository's issues
    hookwise list search-issues --repo octocat/hello --query \"is:open label:bug\"

    # Pull requests only, from the issues endpoint
    hookwise list issues --repo octocat/hello --kind pr

    # Comments on issue 42
    hookwise list comments --repo octocat/hello --number 42

    # Commits mentioning a fix
    hookwise list search-commits --repo octocat/hello --query fix"
    )]
    List {
        /// Collection to traverse
        #[arg(value_enum)]
        collection: CollectionArg,

        /// Owner for user-repos and search-repos
        #[arg(long)]
        owner: Option<String>,

        /// Repository for repository collections and repository-scoped searches
        #[arg(long)]
        repo: Option<RepositoryKey>,

        /// Issue or pull request number for comments
        #[arg(long)]
        number: Option<u64>,

        /// Keep only issues or only pull requests (issue, pr)
        #[arg(long)]
        kind: Option<IssueKind>,

        /// Search query
        #[arg(long)]
        query: Option<String>,

        /// Extra request argument (repeatable)
        #[arg(long = "arg", value_name = "KEY=VALUE")]
        args: Vec<String>,

        /// Items per page
        #[arg(long)]
        per_page: Option<u32>,

        /// Stop after this many items
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Classify a webhook delivery
    #[command(
        name = "deliver",
        long_about = "Classify a webhook delivery payload.\n\n\
            Reads one JSON delivery from --file or stdin and prints every event it \
            raises as a JSON line. Exits with an error if the payload has no \
            repository.",
        after_help = "\
WORKFLOW EXAMPLES:
    hookwise deliver --file payload.json
    curl -s https://example.com/last-delivery | hookwise deliver"
    )]
    Deliver {
        /// Payload file (stdin when omitted)
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,
    },

    /// Watch a repository's activity feed
    #[command(
        name = "poll",
        long_about = "Watch a repository's activity feed and print new events as JSON lines.\n\n\
            The first poll only records where the feed stands. Later polls print \
            activity newer than the previous poll. The delay between polls is the \
            larger of polling.interval_secs and the interval the API asks for.",
        after_help = "\
WORKFLOW EXAMPLES:
    # Everything, forever
    hookwise poll octocat/hello

    # One cycle of issue closings and pushes
    hookwise poll octocat/hello --kind issueClosed --kind push --once"
    )]
    Poll {
        /// Repository as owner/name
        repo: RepositoryKey,

        /// Kinds to watch (all when omitted)
        #[arg(long = "kind")]
        kinds: Vec<EventKind>,

        /// Stop after one interval instead of running forever
        #[arg(long)]
        once: bool,
    },

    /// Inspect configuration
    #[command(
        name = "config",
        long_about = "Inspect configuration.\n\n\
            Configuration lives in ~/.hookwise/config.toml unless HOOKWISE_CONFIG or \
            --config names another file. HOOKWISE_CALLBACK_URL overrides callback_url.",
        after_help = "\
WORKFLOW EXAMPLES:
    hookwise config show
    hookwise config path"
    )]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completion scripts
    #[command(
        name = "completion",
        long_about = "Generate shell completion scripts for tab-completion.",
        after_help = "\
WORKFLOW EXAMPLES:
    # Bash (add to ~/.bashrc)
    hookwise completion bash >> ~/.bashrc

    # Zsh (add to ~/.zshrc)
    hookwise completion zsh >> ~/.zshrc

    # Fish
    hookwise completion fish > ~/.config/fish/completions/hookwise.fish"
    )]
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the config file path
    Path,
}

/// Collections reachable from the `list` command.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionArg {
    Users,
    UserRepos,
    Issues,
    Comments,
    Pulls,
    Commits,
    Branches,
    Releases,
    Hooks,
    SearchRepos,
    SearchIssues,
    SearchCommits,
}

/// The `list` flags that narrow a collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionScope {
    pub owner: Option<String>,
    pub repo: Option<RepositoryKey>,
    pub number: Option<u64>,
    pub kind: Option<IssueKind>,
}

impl CollectionArg {
    /// Bind the collection to the scope flags it needs.
    ///
    /// Flags that do not apply to the collection are rejected rather than
    /// silently ignored.
    pub fn resolve(self, scope: CollectionScope) -> Result<Collection, String> {
        let CollectionScope {
            owner,
            repo,
            number,
            kind,
        } = scope;

        if kind.is_some() && self != CollectionArg::Issues {
            return Err(format!("--kind does not apply to {}", self.name()));
        }
        if number.is_some() && self != CollectionArg::Comments {
            return Err(format!("--number does not apply to {}", self.name()));
        }

        let need_repo = |repo: Option<RepositoryKey>| {
            repo.ok_or_else(|| format!("--repo is required for {}", self.name()))
        };

        Ok(match self {
            CollectionArg::Users => Collection::Users,
            CollectionArg::UserRepos => Collection::UserRepos {
                owner: owner.ok_or_else(|| "--owner is required for user-repos".to_string())?,
            },
            CollectionArg::Issues => Collection::RepoIssues {
                repo: need_repo(repo)?,
                kind,
            },
            CollectionArg::Comments => Collection::IssueComments {
                repo: need_repo(repo)?,
                number: number.ok_or_else(|| "--number is required for comments".to_string())?,
            },
            CollectionArg::Pulls => Collection::RepoPulls(need_repo(repo)?),
            CollectionArg::Commits => Collection::RepoCommits(need_repo(repo)?),
            CollectionArg::Branches => Collection::RepoBranches(need_repo(repo)?),
            CollectionArg::Releases => Collection::RepoReleases(need_repo(repo)?),
            CollectionArg::Hooks => Collection::RepoHooks(need_repo(repo)?),
            CollectionArg::SearchRepos => Collection::SearchRepos { owner },
            CollectionArg::SearchIssues => Collection::SearchIssues { repo },
            CollectionArg::SearchCommits => Collection::SearchCommits { repo },
        })
    }

    fn name(self) -> &'static str {
        match self {
            CollectionArg::Users => "users",
            CollectionArg::UserRepos => "user-repos",
            CollectionArg::Issues => "issues",
            CollectionArg::Comments => "comments",
            CollectionArg::Pulls => "pulls",
            CollectionArg::Commits => "commits",
            CollectionArg::Branches => "branches",
            CollectionArg::Releases => "releases",
            CollectionArg::Hooks => "hooks",
            CollectionArg::SearchRepos => "search-repos",
            CollectionArg::SearchIssues => "search-issues",
            CollectionArg::SearchCommits => "search-commits",
        }
    }
}

/// Supported shells for completion
#[derive(clap::ValueEnum, Debug, Clone, Copy)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}
