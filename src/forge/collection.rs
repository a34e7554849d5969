//! forge::collection
//!
//! Paginated list endpoints that can be traversed with
//! [`GitHubForge::collect`](super::github::GitHubForge::collect).
//!
//! The issues endpoint returns pull requests too. [`IssueKind`] narrows a
//! traversal to one of them by filtering each page client-side, so a page
//! may come back shorter than `per_page` (or empty) while more pages follow.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::core::types::{RepositoryKey, TypeError};
use crate::pagination::cursor::QUERY;
use crate::pagination::{ArgValue, PageArgs, PaginationStyle};

/// Which entries of the issues endpoint to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueKind {
    /// Plain issues only.
    Issue,
    /// Pull requests only.
    PullRequest,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::Issue => "issue",
            IssueKind::PullRequest => "pr",
        }
    }

    /// Whether an item from the issues endpoint is of this kind.
    ///
    /// Pull requests carry a `pull_request` object; plain issues do not.
    pub fn matches(&self, item: &Value) -> bool {
        let is_pull = item.get("pull_request").is_some_and(|pr| !pr.is_null());
        match self {
            IssueKind::Issue => !is_pull,
            IssueKind::PullRequest => is_pull,
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "issue" => Ok(IssueKind::Issue),
            "pr" | "pull-request" => Ok(IssueKind::PullRequest),
            other => Err(TypeError::UnknownIssueKind(other.to_string())),
        }
    }
}

/// A server-paginated collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collection {
    /// All users, cursor-paginated by `since`.
    Users,
    /// Public repositories of one user or organization.
    UserRepos { owner: String },
    /// Issues and pull requests, optionally narrowed to one kind.
    RepoIssues {
        repo: RepositoryKey,
        kind: Option<IssueKind>,
    },
    /// Conversation comments on one issue or pull request.
    IssueComments { repo: RepositoryKey, number: u64 },
    RepoPulls(RepositoryKey),
    RepoCommits(RepositoryKey),
    RepoBranches(RepositoryKey),
    RepoReleases(RepositoryKey),
    RepoHooks(RepositoryKey),
    /// Repository search, optionally narrowed to one owner.
    SearchRepos { owner: Option<String> },
    /// Issue and pull request search, optionally narrowed to one repository.
    SearchIssues { repo: Option<RepositoryKey> },
    /// Commit search, optionally narrowed to one repository.
    SearchCommits { repo: Option<RepositoryKey> },
}

impl Collection {
    /// Endpoint path relative to the API base.
    pub fn path(&self) -> String {
        match self {
            Collection::Users => "/users".to_string(),
            Collection::UserRepos { owner } => format!("/users/{owner}/repos"),
            Collection::RepoIssues { repo, .. } => format!("/repos/{repo}/issues"),
            Collection::IssueComments { repo, number } => {
                format!("/repos/{repo}/issues/{number}/comments")
            }
            Collection::RepoPulls(repo) => format!("/repos/{repo}/pulls"),
            Collection::RepoCommits(repo) => format!("/repos/{repo}/commits"),
            Collection::RepoBranches(repo) => format!("/repos/{repo}/branches"),
            Collection::RepoReleases(repo) => format!("/repos/{repo}/releases"),
            Collection::RepoHooks(repo) => format!("/repos/{repo}/hooks"),
            Collection::SearchRepos { .. } => "/search/repositories".to_string(),
            Collection::SearchIssues { .. } => "/search/issues".to_string(),
            Collection::SearchCommits { .. } => "/search/commits".to_string(),
        }
    }

    /// Whether a fetched item belongs in this collection.
    pub fn keeps(&self, item: &Value) -> bool {
        match self {
            Collection::RepoIssues {
                kind: Some(kind), ..
            } => kind.matches(item),
            _ => true,
        }
    }

    pub fn style(&self) -> PaginationStyle {
        if self.is_search() {
            PaginationStyle::Search
        } else {
            PaginationStyle::Standard
        }
    }

    /// Search endpoints wrap results in `{"items": [...]}`.
    pub fn is_search(&self) -> bool {
        matches!(
            self,
            Collection::SearchRepos { .. }
                | Collection::SearchIssues { .. }
                | Collection::SearchCommits { .. }
        )
    }

    /// The search qualifier that scopes this collection, if any.
    fn qualifier(&self) -> Option<String> {
        match self {
            Collection::SearchRepos { owner: Some(owner) } => Some(format!("user:{owner}")),
            Collection::SearchIssues { repo: Some(repo) }
            | Collection::SearchCommits { repo: Some(repo) } => Some(format!("repo:{repo}")),
            _ => None,
        }
    }

    /// Arguments to send for this collection.
    ///
    /// Search collections get their scoping qualifier appended to `q`. The
    /// qualifier is only added when `q` does not already carry it, since
    /// follow-up pages take `q` from the server's next link.
    pub fn prepare_args(&self, args: &PageArgs) -> PageArgs {
        let mut prepared = args.clone();
        let Some(qualifier) = self.qualifier() else {
            return prepared;
        };

        let query = match args.get(QUERY) {
            Some(existing) => {
                let existing = existing.to_string();
                if existing.split_whitespace().any(|term| term == qualifier) {
                    existing
                } else if existing.trim().is_empty() {
                    qualifier
                } else {
                    format!("{existing} {qualifier}")
                }
            }
            None => qualifier,
        };
        prepared.set(QUERY, ArgValue::Text(query));
        prepared
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}
