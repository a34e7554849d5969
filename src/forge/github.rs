//! forge::github
//!
//! GitHub implementation of the hook gateway, activity feed, and
//! collection traversal over the REST API.
//!
//! # Design
//!
//! One `GitHubForge` serves every repository; the repository is passed per
//! call. Responses are decoded into private wire types and converted into
//! the crate's domain types before they leave this module.
//!
//! Every listing reads the `Link` response header through
//! [`crate::pagination`], so webhook discovery, collection traversal, and
//! the CLI `list` command share one pagination path.
//!
//! # Authentication
//!
//! Webhook management needs an admin-scoped token and fails fast with
//! [`ForgeError::AuthRequired`] when none is configured. Collection reads
//! and the activity feed are sent unauthenticated in that case.
//!
//! # Rate Limiting
//!
//! GitHub has rate limits. This implementation:
//! - Returns `ForgeError::RateLimited` on 429, or 403 with an exhausted quota
//! - Does not implement automatic retry for rate limits (caller's responsibility)
//!
//! # Example
//!
//! ```ignore
//! use hookwise::forge::github::GitHubForge;
//! use hookwise::forge::Collection;
//! use hookwise::pagination::PageArgs;
//!
//! let forge = GitHubForge::new(Some(token));
//! let issues = forge
//!     .collect(&Collection::RepoIssues { repo, kind: None }, &PageArgs::new().with("state", "open"), Some(200))
//!     .await?;
//! ```

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::collection::Collection;
use super::traits::{
    ActivityEvent, ActivityFeed, ActivityPage, ForgeError, HookGateway, HookSpec, RemoteHook,
};
use crate::core::config::DEFAULT_API_BASE;
use crate::core::types::{EventType, HookId, RepositoryKey};
use crate::pagination::{next_page_args, parse_link_header, LinkSet, Page, PageArgs};

/// User-Agent header value for API requests.
const USER_AGENT_VALUE: &str = "hookwise";

/// Page size used when listing webhooks.
const HOOKS_PER_PAGE: i64 = 100;

/// Header carrying the minimum seconds between activity feed polls.
const POLL_INTERVAL_HEADER: &str = "x-poll-interval";

/// GitHub forge implementation.
pub struct GitHubForge {
    /// HTTP client for making requests
    client: Client,
    /// Personal access or app token
    token: Option<String>,
    /// API base URL (configurable for GitHub Enterprise)
    api_base: String,
}

// Custom Debug to avoid exposing the token
impl std::fmt::Debug for GitHubForge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubForge")
            .field("has_token", &self.token.is_some())
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl GitHubForge {
    /// Create a forge against `api.github.com`.
    pub fn new(token: Option<String>) -> Self {
        Self::with_api_base(token, DEFAULT_API_BASE)
    }

    /// Create a forge with a custom API base URL.
    ///
    /// Use this for GitHub Enterprise installations
    /// (e.g., `https://github.example.com/api/v3`) and for tests.
    pub fn with_api_base(token: Option<String>, api_base: impl Into<String>) -> Self {
        let api_base = api_base.into().trim_end_matches('/').to_string();
        Self {
            client: Client::new(),
            token,
            api_base,
        }
    }

    /// Get the API base URL.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Whether a token is configured.
    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn require_token(&self) -> Result<(), ForgeError> {
        if self.token.is_some() {
            Ok(())
        } else {
            Err(ForgeError::AuthRequired)
        }
    }

    /// Build common headers for API requests.
    fn headers(&self) -> Result<HeaderMap, ForgeError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ForgeError::AuthFailed("token contains invalid characters".into()))?;
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        Ok(headers)
    }

    /// Build URL for a repository endpoint.
    fn repo_url(&self, repo: &RepositoryKey, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_base,
            repo.owner(),
            repo.name(),
            path
        )
    }

    /// GET `url` with `args` as the query string, returning the decoded body
    /// and the response's link relations.
    async fn get_with_links<T: DeserializeOwned>(
        &self,
        url: &str,
        args: &PageArgs,
    ) -> Result<(T, LinkSet), ForgeError> {
        debug!(url, ?args, "GET");
        let response = self
            .client
            .get(url)
            .headers(self.headers()?)
            .query(&args.to_query())
            .send()
            .await
            .map_err(|e| ForgeError::NetworkError(e.to_string()))?;

        let links = link_set(response.headers());
        let body = self.handle_response(response).await?;
        Ok((body, links))
    }

    /// Handle API response, mapping errors appropriately.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: Response,
    ) -> Result<T, ForgeError> {
        let status = response.status();

        if status.is_success() {
            response.json().await.map_err(|e| ForgeError::ApiError {
                status: status.as_u16(),
                message: format!("Failed to parse response: {}", e),
            })
        } else {
            self.handle_error_response(response, status).await
        }
    }

    /// Handle a response whose success body is irrelevant.
    async fn handle_empty_response(&self, response: Response) -> Result<(), ForgeError> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            self.handle_error_response(response, status).await
        }
    }

    /// Handle an error response from the API.
    async fn handle_error_response<T>(
        &self,
        response: Response,
        status: StatusCode,
    ) -> Result<T, ForgeError> {
        let quota_exhausted = response
            .headers()
            .get("X-RateLimit-Remaining")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim() == "0")
            .unwrap_or(false);
        let required_permissions = response
            .headers()
            .get("X-Accepted-GitHub-Permissions")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        // Try to get error message from body
        let message = match response.json::<GitHubErrorResponse>().await {
            Ok(err) => err.message,
            Err(_) => "Unknown error".to_string(),
        };

        Err(match status {
            StatusCode::UNAUTHORIZED => ForgeError::AuthFailed("Invalid or expired token".into()),
            StatusCode::FORBIDDEN if quota_exhausted => ForgeError::RateLimited,
            StatusCode::FORBIDDEN => {
                let mut err_msg = format!("Permission denied: {}", message);
                if let Some(perms) = required_permissions.filter(|p| !p.is_empty()) {
                    err_msg.push_str(&format!(" [required: {}]", perms));
                }
                ForgeError::AuthFailed(err_msg)
            }
            StatusCode::NOT_FOUND => ForgeError::NotFound(message),
            StatusCode::TOO_MANY_REQUESTS => ForgeError::RateLimited,
            _ if status.is_server_error() => ForgeError::ApiError {
                status: status.as_u16(),
                message: format!("GitHub server error: {}", message),
            },
            _ => ForgeError::ApiError {
                status: status.as_u16(),
                message,
            },
        })
    }

    /// Fetch one page of a collection.
    ///
    /// `args` are the caller's arguments for this page; search collections
    /// get their scoping qualifier added before sending. The returned
    /// `next` is derived from the arguments actually sent.
    pub async fn fetch_page(
        &self,
        collection: &Collection,
        args: &PageArgs,
    ) -> Result<Page<serde_json::Value>, ForgeError> {
        let url = format!("{}{}", self.api_base, collection.path());
        let sent = collection.prepare_args(args);

        let (mut items, links) = if collection.is_search() {
            let (results, links): (SearchResults, LinkSet) =
                self.get_with_links(&url, &sent).await?;
            (results.items, links)
        } else {
            self.get_with_links::<Vec<serde_json::Value>>(&url, &sent)
                .await?
        };
        items.retain(|item| collection.keeps(item));

        let next = collection.style().next_args(&sent, &links);
        debug!(
            collection = %collection,
            items = items.len(),
            has_next = next.is_some(),
            "fetched page"
        );
        Ok(Page { items, next })
    }

    /// Follow a collection's pages until exhausted or `limit` items.
    pub async fn collect(
        &self,
        collection: &Collection,
        args: &PageArgs,
        limit: Option<usize>,
    ) -> Result<Vec<serde_json::Value>, ForgeError> {
        let mut items = Vec::new();
        let mut current = args.clone();

        loop {
            let page = self.fetch_page(collection, &current).await?;
            items.extend(page.items);

            if let Some(limit) = limit {
                if items.len() >= limit {
                    items.truncate(limit);
                    break;
                }
            }

            match page.next {
                Some(next) if next != collection.prepare_args(&current) => current = next,
                Some(_) => {
                    warn!(collection = %collection, "next page repeats the current request, stopping");
                    break;
                }
                None => break,
            }
        }

        Ok(items)
    }
}

#[async_trait]
impl HookGateway for GitHubForge {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn list_hooks(&self, repo: &RepositoryKey) -> Result<Vec<RemoteHook>, ForgeError> {
        self.require_token()?;
        let url = self.repo_url(repo, "hooks");

        let mut hooks = Vec::new();
        let mut args = PageArgs::new().with("per_page", HOOKS_PER_PAGE);
        loop {
            let (page, links): (Vec<GitHubHook>, LinkSet) =
                self.get_with_links(&url, &args).await?;
            hooks.extend(page.into_iter().map(RemoteHook::from));

            match next_page_args(&args, &links) {
                Some(next) if next != args => args = next,
                _ => break,
            }
        }

        Ok(hooks)
    }

    async fn create_hook(
        &self,
        repo: &RepositoryKey,
        spec: &HookSpec,
    ) -> Result<HookId, ForgeError> {
        self.require_token()?;
        let url = self.repo_url(repo, "hooks");
        let body = HookBody::new(Some("web"), spec);

        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| ForgeError::NetworkError(e.to_string()))?;

        let hook: GitHubHook = self.handle_response(response).await?;
        Ok(HookId(hook.id))
    }

    async fn update_hook(
        &self,
        repo: &RepositoryKey,
        id: HookId,
        spec: &HookSpec,
    ) -> Result<(), ForgeError> {
        self.require_token()?;
        let url = self.repo_url(repo, &format!("hooks/{}", id));
        let body = HookBody::new(None, spec);

        let response = self
            .client
            .patch(&url)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| ForgeError::NetworkError(e.to_string()))?;

        self.handle_empty_response(response).await
    }

    async fn delete_hook(&self, repo: &RepositoryKey, id: HookId) -> Result<(), ForgeError> {
        self.require_token()?;
        let url = self.repo_url(repo, &format!("hooks/{}", id));

        let response = self
            .client
            .delete(&url)
            .headers(self.headers()?)
            .send()
            .await
            .map_err(|e| ForgeError::NetworkError(e.to_string()))?;

        self.handle_empty_response(response).await
    }
}

#[async_trait]
impl ActivityFeed for GitHubForge {
    async fn repo_events(&self, repo: &RepositoryKey) -> Result<ActivityPage, ForgeError> {
        let url = self.repo_url(repo, "events");

        let response = self
            .client
            .get(&url)
            .headers(self.headers()?)
            .query(&[("per_page", "100")])
            .send()
            .await
            .map_err(|e| ForgeError::NetworkError(e.to_string()))?;

        let poll_interval = response
            .headers()
            .get(POLL_INTERVAL_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        let events: Vec<GitHubActivity> = self.handle_response(response).await?;
        Ok(ActivityPage {
            events: events.into_iter().map(ActivityEvent::from).collect(),
            poll_interval,
        })
    }
}

/// Parse every `Link` header on a response into one [`LinkSet`].
fn link_set(headers: &HeaderMap) -> LinkSet {
    let values: Vec<&str> = headers
        .get_all(LINK)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    parse_link_header(&values.join(", "))
}

// --------------------------------------------------------------------------
// API Request/Response Types
// --------------------------------------------------------------------------

/// Request body for creating or updating a webhook.
#[derive(Serialize)]
struct HookBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    active: bool,
    events: Vec<&'a str>,
    config: HookConfigBody<'a>,
}

#[derive(Serialize)]
struct HookConfigBody<'a> {
    url: &'a str,
    content_type: &'a str,
}

impl<'a> HookBody<'a> {
    fn new(name: Option<&'a str>, spec: &'a HookSpec) -> Self {
        Self {
            name,
            active: true,
            events: spec.events.iter().map(EventType::as_str).collect(),
            config: HookConfigBody {
                url: &spec.url,
                content_type: &spec.content_type,
            },
        }
    }
}

/// GitHub error response format.
#[derive(Deserialize)]
struct GitHubErrorResponse {
    message: String,
}

/// GitHub webhook response format.
#[derive(Deserialize)]
struct GitHubHook {
    id: u64,
    #[serde(default)]
    events: Vec<String>,
    #[serde(default)]
    config: GitHubHookConfig,
}

#[derive(Deserialize, Default)]
struct GitHubHookConfig {
    url: Option<String>,
}

impl From<GitHubHook> for RemoteHook {
    fn from(hook: GitHubHook) -> Self {
        let id = hook.id;
        let mut events = BTreeSet::new();
        let mut unrecognized = Vec::new();
        for name in hook.events {
            match EventType::new(name.as_str()) {
                Ok(event) => {
                    events.insert(event);
                }
                Err(e) => {
                    warn!(hook = id, error = %e, "hook carries an unparseable event name");
                    unrecognized.push(name);
                }
            }
        }

        RemoteHook {
            id: HookId(id),
            url: hook.config.url,
            events,
            unrecognized,
        }
    }
}

/// Search endpoints wrap their results.
#[derive(Deserialize)]
struct SearchResults {
    items: Vec<serde_json::Value>,
}

/// Repository activity feed entry.
#[derive(Deserialize)]
struct GitHubActivity {
    id: String,
    #[serde(rename = "type")]
    event_type: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    payload: serde_json::Value,
}

impl From<GitHubActivity> for ActivityEvent {
    fn from(activity: GitHubActivity) -> Self {
        ActivityEvent {
            id: activity.id,
            event_type: activity.event_type.unwrap_or_default(),
            created_at: activity.created_at,
            payload: activity.payload,
        }
    }
}
