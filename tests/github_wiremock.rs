//! Integration tests for the GitHub gateway against a local HTTP mock.
//!
//! Live GitHub API tests are behind the `live_github_tests` feature flag.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hookwise::core::types::{EventType, HookId, RepositoryKey};
use hookwise::forge::github::GitHubForge;
use hookwise::forge::{ActivityFeed, Collection, ForgeError, HookGateway, HookSpec, IssueKind};
use hookwise::pagination::{ArgValue, PageArgs};
use hookwise::subscriptions::{
    MemorySubscriptionStore, RegisterOutcome, SubscriptionError, SubscriptionManager,
};

const TOKEN: &str = "ghp_test_token_value";
const CALLBACK: &str = "https://hooks.example.com/github";

fn repo() -> RepositoryKey {
    RepositoryKey::new("octocat", "hello").unwrap()
}

fn forge(server: &MockServer) -> GitHubForge {
    GitHubForge::with_api_base(Some(TOKEN.to_string()), server.uri())
}

fn link(server: &MockServer, path_and_query: &str, rel: &str) -> String {
    format!("<{}{}>; rel=\"{}\"", server.uri(), path_and_query, rel)
}

// =============================================================================
// Hook gateway
// =============================================================================

mod hooks {
    use super::*;

    #[tokio::test]
    async fn list_follows_pagination() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repos/octocat/hello/hooks"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 2, "events": ["push"], "config": {"url": "https://b.example.com"}}
            ])))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/repos/octocat/hello/hooks"))
            .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([
                        {"id": 1, "events": ["issues"], "config": {"url": "https://a.example.com"}}
                    ]))
                    .insert_header(
                        "link",
                        link(&server, "/repos/octocat/hello/hooks?per_page=100&page=2", "next")
                            .as_str(),
                    ),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;

        let hooks = forge(&server).list_hooks(&repo()).await.unwrap();

        let ids: Vec<HookId> = hooks.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![HookId(1), HookId(2)]);
        assert!(hooks[1].targets("https://b.example.com"));
    }

    #[tokio::test]
    async fn create_sends_web_hook_with_json_config() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/octocat/hello/hooks"))
            .and(body_partial_json(json!({
                "name": "web",
                "active": true,
                "events": ["issues"],
                "config": {"url": CALLBACK, "content_type": "json"}
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": 42, "events": ["issues"], "config": {"url": CALLBACK}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let spec = HookSpec::json(CALLBACK, BTreeSet::from([EventType::Issues]));
        let id = forge(&server).create_hook(&repo(), &spec).await.unwrap();

        assert_eq!(id, HookId(42));
    }

    #[tokio::test]
    async fn update_patches_full_event_set() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/repos/octocat/hello/hooks/42"))
            .and(body_partial_json(json!({"events": ["issues", "push"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 42})))
            .expect(1)
            .mount(&server)
            .await;

        let spec = HookSpec::json(CALLBACK, BTreeSet::from([EventType::Issues, EventType::Push]));
        forge(&server)
            .update_hook(&repo(), HookId(42), &spec)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_accepts_no_content() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/repos/octocat/hello/hooks/42"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        forge(&server).delete_hook(&repo(), HookId(42)).await.unwrap();
    }

    #[tokio::test]
    async fn error_statuses_map_to_forge_errors() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/repos/octocat/hello/hooks/1"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/repos/octocat/hello/hooks/2"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("x-ratelimit-remaining", "0")
                    .set_body_json(json!({"message": "API rate limit exceeded"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/repos/octocat/hello/hooks/3"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Bad credentials"})))
            .mount(&server)
            .await;

        let forge = forge(&server);
        assert_eq!(
            forge.delete_hook(&repo(), HookId(1)).await.unwrap_err(),
            ForgeError::NotFound("Not Found".into())
        );
        assert_eq!(
            forge.delete_hook(&repo(), HookId(2)).await.unwrap_err(),
            ForgeError::RateLimited
        );
        assert!(matches!(
            forge.delete_hook(&repo(), HookId(3)).await.unwrap_err(),
            ForgeError::AuthFailed(_)
        ));
    }

    #[tokio::test]
    async fn manager_registers_through_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octocat/hello/hooks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 7, "events": ["push"], "config": {"url": CALLBACK}},
                {"id": 3, "events": ["issues"], "config": {"url": "https://ci.example.com"}}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/repos/octocat/hello/hooks/7"))
            .and(body_partial_json(json!({"events": ["issues", "push"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 7})))
            .expect(1)
            .mount(&server)
            .await;

        let manager = SubscriptionManager::new(
            Arc::new(forge(&server)),
            Arc::new(MemorySubscriptionStore::new()),
            Some(CALLBACK.to_string()),
        );
        let outcome = manager.register(&repo(), &EventType::Issues).await.unwrap();

        assert_eq!(outcome, RegisterOutcome::Updated(HookId(7)));
    }

    #[tokio::test]
    async fn hook_with_unparseable_events_is_not_rewritten() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octocat/hello/hooks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 7, "events": ["push", "bad name"], "config": {"url": CALLBACK}}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 7})))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let manager = SubscriptionManager::new(
            Arc::new(forge(&server)),
            Arc::new(MemorySubscriptionStore::new()),
            Some(CALLBACK.to_string()),
        );

        let err = manager.register(&repo(), &EventType::Issues).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::UnrecognizedEvents { .. }));
        let err = manager.unregister(&repo(), &EventType::Push).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::UnrecognizedEvents { .. }));
    }
}

// =============================================================================
// Collection traversal
// =============================================================================

mod collections {
    use super::*;

    #[tokio::test]
    async fn users_follow_since_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users"))
            .and(query_param("since", "46"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 47}])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"id": 1}, {"id": 46}]))
                    .insert_header("link", link(&server, "/users?since=46", "next").as_str()),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;

        let items = forge(&server)
            .collect(&Collection::Users, &PageArgs::new(), None)
            .await
            .unwrap();

        let ids: Vec<i64> = items.iter().filter_map(|u| u["id"].as_i64()).collect();
        assert_eq!(ids, vec![1, 46, 47]);
    }

    #[tokio::test]
    async fn page_cursor_preserves_filters() {
        let server = MockServer::start().await;
        let forge = forge(&server);
        Mock::given(method("GET"))
            .and(path("/repos/octocat/hello/issues"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"number": 1}]))
                    .insert_header(
                        "link",
                        format!(
                            "{}, {}",
                            link(&server, "/repositories/1/issues?page=2", "next"),
                            link(&server, "/repositories/1/issues?page=5", "last")
                        )
                        .as_str(),
                    ),
            )
            .mount(&server)
            .await;

        let args = PageArgs::new().with("state", "closed").with("page", 1i64);
        let page = forge
            .fetch_page(
                &Collection::RepoIssues {
                    repo: repo(),
                    kind: None,
                },
                &args,
            )
            .await
            .unwrap();

        let next = page.next.unwrap();
        assert_eq!(next.get("page"), Some(&ArgValue::Int(2)));
        assert_eq!(next.get("state"), Some(&ArgValue::Text("closed".into())));
    }

    #[tokio::test]
    async fn search_issues_scopes_query_to_repository() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/issues"))
            .and(query_param("q", "is:open repo:octocat/hello"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total_count": 1,
                "items": [{"number": 9}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let args = PageArgs::new().with("q", "is:open");
        let items = forge(&server)
            .collect(&Collection::SearchIssues { repo: Some(repo()) }, &args, None)
            .await
            .unwrap();

        assert_eq!(items, vec![json!({"number": 9})]);
    }

    #[tokio::test]
    async fn issue_kind_filters_every_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octocat/hello/issues"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"number": 3, "pull_request": {"url": "https://api.github.com/pulls/3"}},
                {"number": 4}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/octocat/hello/issues"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([
                        {"number": 1},
                        {"number": 2, "pull_request": {"url": "https://api.github.com/pulls/2"}}
                    ]))
                    .insert_header(
                        "link",
                        link(&server, "/repositories/1/issues?state=all&page=2", "next").as_str(),
                    ),
            )
            .up_to_n_times(2)
            .mount(&server)
            .await;

        let numbers = |items: Vec<serde_json::Value>| -> Vec<i64> {
            items.iter().filter_map(|i| i["number"].as_i64()).collect()
        };
        let forge = forge(&server);
        let args = PageArgs::new().with("state", "all");

        let pulls = forge
            .collect(
                &Collection::RepoIssues {
                    repo: repo(),
                    kind: Some(IssueKind::PullRequest),
                },
                &args,
                None,
            )
            .await
            .unwrap();
        assert_eq!(numbers(pulls), vec![2, 3]);

        let issues = forge
            .collect(
                &Collection::RepoIssues {
                    repo: repo(),
                    kind: Some(IssueKind::Issue),
                },
                &args,
                None,
            )
            .await
            .unwrap();
        assert_eq!(numbers(issues), vec![1, 4]);
    }

    #[tokio::test]
    async fn issue_comments_follow_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octocat/hello/issues/42/comments"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 12}])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/octocat/hello/issues/42/comments"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"id": 11}]))
                    .insert_header(
                        "link",
                        link(&server, "/repositories/1/issues/42/comments?page=2", "next").as_str(),
                    ),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;

        let items = forge(&server)
            .collect(
                &Collection::IssueComments {
                    repo: repo(),
                    number: 42,
                },
                &PageArgs::new(),
                None,
            )
            .await
            .unwrap();

        let ids: Vec<i64> = items.iter().filter_map(|c| c["id"].as_i64()).collect();
        assert_eq!(ids, vec![11, 12]);
    }

    #[tokio::test]
    async fn branches_are_listed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octocat/hello/branches"))
            .and(query_param("per_page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "main"},
                {"name": "dev"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let items = forge(&server)
            .collect(
                &Collection::RepoBranches(repo()),
                &PageArgs::new().with("per_page", 2i64),
                None,
            )
            .await
            .unwrap();

        let names: Vec<&str> = items.iter().filter_map(|b| b["name"].as_str()).collect();
        assert_eq!(names, vec!["main", "dev"]);
    }

    #[tokio::test]
    async fn commit_search_follows_search_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/commits"))
            .and(query_param("page", "2"))
            .and(query_param("q", "fix repo:octocat/hello"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total_count": 2,
                "items": [{"sha": "bbb"}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search/commits"))
            .and(query_param("q", "fix repo:octocat/hello"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({
                        "total_count": 2,
                        "items": [{"sha": "aaa"}]
                    }))
                    .insert_header(
                        "link",
                        link(
                            &server,
                            "/search/commits?q=fix+repo%3Aoctocat%2Fhello&page=2",
                            "next",
                        )
                        .as_str(),
                    ),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;

        let items = forge(&server)
            .collect(
                &Collection::SearchCommits { repo: Some(repo()) },
                &PageArgs::new().with("q", "fix"),
                None,
            )
            .await
            .unwrap();

        let shas: Vec<&str> = items.iter().filter_map(|c| c["sha"].as_str()).collect();
        assert_eq!(shas, vec!["aaa", "bbb"]);
    }

    #[tokio::test]
    async fn limit_stops_early() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"id": 1}, {"id": 2}, {"id": 3}]))
                    .insert_header("link", link(&server, "/users?since=3", "next").as_str()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let items = forge(&server)
            .collect(&Collection::Users, &PageArgs::new(), Some(2))
            .await
            .unwrap();

        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn malformed_link_header_ends_traversal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"id": 1}]))
                    .insert_header("link", "<not a url; rel=\"next\""),
            )
            .expect(1)
            .mount(&server)
            .await;

        let items = forge(&server)
            .collect(&Collection::Users, &PageArgs::new(), None)
            .await
            .unwrap();

        assert_eq!(items.len(), 1);
    }
}

// =============================================================================
// Activity feed
// =============================================================================

#[tokio::test]
async fn activity_feed_reads_poll_interval() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/octocat/hello/events"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-poll-interval", "90")
                .set_body_json(json!([{
                    "id": "1001",
                    "type": "IssuesEvent",
                    "created_at": "2024-05-01T12:00:00Z",
                    "payload": {"action": "opened", "issue": {"number": 3}}
                }])),
        )
        .mount(&server)
        .await;

    let page = forge(&server).repo_events(&repo()).await.unwrap();

    assert_eq!(page.poll_interval, Some(Duration::from_secs(90)));
    assert_eq!(page.events.len(), 1);
    assert_eq!(page.events[0].event_type, "IssuesEvent");
    assert_eq!(page.events[0].payload["issue"]["number"], 3);
}

#[cfg(feature = "live_github_tests")]
mod live {
    use super::*;

    #[tokio::test]
    async fn lists_public_users() {
        let forge = GitHubForge::new(std::env::var("GITHUB_TOKEN").ok());
        let items = forge
            .collect(&Collection::Users, &PageArgs::new(), Some(5))
            .await
            .unwrap();
        assert_eq!(items.len(), 5);
    }
}
