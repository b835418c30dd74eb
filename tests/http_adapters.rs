use mergecast::adapters::collector::{Collector, GitHubCollector};
use mergecast::adapters::notifier::{Notifier, WebhookNotifier};
use mergecast::config::GithubConfig;
use mergecast::error::{CollectorError, DeliveryError};
use mergecast::events::Event;
use reqwest::blocking::Client;
use serde_json::{Value, json};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// The adapters use the blocking client, which must not run on a runtime
/// worker thread.
async fn off_runtime<T, F>(f: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f).await.unwrap()
}

fn github(server: &MockServer, per_page: u32, max_pages: u32) -> GithubConfig {
    GithubConfig {
        repo: "o/r".to_string(),
        base_branch: "main".to_string(),
        api_url: server.uri(),
        per_page,
        max_pages,
        token: Some("gh-token".to_string()),
    }
}

fn pull(number: u64, merged_at: Option<&str>, updated_at: &str) -> Value {
    json!({
        "number": number,
        "title": format!("change {number}"),
        "html_url": format!("https://github.com/o/r/pull/{number}"),
        "body": null,
        "merged_at": merged_at,
        "updated_at": updated_at,
        "base": {"ref": "main"},
        "user": {"login": "octo"}
    })
}

fn ids(events: &[Event]) -> Vec<u64> {
    events.iter().map(Event::id).collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn merged_prs_use_expected_query_and_stop_at_cursor() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r/pulls"))
        .and(query_param("state", "closed"))
        .and(query_param("base", "main"))
        .and(query_param("sort", "updated"))
        .and(query_param("direction", "desc"))
        .and(query_param("per_page", "2"))
        .and(query_param("page", "1"))
        .and(header("authorization", "Bearer gh-token"))
        .and(header("x-github-api-version", "2022-11-28"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            pull(12, Some("2026-02-17T11:00:00Z"), "2026-02-17T11:00:00Z"),
            pull(11, None, "2026-02-17T08:00:00Z"),
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r/pulls"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let cfg = github(&server, 2, 3);
    let since: chrono::DateTime<chrono::Utc> = "2026-02-17T10:00:00Z".parse().unwrap();
    let events = off_runtime(move || {
        GitHubCollector::new(Client::new(), &cfg).fetch_merged_prs("o/r", Some(since))
    })
    .await
    .unwrap();

    assert_eq!(ids(&events), vec![12]);
}

#[tokio::test(flavor = "multi_thread")]
async fn full_pages_are_walked_up_to_max_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r/pulls"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([pull(
            5,
            Some("2026-02-17T11:00:00Z"),
            "2026-02-17T11:00:00Z"
        )])))
        .expect(2)
        .mount(&server)
        .await;

    let cfg = github(&server, 1, 2);
    let events = off_runtime(move || {
        GitHubCollector::new(Client::new(), &cfg).fetch_merged_prs("o/r", None)
    })
    .await
    .unwrap();

    assert_eq!(events.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn short_release_page_ends_the_walk() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r/releases"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": 70, "tag_name": "v1.0.0", "name": "One",
            "html_url": "https://github.com/o/r/releases/tag/v1.0.0",
            "body": "notes", "draft": false, "prerelease": false,
            "published_at": "2026-02-17T09:00:00Z", "created_at": "2026-02-17T08:00:00Z"
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = github(&server, 2, 3);
    let events = off_runtime(move || GitHubCollector::new(Client::new(), &cfg).fetch_releases("o/r"))
        .await
        .unwrap();

    assert_eq!(ids(&events), vec![70]);
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_tag_is_not_found_and_server_errors_keep_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r/releases/tags/v9.9.9"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r/pulls"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let cfg = github(&server, 100, 3);
    let (by_tag, pulls) = off_runtime(move || {
        let collector = GitHubCollector::new(Client::new(), &cfg);
        (
            collector.fetch_release_by_tag("o/r", "v9.9.9"),
            collector.fetch_merged_prs("o/r", None),
        )
    })
    .await;

    match by_tag {
        Err(CollectorError::NotFound { what }) => assert!(what.contains("v9.9.9")),
        other => panic!("expected NotFound, got {other:?}"),
    }
    assert!(matches!(pulls, Err(CollectorError::Status { status: 500, .. })));
}

#[tokio::test(flavor = "multi_thread")]
async fn webhook_posts_content_and_maps_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ok"))
        .and(body_json(json!({"content": "hello"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1.5"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let base = server.uri();
    let (ok, busy, broken) = off_runtime(move || {
        let send = |hook: &str| {
            WebhookNotifier::new(Client::new(), Some(format!("{base}/{hook}"))).send("  hello \n")
        };
        (send("ok"), send("busy"), send("broken"))
    })
    .await;

    ok.unwrap();
    match busy {
        Err(DeliveryError::RateLimited { retry_after_secs }) => {
            assert_eq!(retry_after_secs, Some(1.5));
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
    assert!(matches!(broken, Err(DeliveryError::Status(500))));
}
