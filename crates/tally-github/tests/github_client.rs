use std::time::Duration;

use httpmock::Method::{GET, POST, PUT};
use httpmock::MockServer;
use serde_json::{Value, json};
use tally_core::Secret;
use tally_github::{
    GitHubClient, RemoteError, RemoteStore, RepoRef, RetryPolicy, VersionToken, WriteRequest,
};

const TOKEN: &str = "secret-token";

fn client(server: &MockServer, attempts: u32) -> GitHubClient {
    GitHubClient::with_api_base(
        Secret::new(TOKEN),
        &server.base_url(),
        RetryPolicy::immediate(attempts),
    )
    .expect("client")
}

fn repo() -> RepoRef {
    RepoRef::new("octo", "widgets")
}

fn releases(count: usize, downloads: u64) -> Value {
    Value::Array(
        (0..count)
            .map(|index| json!({"id": index, "assets": [{"download_count": downloads}]}))
            .collect(),
    )
}

#[tokio::test]
async fn repository_meta_sends_api_headers() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/repos/octo/widgets")
                .header("authorization", "Bearer secret-token")
                .header("accept", "application/vnd.github+json")
                .header("x-github-api-version", "2022-11-28");
            then.status(200)
                .json_body(json!({"default_branch": "trunk", "private": true}));
        })
        .await;

    let meta = client(&server, 5)
        .fetch_repository_meta(&repo())
        .await
        .expect("meta");

    assert_eq!(meta.default_branch, "trunk");
    assert!(meta.private);
    assert_eq!(mock.hits_async().await, 1);
}

#[tokio::test]
async fn aggregate_total_paginates_until_short_page() {
    let server = MockServer::start_async().await;
    let first = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/repos/octo/widgets/releases")
                .query_param("per_page", "100")
                .query_param("page", "1");
            then.status(200).json_body(releases(100, 2));
        })
        .await;
    let second = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/repos/octo/widgets/releases")
                .query_param("per_page", "100")
                .query_param("page", "2");
            then.status(200).json_body(releases(3, 5));
        })
        .await;

    let total = client(&server, 5)
        .fetch_aggregate_total(&repo())
        .await
        .expect("total");

    assert_eq!(total, 215);
    assert_eq!(first.hits_async().await, 1);
    assert_eq!(second.hits_async().await, 1);
}

#[tokio::test]
async fn aggregate_total_rejects_non_array_response() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/repos/octo/widgets/releases");
            then.status(200).json_body(json!({"message": "surprise"}));
        })
        .await;

    let err = client(&server, 5)
        .fetch_aggregate_total(&repo())
        .await
        .expect_err("object body");
    assert!(matches!(err, RemoteError::UnexpectedResponse(_)));
}

#[tokio::test]
async fn read_file_decodes_content_and_tolerates_missing() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/repos/octo/widgets/contents/gh-dl/downloads.json")
                .query_param("ref", "gh-pages");
            then.status(200).json_body(json!({
                "type": "file",
                "sha": "abc123",
                "content": "eyJvd25lciI6\nIm9jdG8ifQ==\n"
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/repos/octo/widgets/contents/gh-dl/missing.json");
            then.status(404).json_body(json!({"message": "Not Found"}));
        })
        .await;

    let store = client(&server, 5);
    let file = store
        .read_file(&repo(), "gh-dl/downloads.json", "gh-pages")
        .await
        .expect("read")
        .expect("present");
    assert_eq!(file.content, r#"{"owner":"octo"}"#);
    assert_eq!(file.version, VersionToken::from_raw("abc123"));

    let missing = store
        .read_file(&repo(), "gh-dl/missing.json", "gh-pages")
        .await
        .expect("read");
    assert!(missing.is_none());
}

#[tokio::test]
async fn read_file_rejects_directories_and_other_types() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/repos/octo/widgets/contents/gh-dl");
            then.status(200).json_body(json!([{"type": "file", "name": "downloads.json"}]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/repos/octo/widgets/contents/link");
            then.status(200)
                .json_body(json!({"type": "symlink", "sha": "def", "target": "gh-dl"}));
        })
        .await;

    let store = client(&server, 5);
    assert!(matches!(
        store.read_file(&repo(), "gh-dl", "gh-pages").await,
        Err(RemoteError::Directory { .. })
    ));
    assert!(matches!(
        store.read_file(&repo(), "link", "gh-pages").await,
        Err(RemoteError::NotAFile { kind, .. }) if kind == "symlink"
    ));
}

#[tokio::test]
async fn write_file_sends_base64_content_and_version() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/repos/octo/widgets/contents/gh-dl/downloads.json")
                .body_contains("\"content\":\"aGVsbG8=\"")
                .body_contains("\"sha\":\"abc123\"")
                .body_contains("\"branch\":\"gh-pages\"");
            then.status(200).json_body(json!({"content": {"sha": "def456"}}));
        })
        .await;

    let token = VersionToken::from_raw("abc123");
    client(&server, 5)
        .write_file(
            &repo(),
            WriteRequest {
                path: "gh-dl/downloads.json",
                branch: "gh-pages",
                content: "hello",
                message: "chore: update",
                expected_version: Some(&token),
            },
        )
        .await
        .expect("write");

    assert_eq!(mock.hits_async().await, 1);
}

#[tokio::test]
async fn write_conflicts_are_returned_without_retry() {
    let server = MockServer::start_async().await;
    let conflict = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/repos/octo/widgets/contents/gh-dl/downloads.json");
            then.status(409)
                .json_body(json!({"message": "gh-dl/downloads.json does not match abc"}));
        })
        .await;
    let stale_sha = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/repos/octo/widgets/contents/gh-dl/chart.svg");
            then.status(422)
                .json_body(json!({"message": "Invalid request. \"sha\" wasn't supplied."}));
        })
        .await;

    let store = client(&server, 5);
    let request = |path| WriteRequest {
        path,
        branch: "gh-pages",
        content: "{}",
        message: "update",
        expected_version: None,
    };

    let err = store
        .write_file(&repo(), request("gh-dl/downloads.json"))
        .await
        .expect_err("conflict");
    assert!(err.is_conflict());
    assert_eq!(err.status(), Some(409));
    assert_eq!(conflict.hits_async().await, 1);

    let err = store
        .write_file(&repo(), request("gh-dl/chart.svg"))
        .await
        .expect_err("stale sha");
    assert!(err.is_conflict());
    assert_eq!(err.status(), Some(422));
    assert_eq!(stale_sha.hits_async().await, 1);
}

#[tokio::test]
async fn transient_failures_retry_until_attempts_run_out() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/repos/octo/widgets");
            then.status(503).body("upstream unavailable");
        })
        .await;

    let err = client(&server, 3)
        .fetch_repository_meta(&repo())
        .await
        .expect_err("exhausted");

    assert_eq!(mock.hits_async().await, 3);
    match err {
        RemoteError::Status {
            status, message, ..
        } => {
            assert_eq!(status, 503);
            assert_eq!(message, "upstream unavailable");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn aggregate_total_stops_at_the_page_limit() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/repos/octo/widgets/releases");
            then.status(200).json_body(releases(100, 1));
        })
        .await;

    let err = client(&server, 1)
        .fetch_aggregate_total(&repo())
        .await
        .expect_err("every page is full");

    assert!(matches!(err, RemoteError::PaginationLimit(1000)));
    assert_eq!(mock.hits_async().await, 1000);
}

#[tokio::test]
async fn aggregate_total_keeps_large_counts_exact() {
    let server = MockServer::start_async().await;
    let large = (1u64 << 53) + 1;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/repos/octo/widgets/releases");
            then.status(200).json_body(json!([
                {"assets": [{"download_count": large}, {"download_count": 2}]},
                {"assets": [{"download_count": -4}, {"download_count": 1.5}]},
            ]));
        })
        .await;

    let total = client(&server, 1)
        .fetch_aggregate_total(&repo())
        .await
        .expect("total");

    assert_eq!(total, large + 3);
}

#[tokio::test]
async fn request_timeouts_are_retried_then_reported() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/repos/octo/widgets");
            then.status(200)
                .delay(Duration::from_millis(500))
                .json_body(json!({"default_branch": "main", "private": false}));
        })
        .await;
    let policy = RetryPolicy {
        request_timeout: Duration::from_millis(50),
        ..RetryPolicy::immediate(3)
    };
    let client = GitHubClient::with_api_base(Secret::new(TOKEN), &server.base_url(), policy)
        .expect("client");

    let err = client
        .fetch_repository_meta(&repo())
        .await
        .expect_err("every attempt times out");

    assert_eq!(mock.hits_async().await, 3);
    match err {
        RemoteError::Timeout {
            method,
            path,
            timeout_ms,
        } => {
            assert_eq!(method, "GET");
            assert_eq!(path, "/repos/octo/widgets");
            assert_eq!(timeout_ms, 50);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn authorization_failures_fail_immediately() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/repos/octo/widgets");
            then.status(401).json_body(json!({"message": "Bad credentials"}));
        })
        .await;

    let err = client(&server, 5)
        .fetch_repository_meta(&repo())
        .await
        .expect_err("unauthorized");

    assert_eq!(mock.hits_async().await, 1);
    assert_eq!(err.status(), Some(401));
    assert!(err.to_string().contains("Bad credentials"));
}

#[tokio::test]
async fn exhausted_rate_limit_is_retried() {
    let server = MockServer::start_async().await;
    let reset = (chrono::Utc::now().timestamp() + 60).to_string();
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/repos/octo/widgets");
            then.status(403)
                .header("x-ratelimit-remaining", "0")
                .header("x-ratelimit-reset", reset.as_str())
                .json_body(json!({"message": "API rate limit exceeded"}));
        })
        .await;

    let err = client(&server, 2)
        .fetch_repository_meta(&repo())
        .await
        .expect_err("still limited");

    assert_eq!(mock.hits_async().await, 2);
    assert_eq!(err.status(), Some(403));
}

#[tokio::test]
async fn ensure_branch_creates_missing_branch_from_fallback() {
    let server = MockServer::start_async().await;
    let lookup = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/repos/octo/widgets/git/ref/heads/gh-pages");
            then.status(404).json_body(json!({"message": "Not Found"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/repos/octo/widgets/git/ref/heads/main");
            then.status(200)
                .json_body(json!({"ref": "refs/heads/main", "object": {"sha": "base-sha"}}));
        })
        .await;
    let create = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/repos/octo/widgets/git/refs")
                .body_contains("\"ref\":\"refs/heads/gh-pages\"")
                .body_contains("\"sha\":\"base-sha\"");
            then.status(201).json_body(json!({"ref": "refs/heads/gh-pages"}));
        })
        .await;

    let created = client(&server, 5)
        .ensure_branch_exists(&repo(), "gh-pages", "main")
        .await
        .expect("ensure");

    assert!(created);
    assert_eq!(lookup.hits_async().await, 1);
    assert_eq!(create.hits_async().await, 1);
}

#[tokio::test]
async fn ensure_branch_fails_without_fallback_sha() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/repos/octo/widgets/git/ref/heads/gh-pages");
            then.status(404);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/repos/octo/widgets/git/ref/heads/main");
            then.status(200).json_body(json!({"ref": "refs/heads/main"}));
        })
        .await;

    let err = client(&server, 5)
        .ensure_branch_exists(&repo(), "gh-pages", "main")
        .await
        .expect_err("no sha");
    assert!(matches!(err, RemoteError::MissingSourceSha { .. }));
}

#[tokio::test]
async fn existing_branch_is_left_alone() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/repos/octo/widgets/git/ref/heads/gh-pages");
            then.status(200)
                .json_body(json!({"ref": "refs/heads/gh-pages", "object": {"sha": "x"}}));
        })
        .await;

    let created = client(&server, 5)
        .ensure_branch_exists(&repo(), "gh-pages", "main")
        .await
        .expect("ensure");
    assert!(!created);
}
