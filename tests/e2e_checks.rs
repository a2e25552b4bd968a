//! End-to-end passes with the real checkers against mock HTTP servers

mod helper;

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use mockito::Server;
use serde_json::json;

use depwatch::config::RateLimitConfig;
use depwatch::engine::change::{ChangeKind, Severity};
use depwatch::engine::checkers::{
    ApiSpecChecker, CheckerRegistry, DocsApiChecker, HttpContentChecker, RepositoryChecker,
};
use depwatch::engine::monitor::Monitor;
use depwatch::engine::rate_limit::{Quota, RateLimitHandler};
use depwatch::engine::result::apply_results;
use depwatch::model::{AccessMethod, DependencyRecord, keys};

use helper::{create_monitor, options};

#[tokio::test]
async fn repository_release_bump_from_v1_2_0_to_v2_0_0_is_breaking() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/repos/acme/widget/releases/latest")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_header("x-ratelimit-limit", "5000")
        .with_header("x-ratelimit-remaining", "4000")
        .with_header("x-ratelimit-reset", "4102444800")
        .with_body(r#"{"tag_name": "v2.0.0", "name": "Widget 2", "published_at": "2025-06-01T00:00:00Z"}"#)
        .create_async()
        .await;

    let rate_limiter = Arc::new(RateLimitHandler::new(RateLimitConfig::default()));
    let checker = RepositoryChecker::new(&server.url(), Arc::clone(&rate_limiter));
    let monitor = create_monitor(vec![Arc::new(checker)], options());
    let record = DependencyRecord::new(
        "widget",
        "https://github.com/acme/widget",
        AccessMethod::RepositoryApi,
    )
    .with_state_hash("abc123")
    .with_version("v1.2.0");

    let results = monitor.check_all(&[record]).await;

    let change = results[0].change().unwrap();
    assert!(change.contains(ChangeKind::Version));
    assert_eq!(change.severity(), Some(Severity::Breaking));
    assert_eq!(
        results[0].snapshot().unwrap().metadata_str(keys::RELEASE_NAME),
        Some("Widget 2")
    );
    assert_eq!(rate_limiter.quota().map(|q| q.remaining), Some(4000));
}

#[tokio::test]
async fn unreleased_repository_spends_one_quota_unit_per_api_call() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/repos/acme/tool/releases/latest")
        .with_status(404)
        .create_async()
        .await;
    server
        .mock("GET", "/repos/acme/tool")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"pushed_at": "2025-06-01T00:00:00Z", "default_branch": "main"}"#)
        .create_async()
        .await;

    let rate_limiter = Arc::new(RateLimitHandler::with_quota(
        RateLimitConfig::default(),
        Quota {
            limit: 5000,
            remaining: 500,
            reset_at: Utc::now() + TimeDelta::minutes(30),
        },
    ));
    let checker = RepositoryChecker::new(&server.url(), Arc::clone(&rate_limiter));
    let monitor = Monitor::new(
        CheckerRegistry::new().with(Arc::new(checker)),
        Arc::clone(&rate_limiter),
        options(),
    );

    let results = monitor
        .check_all(&[DependencyRecord::new(
            "tool",
            "https://github.com/acme/tool",
            AccessMethod::RepositoryApi,
        )])
        .await;

    assert!(results[0].snapshot().is_some());
    assert_eq!(rate_limiter.quota().map(|q| q.remaining), Some(498));
}

#[tokio::test]
async fn docs_page_with_stable_metadata_reports_no_change() {
    let mut index = Server::new_async().await;
    index
        .mock(
            "GET",
            mockito::Matcher::Regex("^/v1/libraries/.*".to_string()),
        )
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"id": "/docs.example.com/guide", "version": "4.2.0", "lastUpdated": "2025-05-01T00:00:00Z", "totalSnippets": 300}"#,
        )
        .create_async()
        .await;

    let monitor = create_monitor(
        vec![Arc::new(DocsApiChecker::new(&index.url()))],
        options().with_force(true),
    );
    let records = vec![DependencyRecord::new(
        "guide",
        "https://docs.example.com/guide",
        AccessMethod::DocsApi,
    )];

    let first = monitor.check_all(&records).await;
    assert!(!first[0].has_changed());
    let records = apply_results(&records, &first);

    let second = monitor.check_all(&records).await;

    assert!(second[0].error().is_none());
    assert!(!second[0].has_changed());
    assert_eq!(second[0].severity(), None);
    assert!(!second[0].snapshot().unwrap().is_degraded());

    let rechecked = apply_results(&records, &second);
    assert_eq!(rechecked[0].current_state_hash, records[0].current_state_hash);
    assert!(rechecked[0].last_checked > records[0].last_checked);
}

#[tokio::test]
async fn markup_reformatting_is_not_a_change() {
    let mut server = Server::new_async().await;
    let first = server
        .mock("GET", "/changelog")
        .with_status(200)
        .with_header("content-type", "text/html; charset=utf-8")
        .with_body("<html>\n  <body>\n    <h1>Changelog</h1>\n  </body>\n</html>")
        .create_async()
        .await;

    let monitor = create_monitor(
        vec![Arc::new(HttpContentChecker::new())],
        options().with_force(true),
    );
    let records = vec![DependencyRecord::new(
        "changelog",
        format!("{}/changelog", server.url()),
        AccessMethod::HttpContent,
    )];
    let baseline = monitor.check_all(&records).await;
    let records = apply_results(&records, &baseline);
    first.remove_async().await;

    server
        .mock("GET", "/changelog")
        .with_status(200)
        .with_header("content-type", "text/html; charset=utf-8")
        .with_body("<html><!-- build 42 --><body><h1>Changelog</h1></body></html>")
        .create_async()
        .await;

    let results = monitor.check_all(&records).await;

    assert!(results[0].snapshot().is_some());
    assert!(!results[0].has_changed());
}

fn spec(paths: serde_json::Value) -> String {
    json!({
        "openapi": "3.0.0",
        "info": { "title": "Pets", "version": "1.0.0" },
        "paths": paths,
        "components": {
            "schemas": {
                "Pet": {
                    "properties": {
                        "id": { "type": "integer", "format": "int64" },
                        "name": { "type": "string" }
                    }
                }
            }
        }
    })
    .to_string()
}

#[tokio::test]
async fn removed_operation_in_api_spec_is_breaking() {
    let mut server = Server::new_async().await;
    let before = server
        .mock("GET", "/openapi.json")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(spec(json!({
            "/pets": { "get": {}, "post": {} },
            "/pets/{id}": { "delete": {} }
        })))
        .create_async()
        .await;

    let monitor = create_monitor(
        vec![Arc::new(ApiSpecChecker::new())],
        options().with_force(true),
    );
    let records = vec![DependencyRecord::new(
        "pets",
        format!("{}/openapi.json", server.url()),
        AccessMethod::ApiSpec,
    )];
    let baseline = monitor.check_all(&records).await;
    let records = apply_results(&records, &baseline);
    before.remove_async().await;

    server
        .mock("GET", "/openapi.json")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(spec(json!({
            "/pets": { "get": {}, "post": {} }
        })))
        .create_async()
        .await;

    let results = monitor.check_all(&records).await;

    let change = results[0].change().unwrap();
    assert_eq!(change.severity(), Some(Severity::Breaking));
    assert_eq!(
        change
            .structural_diff
            .as_ref()
            .map(|d| d.removed_operations.clone()),
        Some(vec!["DELETE /pets/{id}".to_string()])
    );
}

#[tokio::test]
async fn unresolvable_repository_url_fails_only_that_record() {
    let server = Server::new_async().await;
    let rate_limiter = Arc::new(RateLimitHandler::new(RateLimitConfig::default()));
    let monitor = create_monitor(
        vec![Arc::new(RepositoryChecker::new(&server.url(), rate_limiter))],
        options(),
    );

    let results = monitor
        .check_all(&[DependencyRecord::new(
            "bad",
            "https://example.com/not/github",
            AccessMethod::RepositoryApi,
        )])
        .await;

    assert!(results[0].error().is_some_and(|e| e.is_configuration()));
}
