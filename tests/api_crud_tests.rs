//! CRUD coverage for the JWT-gated `/api/v1/*` surface: keys, tags,
//! budgets, webhooks, logs (including the sort whitelist, §4.8), stats,
//! export, and cache introspection.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{config_pointed_at, TestApp};
use http_body_util::BodyExt;
use llmlab::domain::{Provider, UsageLog};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn send(app: &TestApp, token: &str, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"));
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let response = app.router().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn test_app() -> TestApp {
    TestApp::build(config_pointed_at("http://127.0.0.1:0")).await
}

#[tokio::test]
async fn unauthenticated_request_to_a_gated_route_is_rejected() {
    let app = test_app().await;
    let response = app
        .router()
        .oneshot(Request::builder().uri("/api/v1/keys").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn key_lifecycle_create_list_deactivate() {
    let app = test_app().await;
    let (_, token) = app.new_tenant_with_token().await;

    let (status, body) = send(
        &app,
        &token,
        "POST",
        "/api/v1/keys",
        Some(json!({"provider": "openai", "secret": "sk-abc123"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let key_id = body["id"].as_str().unwrap().to_string();
    assert!(body["proxy_key"].as_str().unwrap().starts_with("llmlab_pk_"));

    let (status, body) = send(&app, &token, "GET", "/api/v1/keys", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = send(&app, &token, "DELETE", &format!("/api/v1/keys/{key_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn second_active_credential_for_the_same_provider_is_a_conflict() {
    let app = test_app().await;
    let (_, token) = app.new_tenant_with_token().await;

    let (status, _) = send(
        &app,
        &token,
        "POST",
        "/api/v1/keys",
        Some(json!({"provider": "openai", "secret": "sk-first"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        &token,
        "POST",
        "/api/v1/keys",
        Some(json!({"provider": "openai", "secret": "sk-second"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn empty_secret_is_rejected_as_a_validation_error() {
    let app = test_app().await;
    let (_, token) = app.new_tenant_with_token().await;
    let (status, _) = send(
        &app,
        &token,
        "POST",
        "/api/v1/keys",
        Some(json!({"provider": "openai", "secret": "  "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn tag_lifecycle_create_list_remove() {
    let app = test_app().await;
    let (_, token) = app.new_tenant_with_token().await;

    let (status, body) = send(&app, &token, "POST", "/api/v1/tags", Some(json!({"name": "prod"}))).await;
    assert_eq!(status, StatusCode::OK);
    let tag_id = body["id"].as_str().unwrap().to_string();

    let (_, body) = send(&app, &token, "GET", "/api/v1/tags", None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _) = send(&app, &token, "DELETE", &format!("/api/v1/tags/{tag_id}"), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, &token, "GET", "/api/v1/tags", None).await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn budget_upsert_rejects_non_positive_amount() {
    let app = test_app().await;
    let (_, token) = app.new_tenant_with_token().await;

    let (status, body) = send(
        &app,
        &token,
        "POST",
        "/api/v1/budgets",
        Some(json!({"amount_usd": 100.0, "alert_threshold_pct": 80.0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["amount_usd"], 100.0);

    let (status, _) = send(
        &app,
        &token,
        "POST",
        "/api/v1/budgets",
        Some(json!({"amount_usd": 0, "alert_threshold_pct": 80.0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_lifecycle_create_list_remove_validates_url_scheme() {
    let app = test_app().await;
    let (_, token) = app.new_tenant_with_token().await;

    let (status, _) = send(
        &app,
        &token,
        "POST",
        "/api/v1/webhooks",
        Some(json!({"url": "not-a-url", "event_type": "budget_warning"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        &token,
        "POST",
        "/api/v1/webhooks",
        Some(json!({"url": "https://example.com/hook", "event_type": "budget_warning"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let webhook_id = body["id"].as_str().unwrap().to_string();

    let (_, body) = send(&app, &token, "GET", "/api/v1/webhooks", None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _) = send(&app, &token, "DELETE", &format!("/api/v1/webhooks/{webhook_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn logs_sort_by_rejects_unwhitelisted_columns_by_falling_back_silently() {
    let app = test_app().await;
    let (tenant_id, token) = app.new_tenant_with_token().await;

    for i in 0..3 {
        app.state
            .usage_logs
            .create(
                &UsageLog::new(tenant_id, Provider::Openai, "gpt-4o", i, i, dec!(1.00), 10, false),
                &[],
            )
            .await
            .unwrap();
    }

    // A sort_by that isn't in SORT_WHITELIST (here, an injection attempt)
    // must not error and must not affect the query shape (§4.8).
    let (status, body) = send(
        &app,
        &token,
        "GET",
        "/api/v1/logs?sort_by=id%3B%20DROP%20TABLE%20usage_logs%3B--",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["logs"].as_array().unwrap().len(), 3);
    assert_eq!(body["total"], 3);
}

#[tokio::test]
async fn logs_date_from_after_date_to_is_a_validation_error() {
    let app = test_app().await;
    let (_, token) = app.new_tenant_with_token().await;

    let (status, _) = send(
        &app,
        &token,
        "GET",
        "/api/v1/logs?date_from=2026-02-01&date_to=2026-01-01",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stats_summary_reflects_logged_usage() {
    let app = test_app().await;
    let (tenant_id, token) = app.new_tenant_with_token().await;

    app.state
        .usage_logs
        .create(
            &UsageLog::new(tenant_id, Provider::Openai, "gpt-4o", 100, 50, dec!(2.50), 120, false),
            &[],
        )
        .await
        .unwrap();

    let (status, body) = send(&app, &token, "GET", "/api/v1/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_object());
}

#[tokio::test]
async fn export_csv_returns_one_row_per_usage_log() {
    let app = test_app().await;
    let (tenant_id, token) = app.new_tenant_with_token().await;

    for i in 0..2 {
        app.state
            .usage_logs
            .create(
                &UsageLog::new(tenant_id, Provider::Openai, "gpt-4o", i + 1, i + 1, dec!(0.50), 10, false),
                &[],
            )
            .await
            .unwrap();
    }

    let response = app
        .router()
        .oneshot(
            Request::builder()
                .uri("/api/v1/export/csv")
                .header("authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-type").unwrap(), "text/csv");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    // header line + 2 data rows
    assert_eq!(text.lines().count(), 3);
    assert!(text.starts_with("id,provider,model"));
}

#[tokio::test]
async fn cache_stats_and_clear_round_trip() {
    let app = test_app().await;
    let (_, token) = app.new_tenant_with_token().await;

    let (status, body) = send(&app, &token, "GET", "/api/v1/cache/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hits"], 0);
    assert_eq!(body["misses"], 0);

    let (status, body) = send(&app, &token, "DELETE", "/api/v1/cache", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}
