//! End-to-end coverage of the Proxy Pipeline (§4.6) against a mocked
//! upstream: unary metering, the response cache, streaming usage
//! extraction, auto-tag creation, and non-200 passthrough.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{config_pointed_at, TestApp};
use http_body_util::BodyExt;
use llmlab::domain::Provider;
use serde_json::json;
use tower::ServiceExt;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn unary_request_is_metered_and_forwarded_untouched() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-tenant-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "gpt-4o",
            "choices": [{"message": {"role": "assistant", "content": "hi"}}],
            "usage": {"prompt_tokens": 100, "completion_tokens": 50},
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let app = TestApp::build(config_pointed_at(&mock_server.uri())).await;
    let proxy_key = app
        .new_credential(app.new_tenant_with_token().await.0, Provider::Openai, "sk-tenant-secret")
        .await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/proxy/openai/v1/chat/completions")
        .header("authorization", format!("Bearer {proxy_key}"))
        .header("content-type", "application/json")
        .body(Body::from(json!({"model": "gpt-4o", "messages": []}).to_string()))
        .unwrap();

    let response = app.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["choices"][0]["message"]["content"], "hi");
}

#[tokio::test]
async fn identical_request_body_hits_the_cache_on_second_call() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "gpt-4o",
            "usage": {"prompt_tokens": 10, "completion_tokens": 5},
        })))
        .expect(1) // only the first call should reach upstream
        .mount(&mock_server)
        .await;

    let app = TestApp::build(config_pointed_at(&mock_server.uri())).await;
    let (tenant_id, _) = app.new_tenant_with_token().await;
    let proxy_key = app.new_credential(tenant_id, Provider::Openai, "sk-secret").await;

    let make_request = || {
        Request::builder()
            .method("POST")
            .uri("/api/v1/proxy/openai/v1/chat/completions")
            .header("authorization", format!("Bearer {proxy_key}"))
            .header("content-type", "application/json")
            .body(Body::from(json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "hi"}]}).to_string()))
            .unwrap()
    };

    let router = app.router();
    let first = router.clone().oneshot(make_request()).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = router.oneshot(make_request()).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);

    let logs = app.state.usage_logs.list(tenant_id, &Default::default()).await.unwrap();
    assert_eq!(logs.len(), 2);
    assert!(!logs[1].cache_hit); // most recent first; first call was a miss
    assert!(logs[0].cache_hit); // second call was served from cache
}

#[tokio::test]
async fn streaming_anthropic_response_is_metered_after_the_stream_completes() {
    let mock_server = MockServer::start().await;
    let sse_body = concat!(
        "data: {\"type\":\"message_start\",\"message\":{\"model\":\"claude-3-5-sonnet-20241022\",\"usage\":{\"input_tokens\":20}}}\n\n",
        "data: {\"type\":\"message_delta\",\"usage\":{\"output_tokens\":8}}\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse_body, "text/event-stream")
                .append_header("anthropic-version", "2023-06-01"),
        )
        .mount(&mock_server)
        .await;

    let app = TestApp::build(config_pointed_at(&mock_server.uri())).await;
    let (tenant_id, _) = app.new_tenant_with_token().await;
    let proxy_key = app.new_credential(tenant_id, Provider::Anthropic, "sk-ant-secret").await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/proxy/anthropic/v1/messages")
        .header("authorization", format!("Bearer {proxy_key}"))
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"model": "claude-3-5-sonnet-20241022", "stream": true, "messages": []}).to_string(),
        ))
        .unwrap();

    let response = app.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let _drained = response.into_body().collect().await.unwrap().to_bytes();

    // Metering happens after the stream tap observes completion, off the
    // response path (§4.7) — give the detached task a moment to land.
    for _ in 0..20 {
        let logs = app.state.usage_logs.list(tenant_id, &Default::default()).await.unwrap();
        if !logs.is_empty() {
            assert_eq!(logs[0].input_tokens, 20);
            assert_eq!(logs[0].output_tokens, 8);
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    }
    panic!("expected a usage log to be written after the streaming response completed");
}

#[tokio::test]
async fn request_tagged_via_header_auto_creates_and_attaches_the_tag() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "gpt-4o",
            "usage": {"prompt_tokens": 4, "completion_tokens": 2},
        })))
        .mount(&mock_server)
        .await;

    let app = TestApp::build(config_pointed_at(&mock_server.uri())).await;
    let (tenant_id, _) = app.new_tenant_with_token().await;
    let proxy_key = app.new_credential(tenant_id, Provider::Openai, "sk-secret").await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/proxy/openai/v1/chat/completions")
        .header("authorization", format!("Bearer {proxy_key}"))
        .header("content-type", "application/json")
        .header("x-llmlab-tags", "billing-experiment")
        .body(Body::from(json!({"model": "gpt-4o", "messages": []}).to_string()))
        .unwrap();

    let response = app.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let tags = app.state.tags.list(tenant_id).await.unwrap();
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].name, "billing-experiment");
}

#[tokio::test]
async fn non_200_upstream_response_is_passed_through_without_a_usage_log() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({"error": "rate_limited"})))
        .mount(&mock_server)
        .await;

    let app = TestApp::build(config_pointed_at(&mock_server.uri())).await;
    let (tenant_id, _) = app.new_tenant_with_token().await;
    let proxy_key = app.new_credential(tenant_id, Provider::Openai, "sk-secret").await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/proxy/openai/v1/chat/completions")
        .header("authorization", format!("Bearer {proxy_key}"))
        .header("content-type", "application/json")
        .body(Body::from(json!({"model": "gpt-4o", "messages": []}).to_string()))
        .unwrap();

    let response = app.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let logs = app.state.usage_logs.list(tenant_id, &Default::default()).await.unwrap();
    assert!(logs.is_empty());
}

#[tokio::test]
async fn proxy_key_minted_for_one_provider_cannot_unlock_another() {
    let mock_server = MockServer::start().await;
    let app = TestApp::build(config_pointed_at(&mock_server.uri())).await;
    let (tenant_id, _) = app.new_tenant_with_token().await;
    let proxy_key = app.new_credential(tenant_id, Provider::Anthropic, "sk-ant-secret").await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/proxy/openai/v1/chat/completions")
        .header("authorization", format!("Bearer {proxy_key}"))
        .header("content-type", "application/json")
        .body(Body::from(json!({"model": "gpt-4o"}).to_string()))
        .unwrap();

    let response = app.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
