//! The 8-step Proxy Pipeline (§4.6): authenticate the proxy key, check the
//! response cache, forward or stream to the upstream provider, meter the
//! response, auto-attach tags, fire the post-metering hooks, and return the
//! response untouched.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use uuid::Uuid;

use crate::cache::{cache_key, CachedMetadata, ResponseCache};
use crate::crypto::{self, EncryptionKey};
use crate::domain::{Credential, LlmLabError, Provider, Result, UsageLog};
use crate::providers::{self, adapter_for, to_axum_headers, to_reqwest_headers};
use crate::storage::{CredentialRepository, UsageLogRepository};
use crate::tags::TagRegistry;

use super::stream_tap::StreamTap;

/// Everything the pipeline needs, composed once at startup and shared across
/// requests behind an `Arc` (the `api::AppState` holds one of these).
pub struct PipelineDeps {
    pub http_client: reqwest::Client,
    pub credentials: Arc<dyn CredentialRepository>,
    pub usage_logs: Arc<dyn UsageLogRepository>,
    pub cache: Arc<dyn ResponseCache>,
    pub cache_ttl: Duration,
    pub tags: Arc<TagRegistry>,
    pub upstream_timeout: Duration,
    pub encryption_key: EncryptionKey,
    /// Upstream base URLs, overridable per environment (and by tests
    /// pointing at a `wiremock` server) without a rebuild (§9).
    pub providers: crate::config::ProviderConfig,
    /// Invoked (fire-and-forget) once a request was metered — hooks the
    /// Budget Watcher and Anomaly Detector post-hooks (§4.6 step 7) without
    /// this module knowing anything about budgets or anomalies.
    pub on_metered: Option<Arc<dyn Fn(Uuid) + Send + Sync>>,
}

/// Extracts a proxy key (`llmlab_pk_...`) from `Authorization: Bearer` or
/// `x-api-key` (§4.6 step 1). Any other scheme/absence is an auth error.
fn extract_proxy_key(headers: &HeaderMap) -> Result<String> {
    if let Some(value) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        if let Some(key) = value.strip_prefix("Bearer ") {
            return Ok(key.trim().to_string());
        }
    }
    if let Some(value) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        return Ok(value.trim().to_string());
    }
    Err(LlmLabError::auth("missing proxy key"))
}

/// Resolves and validates a proxy key against the path's `{provider}`
/// segment: the credential must exist, be active, and belong to the same
/// provider the URL names — a key minted for Anthropic must not unlock the
/// OpenAI route (§4.6 step 1, §4.2).
async fn resolve_credential(deps: &PipelineDeps, proxy_key: &str, provider: Provider) -> Result<Credential> {
    let credential = deps
        .credentials
        .get_by_proxy_key(proxy_key)
        .await?
        .ok_or_else(|| LlmLabError::auth("invalid proxy key"))?;

    if !credential.active {
        return Err(LlmLabError::auth("credential is inactive"));
    }
    if credential.provider != provider {
        return Err(LlmLabError::auth("proxy key does not match provider"));
    }
    Ok(credential)
}

/// Axum handler for `/api/v1/proxy/{provider}/{*passthrough}`. Never
/// rewrites request or response semantics (§1 Non-goals) — only meters,
/// caches, and forwards.
pub async fn run(
    State(deps): State<Arc<PipelineDeps>>,
    Path((provider_segment, passthrough)): Path<(String, String)>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match handle(deps, provider_segment, passthrough, method, headers, body).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn handle(
    deps: Arc<PipelineDeps>,
    provider_segment: String,
    passthrough: String,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    // Step 1: auth.
    let provider = Provider::from_path_segment(&provider_segment)?;
    let proxy_key = extract_proxy_key(&headers)?;
    let credential = resolve_credential(&deps, &proxy_key, provider).await?;
    // Plaintext never crosses the component boundary except to the Provider
    // Adapter during a live request (§4.2) — decrypt here, right before use.
    let secret = crypto::decrypt(&credential.encrypted_secret, &deps.encryption_key)?;

    // Step 2: body read + model/stream inference (§4.6 step 2).
    let request_json: Option<serde_json::Value> = serde_json::from_slice(&body).ok();
    let requested_model = request_json
        .as_ref()
        .and_then(|v| v.get("model"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let is_stream = request_json
        .as_ref()
        .and_then(|v| v.get("stream"))
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let adapter = adapter_for(provider);
    let inbound_headers = to_reqwest_headers(&headers);
    let tag_header = headers
        .get("x-llmlab-tags")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if is_stream {
        return handle_stream(
            deps,
            adapter.as_ref(),
            credential,
            &secret,
            &passthrough,
            method,
            inbound_headers,
            body.to_vec(),
            requested_model,
            tag_header,
        )
        .await;
    }

    handle_unary(
        &deps,
        adapter.as_ref(),
        &credential,
        &secret,
        &passthrough,
        method,
        inbound_headers,
        body.to_vec(),
        provider,
        requested_model,
        tag_header,
    )
    .await
}

#[allow(clippy::too_many_arguments)]
async fn handle_unary(
    deps: &PipelineDeps,
    adapter: &dyn providers::ProviderAdapter,
    credential: &Credential,
    secret: &str,
    passthrough: &str,
    method: Method,
    inbound_headers: reqwest::header::HeaderMap,
    body: Vec<u8>,
    provider: Provider,
    requested_model: String,
    tag_header: Option<String>,
) -> Result<Response> {
    let key = cache_key(provider, &body);

    // Step 3: cache lookup (§4.3, §4.6 step 3).
    if let Some((cached_body, metadata)) = deps.cache.get(&key).await {
        tracing::debug!(%provider, "cache hit");
        let log = UsageLog::cache_hit_row(
            credential.tenant_id,
            metadata.provider,
            metadata.model.clone(),
            metadata.input_tokens,
            metadata.output_tokens,
        );
        let tags = deps.tags.auto_attach(credential.tenant_id, tag_header.as_deref()).await?;
        deps.usage_logs
            .create(&log, &tags.iter().map(|t| t.id).collect::<Vec<_>>())
            .await?;
        if let Some(hook) = &deps.on_metered {
            hook(credential.tenant_id);
        }
        crate::observability::metrics::record_provider_call(provider, true, 0);

        let headers = response_headers_for_content_type(&metadata.content_type);
        return Ok(build_passthrough_response(metadata.status_code, &headers, cached_body));
    }

    // Step 4: forward unary (§4.4 `Forward`, §4.6 step 4).
    let start = Instant::now();
    let forwarded = providers::forward(
        &deps.http_client,
        adapter,
        &deps.providers,
        secret,
        passthrough,
        method,
        inbound_headers,
        body,
        deps.upstream_timeout,
    )
    .await?;
    let latency_ms = start.elapsed().as_millis() as i64;
    crate::observability::metrics::record_provider_call(provider, false, latency_ms as u64);

    if forwarded.status != 200 {
        // Non-200 passthrough, no usage log, regardless of body shape (§4.6
        // step 4 edge case; spec line 122).
        return Ok(build_passthrough_response(forwarded.status, &forwarded.headers, forwarded.body));
    }

    deps.credentials.touch_last_used(credential.id).await.ok();

    // Step 5: meter (§4.6 step 5). A response whose declared encoding didn't
    // match its bytes (`forwarded.decoded == false`) is forwarded as-is but
    // never metered — there's no JSON to extract usage from (§A.7).
    let parsed: Option<serde_json::Value> = if forwarded.decoded {
        serde_json::from_slice(&forwarded.body).ok()
    } else {
        None
    };
    if let Some(json) = parsed {
        let (input_tokens, output_tokens) = adapter.extract_usage(&json);
        let model = adapter.extract_model(&json, &requested_model);
        if input_tokens > 0 || output_tokens > 0 {
            let cost = crate::pricing::price(provider, &model, input_tokens, output_tokens);
            let log = UsageLog::new(
                credential.tenant_id,
                provider,
                model.clone(),
                input_tokens,
                output_tokens,
                cost,
                latency_ms,
                false,
            );

            // Step 6: tag auto-attach, tied to the same post-metering step
            // that writes the usage log (§4.5, §4.6 step 6).
            let tags = deps.tags.auto_attach(credential.tenant_id, tag_header.as_deref()).await?;
            deps.usage_logs
                .create(&log, &tags.iter().map(|t| t.id).collect::<Vec<_>>())
                .await?;

            let content_type = forwarded
                .headers
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("application/json")
                .to_string();
            deps.cache
                .set(
                    key,
                    forwarded.body.clone(),
                    CachedMetadata {
                        provider,
                        model,
                        input_tokens,
                        output_tokens,
                        content_type,
                        status_code: forwarded.status,
                    },
                    deps.cache_ttl,
                )
                .await;

            // Step 7: fire-and-forget post-metering hooks (§4.9, §4.10).
            if let Some(hook) = &deps.on_metered {
                hook(credential.tenant_id);
            }
        }
    }

    // Step 8: forward response untouched.
    Ok(build_passthrough_response(forwarded.status, &forwarded.headers, forwarded.body))
}

#[allow(clippy::too_many_arguments)]
async fn handle_stream(
    deps: Arc<PipelineDeps>,
    adapter: &dyn providers::ProviderAdapter,
    credential: Credential,
    secret: &str,
    passthrough: &str,
    method: Method,
    inbound_headers: reqwest::header::HeaderMap,
    body: Vec<u8>,
    requested_model: String,
    tag_header: Option<String>,
) -> Result<Response> {
    let provider = credential.provider;
    let (head, upstream) = providers::stream(
        &deps.http_client,
        adapter,
        &deps.providers,
        secret,
        passthrough,
        method,
        inbound_headers,
        body,
        deps.upstream_timeout,
    )
    .await?;

    if head.status >= 400 {
        // Streaming upstream errors still arrive as a normal body (no SSE
        // framing on an error status); buffer and pass through untouched,
        // no usage log (§4.6 step 3 edge case).
        use futures::StreamExt;
        let collected: Vec<u8> = upstream
            .filter_map(|chunk| async move { chunk.ok() })
            .collect::<Vec<Bytes>>()
            .await
            .concat();
        return Ok(build_passthrough_response(head.status, &head.headers, collected));
    }

    deps.credentials.touch_last_used(credential.id).await.ok();

    // The tap forwards every chunk to the client untouched and, once the
    // upstream stream ends, hands the accumulated text off to a detached
    // task that extracts usage and writes the log — metering never delays a
    // byte reaching the client (§4.7).
    let tap = StreamTap::new(upstream).with_on_complete(move |sse_text| {
        tokio::spawn(meter_stream(deps, provider, credential, requested_model, sse_text, tag_header));
    });

    let response_headers = to_axum_headers(&head.headers);
    let status = StatusCode::from_u16(head.status).unwrap_or(StatusCode::OK);
    let mut builder = Response::builder().status(status);
    if let Some(h) = builder.headers_mut() {
        *h = response_headers;
    }
    Ok(builder.body(Body::from_stream(tap)).unwrap())
}

async fn meter_stream(
    deps: Arc<PipelineDeps>,
    provider: Provider,
    credential: Credential,
    requested_model: String,
    sse_text: String,
    tag_header: Option<String>,
) {
    let adapter = adapter_for(provider);
    let Some((input_tokens, output_tokens, model)) = adapter.extract_stream_usage(&sse_text) else {
        // No usage observed: no usage log is written at all (§4.6 step 3).
        return;
    };
    if input_tokens == 0 && output_tokens == 0 {
        return;
    }
    let model = if model.is_empty() { requested_model } else { model };
    let cost = crate::pricing::price(provider, &model, input_tokens, output_tokens);
    let log = UsageLog::new(credential.tenant_id, provider, model, input_tokens, output_tokens, cost, 0, false);
    crate::observability::metrics::record_provider_call(provider, false, 0);

    let tags = match deps.tags.auto_attach(credential.tenant_id, tag_header.as_deref()).await {
        Ok(tags) => tags,
        Err(e) => {
            tracing::warn!(error = %e, "tag auto-attach failed for streaming request");
            Vec::new()
        }
    };
    if let Err(e) = deps
        .usage_logs
        .create(&log, &tags.iter().map(|t| t.id).collect::<Vec<_>>())
        .await
    {
        tracing::warn!(error = %e, "failed to write usage log for streaming request");
        return;
    }
    if let Some(hook) = &deps.on_metered {
        hook(credential.tenant_id);
    }
}

fn build_passthrough_response(status: u16, headers: &reqwest::header::HeaderMap, body: Vec<u8>) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = Response::builder().status(status);
    if let Some(h) = builder.headers_mut() {
        *h = to_axum_headers(headers);
    }
    builder.body(Body::from(body)).unwrap()
}

fn response_headers_for_content_type(content_type: &str) -> reqwest::header::HeaderMap {
    let mut headers = reqwest::header::HeaderMap::new();
    if let Ok(value) = reqwest::header::HeaderValue::from_str(content_type) {
        headers.insert(reqwest::header::CONTENT_TYPE, value);
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bearer_proxy_key() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer llmlab_pk_abc".parse().unwrap());
        assert_eq!(extract_proxy_key(&headers).unwrap(), "llmlab_pk_abc");
    }

    #[test]
    fn extracts_x_api_key_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", "llmlab_pk_xyz".parse().unwrap());
        assert_eq!(extract_proxy_key(&headers).unwrap(), "llmlab_pk_xyz");
    }

    #[test]
    fn missing_proxy_key_is_an_auth_error() {
        let headers = HeaderMap::new();
        assert!(extract_proxy_key(&headers).is_err());
    }
}
