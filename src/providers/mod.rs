//! Per-provider adapters (§4.4): upstream base URL, credential-injection
//! scheme, and usage/model extraction for OpenAI, Anthropic, and Google.
//!
//! The HTTP transport (buffered forward, streaming forward) is implemented
//! once in this module against the [`ProviderAdapter`] trait rather than
//! duplicated per provider — only the provider-specific knowledge (auth
//! injection, field names) varies.

pub mod anthropic;
pub mod decode;
pub mod google;
pub mod openai;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};
use serde_json::Value;

use crate::config::ProviderConfig;
use crate::domain::{LlmLabError, Provider, Result};

pub use anthropic::AnthropicAdapter;
pub use google::GoogleAdapter;
pub use openai::OpenAiAdapter;

/// Inbound request headers stripped before forwarding upstream (§4.4).
pub const STRIP_INBOUND: &[&str] = &["host", "authorization", "x-api-key", "content-length"];

/// Upstream response headers stripped before returning to the caller (§4.4);
/// the body may have been re-materialized (decompressed / replayed from
/// cache), so any stale framing headers would be wrong.
pub const STRIP_OUTBOUND: &[&str] = &["content-encoding", "transfer-encoding", "content-length"];

pub fn strip_headers(headers: &mut HeaderMap, names: &[&str]) {
    for name in names {
        if let Ok(header_name) = HeaderName::try_from(*name) {
            headers.remove(header_name);
        }
    }
}

/// Per-provider knowledge needed to forward a request and meter the response
/// (§4.4). Implementors never perform the HTTP call themselves — that's
/// [`forward`]/[`stream`] below, shared across providers.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;
    fn default_model(&self) -> &'static str;

    /// Builds the outbound URL and headers for a call to `path_and_query`
    /// (the passthrough suffix of `/api/v1/proxy/{provider}/{...}`), resolving
    /// the base URL (and, for Anthropic, the default API version) from
    /// `config` rather than a compiled-in constant (§9's Open Question on
    /// upstream URLs; see `DESIGN.md`) — injecting the tenant's real secret
    /// the way this provider expects it.
    fn prepare(&self, config: &ProviderConfig, secret: &str, path_and_query: &str, inbound_headers: &HeaderMap) -> (Url, HeaderMap);

    /// `usage.prompt_tokens`/`usage.input_tokens`/`usageMetadata...` per §4.4's table.
    fn extract_usage(&self, json: &Value) -> (i64, i64);

    /// `model`/`modelVersion`, falling back to the request's model if absent.
    fn extract_model(&self, json: &Value, fallback: &str) -> String;

    /// Walks accumulated SSE text in reverse to find the final usage-carrying
    /// event(s) for this provider (§4.4 "Streaming usage" column).
    fn extract_stream_usage(&self, sse_text: &str) -> Option<(i64, i64, String)>;
}

/// Returns the adapter for a given provider.
pub fn adapter_for(provider: Provider) -> Box<dyn ProviderAdapter> {
    match provider {
        Provider::Openai => Box::new(OpenAiAdapter),
        Provider::Anthropic => Box::new(AnthropicAdapter),
        Provider::Google => Box::new(GoogleAdapter),
    }
}

/// Result of a buffered unary forward (§4.4 `Forward`).
pub struct ForwardResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    /// `false` when the upstream's declared `Content-Encoding` didn't match
    /// its actual bytes — `body` is the raw, still-encoded payload in that
    /// case. The pipeline forwards it untouched but skips usage extraction
    /// (§A.7).
    pub decoded: bool,
}

/// Performs a buffered, unary upstream call. Headers in [`STRIP_INBOUND`] are
/// dropped before sending; headers in [`STRIP_OUTBOUND`] are dropped from the
/// response.
pub async fn forward(
    client: &reqwest::Client,
    adapter: &dyn ProviderAdapter,
    config: &ProviderConfig,
    secret: &str,
    path_and_query: &str,
    method: Method,
    mut inbound_headers: HeaderMap,
    body: Vec<u8>,
    timeout: std::time::Duration,
) -> Result<ForwardResponse> {
    strip_headers(&mut inbound_headers, STRIP_INBOUND);
    let (url, headers) = adapter.prepare(config, secret, path_and_query, &inbound_headers);

    let response = client
        .request(method, url)
        .headers(headers)
        .timeout(timeout)
        .body(body)
        .send()
        .await
        .map_err(|e| LlmLabError::transport(e.to_string()))?;

    let status = response.status().as_u16();
    let mut headers = response.headers().clone();
    let content_encoding = headers
        .get("content-encoding")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let raw_body = response
        .bytes()
        .await
        .map_err(|e| LlmLabError::transport(e.to_string()))?;
    let (body, decoded) = decode::decode_body(content_encoding.as_deref(), &raw_body);
    strip_headers(&mut headers, STRIP_OUTBOUND);

    Ok(ForwardResponse { status, headers, body, decoded })
}

/// The first item a streaming call yields: the upstream's status line and
/// headers, available before any body bytes arrive (§4.4 `Stream`).
pub struct StreamHead {
    pub status: u16,
    pub headers: HeaderMap,
}

/// Opens an upstream streaming call. Returns the status/header frame
/// immediately, plus a lazy byte stream the caller drives independently —
/// this preserves back-pressure end-to-end (§4.7): nothing here buffers the
/// full body.
pub async fn stream(
    client: &reqwest::Client,
    adapter: &dyn ProviderAdapter,
    config: &ProviderConfig,
    secret: &str,
    path_and_query: &str,
    method: Method,
    mut inbound_headers: HeaderMap,
    body: Vec<u8>,
    timeout: std::time::Duration,
) -> Result<(StreamHead, impl Stream<Item = reqwest::Result<Bytes>>)> {
    strip_headers(&mut inbound_headers, STRIP_INBOUND);
    let (url, headers) = adapter.prepare(config, secret, path_and_query, &inbound_headers);

    let response = client
        .request(method, url)
        .headers(headers)
        .timeout(timeout)
        .body(body)
        .send()
        .await
        .map_err(|e| LlmLabError::transport(e.to_string()))?;

    let mut response_headers = response.headers().clone();
    strip_headers(&mut response_headers, STRIP_OUTBOUND);
    let head = StreamHead {
        status: response.status().as_u16(),
        headers: response_headers,
    };

    Ok((head, response.bytes_stream()))
}

/// Converts an axum/http `HeaderMap` (used on the inbound side) into a
/// reqwest `HeaderMap` (used for the outbound call) — the two crates keep
/// separate `http` re-exports in this dependency graph.
pub fn to_reqwest_headers(headers: &axum::http::HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers.iter() {
        if let (Ok(n), Ok(v)) = (
            HeaderName::try_from(name.as_str()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            out.append(n, v);
        }
    }
    out
}

/// The reverse conversion, used when returning the upstream's response
/// headers to the axum-facing caller.
pub fn to_axum_headers(headers: &HeaderMap) -> axum::http::HeaderMap {
    let mut out = axum::http::HeaderMap::new();
    for (name, value) in headers.iter() {
        if let (Ok(n), Ok(v)) = (
            axum::http::HeaderName::try_from(name.as_str()),
            axum::http::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            out.append(n, v);
        }
    }
    out
}

/// Splits accumulated SSE text into parsed `data: {...}` JSON events, in the
/// order they appeared. Non-JSON events (e.g. `data: [DONE]`) and blank
/// payloads are skipped. Adapters walk the result in reverse to find the
/// final usage-carrying event (§4.4).
pub fn parse_sse_events(text: &str) -> Vec<Value> {
    text.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .filter(|payload| !payload.is_empty() && *payload != "[DONE]")
        .filter_map(|payload| serde_json::from_str::<Value>(payload).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_sse_events_skips_done_and_blank() {
        let text = "data: {\"a\":1}\n\ndata: [DONE]\ndata:{\"b\":2}\n";
        let events = parse_sse_events(text);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["a"], 1);
        assert_eq!(events[1]["b"], 2);
    }

    #[test]
    fn strip_headers_removes_named_entries() {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("example.com"));
        headers.insert("authorization", HeaderValue::from_static("Bearer x"));
        headers.insert("x-keep", HeaderValue::from_static("yes"));
        strip_headers(&mut headers, STRIP_INBOUND);
        assert!(!headers.contains_key("host"));
        assert!(!headers.contains_key("authorization"));
        assert!(headers.contains_key("x-keep"));
    }

    #[test]
    fn adapter_for_returns_matching_provider() {
        assert_eq!(adapter_for(Provider::Openai).provider(), Provider::Openai);
        assert_eq!(adapter_for(Provider::Anthropic).provider(), Provider::Anthropic);
        assert_eq!(adapter_for(Provider::Google).provider(), Provider::Google);
    }
}
