use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Url;
use serde_json::Value;

use crate::config::ProviderConfig;
use crate::domain::Provider;

use super::{parse_sse_events, ProviderAdapter};

/// Anthropic adapter (§4.4). Auth: `x-api-key: <secret>`, preserving or
/// defaulting `anthropic-version`. Usage fields: `usage.input_tokens` /
/// `usage.output_tokens`; model from `model`. Streaming usage is split
/// across two events: `message_start.message.usage.input_tokens` and
/// `message_delta.usage.output_tokens`.
pub struct AnthropicAdapter;

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    fn default_model(&self) -> &'static str {
        "claude-3-5-sonnet-20241022"
    }

    fn prepare(&self, config: &ProviderConfig, secret: &str, path_and_query: &str, inbound_headers: &HeaderMap) -> (Url, HeaderMap) {
        let base_url = config.base_url_for(self.provider());
        let url = Url::parse(&format!("{base_url}{path_and_query}"))
            .unwrap_or_else(|_| Url::parse(base_url).expect("base url is valid"));
        let mut headers = inbound_headers.clone();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(secret).expect("secret is valid header value"),
        );
        if !headers.contains_key("anthropic-version") {
            let version = HeaderValue::from_str(&config.anthropic_version)
                .unwrap_or_else(|_| HeaderValue::from_static("2023-06-01"));
            headers.insert("anthropic-version", version);
        }
        (url, headers)
    }

    fn extract_usage(&self, json: &Value) -> (i64, i64) {
        let usage = &json["usage"];
        (
            usage["input_tokens"].as_i64().unwrap_or(0),
            usage["output_tokens"].as_i64().unwrap_or(0),
        )
    }

    fn extract_model(&self, json: &Value, fallback: &str) -> String {
        json["model"].as_str().map(str::to_string).unwrap_or_else(|| fallback.to_string())
    }

    fn extract_stream_usage(&self, sse_text: &str) -> Option<(i64, i64, String)> {
        let events = parse_sse_events(sse_text);
        let mut input_tokens = None;
        let mut output_tokens = None;
        let mut model = None;

        for event in &events {
            if event["type"] == "message_start" {
                let message = &event["message"];
                if let Some(tokens) = message["usage"]["input_tokens"].as_i64() {
                    input_tokens = Some(tokens);
                }
                if let Some(m) = message["model"].as_str() {
                    model = Some(m.to_string());
                }
            }
            if event["type"] == "message_delta" {
                if let Some(tokens) = event["usage"]["output_tokens"].as_i64() {
                    output_tokens = Some(tokens);
                }
            }
        }

        match (input_tokens, output_tokens) {
            (None, None) => None,
            (input, output) => Some((
                input.unwrap_or(0),
                output.unwrap_or(0),
                model.unwrap_or_else(|| self.default_model().to_string()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_unary_usage() {
        let adapter = AnthropicAdapter;
        let body = json!({"model": "claude-3-5-sonnet-20241022", "usage": {"input_tokens": 20, "output_tokens": 8}});
        assert_eq!(adapter.extract_usage(&body), (20, 8));
    }

    fn default_headers() -> HeaderMap {
        HeaderMap::new()
    }

    #[test]
    fn injects_default_version_when_absent() {
        let adapter = AnthropicAdapter;
        let config = ProviderConfig::default();
        let (_, headers) = adapter.prepare(&config, "sk-test", "/v1/messages", &default_headers());
        assert_eq!(
            headers.get("anthropic-version").unwrap().to_str().unwrap(),
            config.anthropic_version
        );
    }

    #[test]
    fn preserves_inbound_version() {
        let adapter = AnthropicAdapter;
        let config = ProviderConfig::default();
        let mut headers = default_headers();
        headers.insert("anthropic-version", HeaderValue::from_static("2024-01-01"));
        let (_, out) = adapter.prepare(&config, "sk-test", "/v1/messages", &headers);
        assert_eq!(out.get("anthropic-version").unwrap().to_str().unwrap(), "2024-01-01");
    }

    #[test]
    fn uses_configured_version_override() {
        let adapter = AnthropicAdapter;
        let mut config = ProviderConfig::default();
        config.anthropic_version = "2099-01-01".to_string();
        let (_, headers) = adapter.prepare(&config, "sk-test", "/v1/messages", &default_headers());
        assert_eq!(headers.get("anthropic-version").unwrap().to_str().unwrap(), "2099-01-01");
    }

    #[test]
    fn scenario_3_streaming_usage_split_across_events() {
        let adapter = AnthropicAdapter;
        let sse = concat!(
            "data: {\"type\":\"message_start\",\"message\":{\"model\":\"claude-3-5-sonnet-20241022\",\"usage\":{\"input_tokens\":20}}}\n\n",
            "data: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\"hi\"}}\n\n",
            "data: {\"type\":\"message_delta\",\"usage\":{\"output_tokens\":8}}\n\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        );
        let (input, output, model) = adapter.extract_stream_usage(sse).unwrap();
        assert_eq!((input, output), (20, 8));
        assert_eq!(model, "claude-3-5-sonnet-20241022");
    }
}
