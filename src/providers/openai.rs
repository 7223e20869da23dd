use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Url;
use serde_json::Value;

use crate::config::ProviderConfig;
use crate::domain::Provider;

use super::{parse_sse_events, ProviderAdapter};

/// OpenAI adapter (§4.4). Auth: `Authorization: Bearer <secret>`. Usage
/// fields: `usage.prompt_tokens` / `usage.completion_tokens`; model from
/// `model`. Streaming usage arrives on the last SSE event's `usage` field,
/// alongside `model` on the same event.
pub struct OpenAiAdapter;

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn provider(&self) -> Provider {
        Provider::Openai
    }

    fn default_model(&self) -> &'static str {
        "gpt-4o"
    }

    fn prepare(&self, config: &ProviderConfig, secret: &str, path_and_query: &str, inbound_headers: &HeaderMap) -> (Url, HeaderMap) {
        let base_url = config.base_url_for(self.provider());
        let url = Url::parse(&format!("{base_url}{path_and_query}"))
            .unwrap_or_else(|_| Url::parse(base_url).expect("base url is valid"));
        let mut headers = inbound_headers.clone();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {secret}")).expect("secret is valid header value"),
        );
        (url, headers)
    }

    fn extract_usage(&self, json: &Value) -> (i64, i64) {
        let usage = &json["usage"];
        (
            usage["prompt_tokens"].as_i64().unwrap_or(0),
            usage["completion_tokens"].as_i64().unwrap_or(0),
        )
    }

    fn extract_model(&self, json: &Value, fallback: &str) -> String {
        json["model"].as_str().map(str::to_string).unwrap_or_else(|| fallback.to_string())
    }

    fn extract_stream_usage(&self, sse_text: &str) -> Option<(i64, i64, String)> {
        for event in parse_sse_events(sse_text).iter().rev() {
            if !event["usage"].is_null() {
                let (input, output) = self.extract_usage(event);
                let model = event["model"].as_str().unwrap_or(self.default_model()).to_string();
                return Some((input, output, model));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_unary_usage() {
        let adapter = OpenAiAdapter;
        let body = json!({"model": "gpt-4o", "usage": {"prompt_tokens": 1000, "completion_tokens": 500}});
        assert_eq!(adapter.extract_usage(&body), (1000, 500));
        assert_eq!(adapter.extract_model(&body, "fallback"), "gpt-4o");
    }

    #[test]
    fn missing_model_falls_back() {
        let adapter = OpenAiAdapter;
        assert_eq!(adapter.extract_model(&json!({}), "gpt-4o-mini"), "gpt-4o-mini");
    }

    #[test]
    fn extracts_usage_from_last_streaming_event() {
        let adapter = OpenAiAdapter;
        let sse = concat!(
            "data: {\"model\":\"gpt-4o\",\"choices\":[{\"delta\":{}}]}\n\n",
            "data: {\"model\":\"gpt-4o\",\"usage\":{\"prompt_tokens\":12,\"completion_tokens\":7}}\n\n",
            "data: [DONE]\n",
        );
        let (input, output, model) = adapter.extract_stream_usage(sse).unwrap();
        assert_eq!((input, output), (12, 7));
        assert_eq!(model, "gpt-4o");
    }
}
