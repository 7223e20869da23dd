use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Url;
use serde_json::Value;

use crate::config::ProviderConfig;
use crate::domain::Provider;

use super::{parse_sse_events, ProviderAdapter};

/// Google Gemini adapter (§4.4). Auth: `key=<secret>` appended to the query
/// string (Google's convention, not a header). Usage fields:
/// `usageMetadata.promptTokenCount` / `usageMetadata.candidatesTokenCount`;
/// model from `modelVersion`. Streaming usage is carried on the final chunk.
pub struct GoogleAdapter;

#[async_trait]
impl ProviderAdapter for GoogleAdapter {
    fn provider(&self) -> Provider {
        Provider::Google
    }

    fn default_model(&self) -> &'static str {
        "gemini-1.5-pro"
    }

    fn prepare(&self, config: &ProviderConfig, secret: &str, path_and_query: &str, inbound_headers: &HeaderMap) -> (Url, HeaderMap) {
        let base_url = config.base_url_for(self.provider());
        let mut url = Url::parse(&format!("{base_url}{path_and_query}"))
            .unwrap_or_else(|_| Url::parse(base_url).expect("base url is valid"));
        url.query_pairs_mut().append_pair("key", secret);
        (url, inbound_headers.clone())
    }

    fn extract_usage(&self, json: &Value) -> (i64, i64) {
        let usage = &json["usageMetadata"];
        (
            usage["promptTokenCount"].as_i64().unwrap_or(0),
            usage["candidatesTokenCount"].as_i64().unwrap_or(0),
        )
    }

    fn extract_model(&self, json: &Value, fallback: &str) -> String {
        json["modelVersion"].as_str().map(str::to_string).unwrap_or_else(|| fallback.to_string())
    }

    fn extract_stream_usage(&self, sse_text: &str) -> Option<(i64, i64, String)> {
        for event in parse_sse_events(sse_text).iter().rev() {
            if !event["usageMetadata"].is_null() {
                let (input, output) = self.extract_usage(event);
                let model = self.extract_model(event, self.default_model());
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
        let adapter = GoogleAdapter;
        let body = json!({
            "modelVersion": "gemini-1.5-pro-002",
            "usageMetadata": {"promptTokenCount": 30, "candidatesTokenCount": 15},
        });
        assert_eq!(adapter.extract_usage(&body), (30, 15));
        assert_eq!(adapter.extract_model(&body, "fallback"), "gemini-1.5-pro-002");
    }

    #[test]
    fn api_key_appended_as_query_param() {
        let adapter = GoogleAdapter;
        let config = ProviderConfig::default();
        let (url, _) = adapter.prepare(
            &config,
            "my-secret",
            "/v1beta/models/gemini-1.5-pro:generateContent",
            &HeaderMap::new(),
        );
        assert!(url.query().unwrap().contains("key=my-secret"));
    }

    #[test]
    fn extracts_usage_from_final_streaming_chunk() {
        let adapter = GoogleAdapter;
        let sse = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"hi\"}]}}]}\n\n",
            "data: {\"modelVersion\":\"gemini-1.5-pro\",\"usageMetadata\":{\"promptTokenCount\":9,\"candidatesTokenCount\":3}}\n\n",
        );
        let (input, output, model) = adapter.extract_stream_usage(sse).unwrap();
        assert_eq!((input, output), (9, 3));
        assert_eq!(model, "gemini-1.5-pro");
    }
}
