//! Per-request `X-Request-Id` middleware (§A.1): generates one if the caller
//! didn't send one, attaches it to the tracing span, and echoes it back.
//! Also records the per-request Prometheus metrics (§A.5).

use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;

use super::metrics::record_request;
use super::tracing::RequestId;

const HEADER_NAME: &str = "x-request-id";

pub async fn request_id(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(HEADER_NAME)
        .and_then(|v| v.to_str().ok())
        .map(|s| RequestId::from_string(s.to_string()))
        .unwrap_or_default();

    request.extensions_mut().insert(request_id.clone());

    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let start = Instant::now();
    let span = tracing::info_span!("request", request_id = %request_id);
    let mut response = next.run(request).instrument(span).await;
    let latency_ms = start.elapsed().as_millis() as u64;
    record_request(&route, response.status().as_u16(), latency_ms);

    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        response.headers_mut().insert(HEADER_NAME, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_name_is_lowercase() {
        assert_eq!(HEADER_NAME, "x-request-id");
    }
}
