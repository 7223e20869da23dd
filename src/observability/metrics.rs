//! Prometheus metrics (§A.5). Uses the `metrics` facade with
//! `metrics-exporter-prometheus` as the recorder/exporter, the same pairing
//! the teacher's `Cargo.toml` already declares.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use crate::domain::Provider;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Installs the global Prometheus recorder on first call and returns a
/// handle whose `render()` backs the `/metrics` endpoint. Idempotent: the
/// recorder can only be installed once per process, but `AppState::build`
/// may run many times in a test binary, so later calls just hand back the
/// handle from the first install.
pub fn install() -> PrometheusHandle {
    HANDLE
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install prometheus recorder")
        })
        .clone()
}

pub fn record_request(route: &str, status: u16, latency_ms: u64) {
    counter!("llmlab_http_requests_total", "route" => route, "status" => status.to_string()).increment(1);
    histogram!("llmlab_http_request_duration_ms", "route" => route).record(latency_ms as f64);
}

pub fn record_provider_call(provider: Provider, cache_hit: bool, latency_ms: u64) {
    let provider = provider.as_str();
    counter!(
        "llmlab_provider_requests_total",
        "provider" => provider,
        "cache_hit" => cache_hit.to_string()
    )
    .increment(1);
    if !cache_hit {
        histogram!("llmlab_provider_latency_ms", "provider" => provider).record(latency_ms as f64);
    }
}

pub fn record_cache_hit_rate(hit_rate: f64) {
    gauge!("llmlab_cache_hit_rate").set(hit_rate);
}

pub fn record_fired_alert_set_size(kind: &'static str, size: usize) {
    gauge!("llmlab_fired_alert_set_size", "kind" => kind).set(size as f64);
}
