//! Shared webhook dispatcher (§4.9, §4.10): POST a JSON body to a tenant's
//! registered URL with a short timeout. Failures are logged and swallowed —
//! a failing webhook must never surface back to the originating request
//! (§5 "Webhook fan-out").

use std::time::Duration;

use serde::Serialize;
use tracing::warn;

/// Fires a single webhook POST. Each dispatch owns its own short-lived
/// client per §5, rather than sharing one across the process.
pub async fn dispatch<T: Serialize + Sync>(url: &str, payload: &T, timeout: Duration) {
    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "failed to build webhook client");
            return;
        }
    };

    match client.post(url).json(payload).send().await {
        Ok(response) if !response.status().is_success() => {
            warn!(url, status = %response.status(), "webhook dispatch returned non-2xx");
        }
        Err(e) => {
            warn!(url, error = %e, "webhook dispatch failed");
        }
        _ => {}
    }
}
