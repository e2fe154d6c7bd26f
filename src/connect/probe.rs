//! Connection probe
//!
//! One lightweight reachability check against a candidate base URL. A probe
//! never returns an error: every failure mode collapses into a
//! `ConnectionResult` with `success = false` and infinite latency, so the
//! resolver's fastest-success comparison stays trivial.

use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::trace;

use crate::models::ConnectionResult;

/// Seam between the resolver and the network, so races can be tested
/// against scripted probes
#[async_trait]
pub trait Prober: Send + Sync {
    /// Check whether `base_url` answers within `timeout`
    async fn probe(&self, base_url: &str, token: &str, timeout: Duration) -> ConnectionResult;
}

/// Real prober: a cheap authenticated GET against the server's identity
/// endpoint
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new() -> Self {
        Self {
            // Per-probe timeouts are passed on each request; the client
            // itself carries none
            client: reqwest::Client::builder().build().unwrap_or_default(),
        }
    }
}

impl Default for HttpProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, base_url: &str, token: &str, timeout: Duration) -> ConnectionResult {
        let url = format!("{}/identity", base_url.trim_end_matches('/'));
        let started = Instant::now();

        let response = self
            .client
            .get(&url)
            .header("X-Plex-Token", token)
            .timeout(timeout)
            .send()
            .await;

        match response {
            Ok(resp) => {
                let status = resp.status();
                // 401 means the path works but this token is rejected by the
                // endpoint, which is still proof of reachability
                if status.is_success() || status == reqwest::StatusCode::UNAUTHORIZED {
                    let latency = started.elapsed();
                    trace!(%base_url, ms = latency.as_millis() as u64, "probe ok");
                    ConnectionResult::ok(base_url, latency)
                } else {
                    trace!(%base_url, %status, "probe rejected");
                    ConnectionResult::failed(base_url, format!("HTTP {}", status.as_u16()))
                }
            }
            Err(e) if e.is_timeout() => ConnectionResult::failed(base_url, "timeout"),
            Err(e) if e.is_connect() => ConnectionResult::failed(base_url, "connect error"),
            Err(e) => ConnectionResult::failed(base_url, e.to_string()),
        }
    }
}
