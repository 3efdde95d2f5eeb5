//! Per-host request pacing for polite fetching of monitored sources.
//!
//! Wraps any [`Fetcher`] with a minimum inter-request delay per remote
//! host. Sources on different hosts are never delayed against each other.
//! The pacer hands out next-allowed slots under a short lock, so
//! concurrent fetches of same-host sources queue up in arrival order
//! instead of racing for the same slot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use url::Url;

use crate::error::MonitorError;
use crate::traits::Fetcher;

/// A [`Fetcher`] wrapper enforcing a per-host minimum delay.
#[derive(Clone)]
pub struct PacedFetcher<F> {
    inner: F,
    min_delay: Duration,
    /// Next allowed request instant per host key.
    next_allowed: Arc<Mutex<HashMap<String, Instant>>>,
}

impl<F: Fetcher> PacedFetcher<F> {
    pub fn new(inner: F, min_delay: Duration) -> Self {
        Self {
            inner,
            min_delay,
            next_allowed: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Host key for pacing (scheme + host + port).
    fn host_key(url_str: &str) -> Option<String> {
        let url = Url::parse(url_str).ok()?;
        let host = url.host_str()?;
        let port = url
            .port_or_known_default()
            .map(|p| format!(":{p}"))
            .unwrap_or_default();
        Some(format!("{}://{}{}", url.scheme(), host, port))
    }

    /// Claim the next slot for this host, then sleep until it arrives.
    async fn wait_for_host(&self, host: &str) {
        let slot = {
            let mut map = self.next_allowed.lock().await;
            let now = Instant::now();
            let slot = map.get(host).copied().filter(|&at| at > now).unwrap_or(now);
            map.insert(host.to_string(), slot + self.min_delay);
            slot
        };
        let wait = slot.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            tracing::debug!(host = %host, wait_ms = wait.as_millis() as u64, "Pacing request");
            tokio::time::sleep_until(slot).await;
        }
    }
}

impl<F: Fetcher> Fetcher for PacedFetcher<F> {
    async fn fetch(&self, url: &str) -> Result<String, MonitorError> {
        if let Some(host) = Self::host_key(url) {
            self.wait_for_host(&host).await;
        }
        self.inner.fetch(url).await
    }
}
