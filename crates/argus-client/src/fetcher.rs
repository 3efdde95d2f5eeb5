use std::time::Duration;

use argus_core::error::MonitorError;
use argus_core::traits::Fetcher;
use reqwest::Client;
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = "Argus/0.2 (compliance monitor)";

/// HTTP fetcher for monitored documentation pages.
///
/// Sources are operator-curated configuration, not user input, so the
/// guard here is scheme and host validation only. Non-2xx responses are
/// fetch errors: a 404 on a page that used to exist is a signal, not
/// content.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout_secs: u64,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, MonitorError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, MonitorError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| MonitorError::Fetch(e.to_string()))?;

        Ok(Self {
            client,
            timeout_secs: timeout.as_secs(),
        })
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, MonitorError> {
        validate_url(url)?;

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                MonitorError::Timeout(self.timeout_secs)
            } else if e.is_connect() {
                MonitorError::Network(format!("connection failed: {e}"))
            } else {
                MonitorError::Fetch(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(MonitorError::Fetch(format!(
                "HTTP {} for {}",
                status.as_u16(),
                url
            )));
        }

        response
            .text()
            .await
            .map_err(|e| MonitorError::Fetch(format!("failed to read response body: {e}")))
    }
}

fn validate_url(url: &str) -> Result<(), MonitorError> {
    let parsed =
        Url::parse(url).map_err(|e| MonitorError::Fetch(format!("invalid URL {url}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(MonitorError::Fetch(format!(
                "URL scheme '{scheme}' is not allowed (only http/https)"
            )));
        }
    }
    if parsed.host_str().is_none() {
        return Err(MonitorError::Fetch(format!("URL has no host: {url}")));
    }
    Ok(())
}
