use std::time::Duration;

use argus_core::error::MonitorError;
use argus_core::traits::Extractor;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_MAX_TOKENS: u32 = 4000;
const DEFAULT_TEMPERATURE: f32 = 0.1;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Anthropic Messages API client for structured compliance extraction.
///
/// Sends a change's diff with source context and expects a single JSON
/// object back. The prompt pins the field set; [`parse_response`] strips
/// the markdown code fences the model sometimes wraps around it.
#[derive(Clone)]
pub struct ClaudeExtractor {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    timeout_secs: u64,
}

impl ClaudeExtractor {
    pub fn new(api_key: &str) -> Result<Self, MonitorError> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| MonitorError::Network(e.to_string()))?;

        Ok(Self {
            client,
            api_url: DEFAULT_API_URL.to_string(),
            api_key: api_key.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Override the endpoint, e.g. for a proxy.
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }
}

// ---- Anthropic API types ----

#[derive(Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl Extractor for ClaudeExtractor {
    async fn extract(
        &self,
        diff: &str,
        source_name: &str,
        source_url: &str,
    ) -> Result<serde_json::Value, MonitorError> {
        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            messages: vec![Message {
                role: "user".to_string(),
                content: analysis_prompt(diff, source_name, source_url),
            }],
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MonitorError::Timeout(self.timeout_secs)
                } else if e.is_connect() {
                    MonitorError::Network(format!("connection failed: {e}"))
                } else {
                    MonitorError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let status_code = status.as_u16();
            if status_code == 429 {
                return Err(MonitorError::RateLimited);
            }

            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| format!("HTTP {status_code}: {body}"));

            return Err(MonitorError::Extraction {
                message,
                status_code,
                retryable: status_code >= 500,
            });
        }

        let parsed: MessagesResponse = response.json().await.map_err(|e| {
            MonitorError::Extraction {
                message: format!("failed to parse API response: {e}"),
                status_code: 200,
                retryable: false,
            }
        })?;

        let text = parsed
            .content
            .iter()
            .find(|block| block.block_type == "text")
            .map(|block| block.text.as_str())
            .ok_or_else(|| MonitorError::Extraction {
                message: "empty response from extraction model".into(),
                status_code: 200,
                retryable: false,
            })?;

        parse_response(text)
    }
}

fn analysis_prompt(diff: &str, source_name: &str, source_url: &str) -> String {
    format!(
        r#"You are a compliance expert analyzing changes to payment industry documentation.

Source: {source_name}
URL: {source_url}

Below is a diff showing changes detected on this page. Analyze this change and extract compliance-relevant information.

DIFF:
{diff}

Extract the following information and return ONLY a valid JSON object (no markdown, no explanation):

{{
  "title": "Brief title of the compliance change",
  "summary": "2-3 sentence summary of what changed and why it matters",
  "deadline": "YYYY-MM-DD format if deadline mentioned, or null",
  "deadline_estimated": true or false,
  "impact_level": "high|medium|low",
  "mccs": ["list", "of", "MCC", "codes", "if", "mentioned"],
  "regions": ["list", "of", "regions", "like", "Global", "MENA", "Europe"],
  "transaction_types": ["AFT", "OCT", "etc"],
  "technical_requirements": ["list", "of", "technical", "requirements"],
  "keywords": ["relevant", "keywords"]
}}

Guidelines:
- If no deadline is mentioned, use null
- impact_level: "high" if requires code changes, "medium" if requires process changes, "low" if informational
- Include all relevant MCCs, regions, transaction types
- Extract 5-10 relevant keywords
- Be concise and technical

Return ONLY the JSON object, nothing else."#
    )
}

/// Parse the model's reply into JSON, stripping markdown code fences it
/// sometimes adds despite the prompt.
fn parse_response(text: &str) -> Result<serde_json::Value, MonitorError> {
    let mut trimmed = text.trim();

    if let Some(stripped) = trimmed.strip_prefix("```") {
        trimmed = stripped.strip_prefix("json").unwrap_or(stripped);
        trimmed = trimmed.strip_suffix("```").unwrap_or(trimmed);
        trimmed = trimmed.trim();
    }

    serde_json::from_str(trimmed).map_err(|e| MonitorError::Extraction {
        message: format!("extraction model returned invalid JSON: {e}"),
        status_code: 200,
        retryable: false,
    })
}
