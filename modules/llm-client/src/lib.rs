mod types;

use anyhow::{anyhow, Result};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use tracing::debug;

use types::{ChatRequest, ChatResponse, WireMessage};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// The raw text of one completion, plus why generation stopped. Callers are
/// expected to parse the text defensively: the model is asked for JSON but
/// nothing guarantees it produced any.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub stop_reason: Option<String>,
}

impl Completion {
    /// True when the model hit the output token ceiling, which usually means
    /// the JSON payload was cut off mid-structure.
    pub fn truncated(&self) -> bool {
        self.stop_reason.as_deref() == Some("max_tokens")
    }
}

#[derive(Clone)]
pub struct LlmClient {
    api_key: String,
    model: String,
    http: reqwest::Client,
    base_url: String,
}

impl LlmClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            http: reqwest::Client::new(),
            base_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// Send one system+user completion and return the raw response text.
    pub async fn complete(&self, system: &str, user: &str) -> Result<Completion> {
        let request = ChatRequest::new(&self.model)
            .system(system)
            .message(WireMessage::user(user))
            .temperature(0.0);

        let url = format!("{}/messages", self.base_url);
        debug!(model = %self.model, "LLM completion request");

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(anyhow!("LLM API error ({}): {}", status, error_text));
        }

        let parsed: ChatResponse = response.json().await?;
        let stop_reason = parsed.stop_reason.clone();
        let text = parsed
            .text()
            .ok_or_else(|| anyhow!("No text content in LLM response"))?;

        Ok(Completion { text, stop_reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_new_stores_model() {
        let client = LlmClient::new("sk-ant-test", "claude-haiku-4-5-20251001");
        assert_eq!(client.model(), "claude-haiku-4-5-20251001");
    }

    #[test]
    fn client_with_base_url() {
        let client = LlmClient::new("sk-ant-test", "m").with_base_url("http://localhost:9999");
        assert_eq!(client.base_url, "http://localhost:9999");
    }

    #[test]
    fn truncated_only_on_max_tokens() {
        let c = Completion {
            text: "{".into(),
            stop_reason: Some("max_tokens".into()),
        };
        assert!(c.truncated());
        let c = Completion {
            text: "{}".into(),
            stop_reason: Some("end_turn".into()),
        };
        assert!(!c.truncated());
    }
}
