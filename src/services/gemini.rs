use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::config::Config;
use crate::error::{AnalysisError, Result};

/// Sends a prompt to the reasoning model and returns its raw text answer.
#[async_trait]
pub trait AiClient: Send + Sync {
    async fn analyze(&self, prompt: &str) -> Result<String>;
}

// ── generateContent response ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

// ── GeminiClient ─────────────────────────────────────────────────────────────

pub struct GeminiClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.ai_timeout)
            .connect_timeout(config.ai_connect_timeout)
            .build()?;

        Ok(Self {
            client,
            api_key: config.gemini_api_key.clone(),
            base_url: config.gemini_api_url.trim_end_matches('/').to_string(),
            model: config.gemini_model.clone(),
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl AiClient for GeminiClient {
    async fn analyze(&self, prompt: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(AnalysisError::ConfigMissing("GEMINI_API_KEY"))?;

        let url = format!("{}/{}:generateContent", self.base_url, self.model);
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "tools": [{ "google_search": {} }],
        });

        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalysisError::TransientAi(e.without_url().to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, text));
        }

        let data: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::TransientAi(e.without_url().to_string()))?;

        first_text(data).ok_or_else(|| AnalysisError::TransientAi("Gemini returned no candidates".to_string()))
    }
}

/// Rate limits, request timeouts and server faults may clear on another
/// attempt. Any other client error will not.
fn status_error(status: StatusCode, body: String) -> AnalysisError {
    let message = format!("Gemini API error {}: {}", status, body);
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::REQUEST_TIMEOUT {
        AnalysisError::TransientAi(message)
    } else {
        AnalysisError::RejectedAi(message)
    }
}

fn first_text(response: GenerateContentResponse) -> Option<String> {
    response
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .next()?
        .text
}
