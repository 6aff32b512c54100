use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::error::InsightError;
use crate::insight::{InsightKind, InsightService};

pub const DEFAULT_API_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Blocking client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    client: Client,
    api_key: String,
    api_url: String,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(api_key: String, api_url: String, timeout: Duration) -> Result<Self, InsightError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InsightError::Transport(e.to_string()))?;
        Ok(Self { client, api_key, api_url, timeout })
    }

    /// Create a client from environment variables.
    ///
    /// Required: GEMINI_API_KEY
    /// Optional: GEMINI_API_URL, GEMINI_TIMEOUT_SECS
    pub fn from_env() -> Result<Self, InsightError> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or(InsightError::Unavailable)?;
        let api_url = std::env::var("GEMINI_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into());
        let secs = std::env::var("GEMINI_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Self::new(api_key, api_url, Duration::from_secs(secs))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl InsightService for GeminiClient {
    fn complete(&self, kind: InsightKind, prompt: &str) -> Result<String, InsightError> {
        let request = GenerateRequest::new(kind, prompt);
        let response = self
            .client
            .post(&self.api_url)
            .query(&[("key", &self.api_key)])
            .json(&request)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    InsightError::Timeout
                } else {
                    InsightError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(InsightError::Status(status.as_u16()));
        }
        let body = response.text().map_err(|e| InsightError::Transport(e.to_string()))?;
        parse_response(&body)
    }
}

/// Extract the reply text from a response body.
pub fn parse_response(body: &str) -> Result<String, InsightError> {
    let parsed: GenerateResponse =
        serde_json::from_str(body).map_err(|e| InsightError::Transport(e.to_string()))?;
    if let Some(err) = parsed.error {
        return Err(InsightError::ErrorPayload(
            err.message.unwrap_or_else(|| "unspecified error".into()),
        ));
    }
    parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .filter(|t| !t.trim().is_empty())
        .ok_or(InsightError::EmptyResponse)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

impl GenerateRequest {
    fn new(kind: InsightKind, prompt: &str) -> Self {
        Self {
            contents: vec![Content { parts: vec![Part { text: Some(prompt.to_string()) }] }],
            generation_config: GenerationConfig {
                temperature: 0.7,
                top_k: 40,
                top_p: 0.95,
                max_output_tokens: kind.max_output_tokens(),
            },
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    top_k: u32,
    top_p: f64,
    max_output_tokens: u32,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct ApiError {
    message: Option<String>,
}
