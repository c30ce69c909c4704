use anyhow::{anyhow, Context};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::rate_limiters::RateLimiters;
use crate::server_config::{cfg, ModelConfig};
use crate::HttpClient;

/// Client for the generative-text backend (Gemini `generateContent`).
///
/// Generation parameters are fixed at construction from an explicit
/// `ModelConfig`; there is no process-wide generative state. The backend
/// is treated as unreliable throughout: callers must be prepared for
/// every `complete` call to fail.
#[derive(Debug, Clone)]
pub struct GenerativeClient {
    http_client: HttpClient,
    endpoint: String,
    api_key: String,
    model: ModelConfig,
}

impl GenerativeClient {
    /// Fails with `Configuration` when no API key is present; this is the
    /// only assistant error that reaches the caller.
    pub fn new(http_client: HttpClient) -> AppResult<GenerativeClient> {
        Self::with_options(http_client, cfg.api.endpoint.clone(), cfg.api.key.clone(), cfg.model.clone())
    }

    pub fn with_options(
        http_client: HttpClient,
        endpoint: String,
        api_key: String,
        model: ModelConfig,
    ) -> AppResult<GenerativeClient> {
        if api_key.trim().is_empty() {
            return Err(AppError::Configuration(
                "GEMINI_API_KEY is not configured".to_string(),
            ));
        }

        Ok(GenerativeClient {
            http_client,
            endpoint,
            api_key,
            model,
        })
    }

    /// One text completion. Empty or whitespace-only output is an error,
    /// the same as any transport failure; a remote 429 additionally trips
    /// the shared prompt backoff.
    pub async fn complete(&self, rate_limiters: &RateLimiters, prompt: &str) -> AppResult<String> {
        if rate_limiters.is_backing_off() {
            return Err(AppError::RateLimited);
        }
        rate_limiters.acquire_one().await;

        let url = format!("{}/{}:generateContent", self.endpoint, self.model.id);

        let resp = self
            .http_client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&json!({
                "contents": [
                    { "parts": [ { "text": prompt } ] }
                ],
                "generationConfig": {
                    "temperature": self.model.temperature,
                    "topK": self.model.top_k,
                    "topP": self.model.top_p,
                    "maxOutputTokens": self.model.max_output_tokens,
                }
            }))
            .send()
            .await
            .map_err(|e| AppError::Internal(e.into()))?;

        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            rate_limiters.trigger_backoff();
            return Err(AppError::RateLimited);
        }

        let resp = resp
            .json::<serde_json::Value>()
            .await
            .map_err(|e| AppError::Internal(e.into()))?;

        let parsed = serde_json::from_value::<GenerateResponseOrError>(resp.clone())
            .context(format!("Could not parse completion response: {}", resp))?;

        let parsed = match parsed {
            GenerateResponseOrError::Error(error) => {
                if error.error.code == 429 {
                    rate_limiters.trigger_backoff();
                    return Err(AppError::RateLimited);
                }
                return Err(anyhow!("Generative API error: {:?}", error.error).into());
            }
            GenerateResponseOrError::Response(parsed) => parsed,
        };

        let text = parsed
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(anyhow!("Empty response from generative backend").into());
        }

        Ok(text)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GeneratePart {
    pub text: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateContent {
    #[serde(default)]
    pub parts: Vec<GeneratePart>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateCandidate {
    pub content: Option<GenerateContent>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub candidates: Vec<GenerateCandidate>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateApiErrorDetail {
    pub code: u16,
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateApiError {
    pub error: GenerateApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GenerateResponseOrError {
    Response(GenerateResponse),
    Error(GenerateApiError),
}
