//! HTTP inference client (Hugging Face style text-generation endpoint).

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use super::{LlmConfig, TextGenerator};
use crate::error::LlmError;

const PROVIDER: &str = "http";
const MAX_NEW_TOKENS: u32 = 500;
const TEMPERATURE: f32 = 0.7;

#[derive(Debug, Deserialize)]
struct GeneratedText {
    generated_text: String,
}

/// Endpoints answer either with a list of generations or a single object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GenerationResponse {
    Many(Vec<GeneratedText>),
    One(GeneratedText),
}

impl GenerationResponse {
    fn into_text(self) -> Option<String> {
        match self {
            Self::Many(items) => items.into_iter().next().map(|g| g.generated_text),
            Self::One(item) => Some(item.generated_text),
        }
    }
}

/// POSTs `{"inputs": prompt, "parameters": {...}}` to a fixed URL.
pub struct HttpGenerator {
    client: reqwest::Client,
    api_url: String,
    api_token: Option<SecretString>,
}

impl HttpGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.into(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_token: config.api_token.clone(),
        })
    }

    fn request_body(prompt: &str) -> serde_json::Value {
        json!({
            "inputs": prompt,
            "parameters": {
                "return_full_text": false,
                "max_new_tokens": MAX_NEW_TOKENS,
                "temperature": TEMPERATURE,
            }
        })
    }
}

#[async_trait]
impl TextGenerator for HttpGenerator {
    fn model_name(&self) -> &str {
        &self.api_url
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let mut request = self.client.post(&self.api_url).json(&Self::request_body(prompt));
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let resp = request.send().await.map_err(|e| LlmError::RequestFailed {
            provider: PROVIDER.into(),
            reason: e.to_string(),
        })?;

        let status = resp.status();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(LlmError::AuthFailed {
                    provider: PROVIDER.into(),
                });
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = resp
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(std::time::Duration::from_secs);
                return Err(LlmError::RateLimited {
                    provider: PROVIDER.into(),
                    retry_after,
                });
            }
            s if !s.is_success() => {
                let body = resp.text().await.unwrap_or_default();
                return Err(LlmError::RequestFailed {
                    provider: PROVIDER.into(),
                    reason: format!("HTTP {s}: {}", body.chars().take(200).collect::<String>()),
                });
            }
            _ => {}
        }

        let parsed: GenerationResponse = resp.json().await.map_err(|e| LlmError::InvalidResponse {
            provider: PROVIDER.into(),
            reason: e.to_string(),
        })?;

        parsed
            .into_text()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| LlmError::InvalidResponse {
                provider: PROVIDER.into(),
                reason: "empty generation".into(),
            })
    }
}
