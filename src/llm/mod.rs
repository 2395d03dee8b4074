//! Text generation for drafting replies.
//!
//! The orchestrator only sees [`TextGenerator`]; the production backend is an
//! HTTP inference endpoint that takes a prompt and returns generated text.

mod http;

pub use http::HttpGenerator;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::LlmError;

/// A prompt-in, text-out generation capability.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Name used in logs and error messages.
    fn model_name(&self) -> &str;

    /// Run one generation. No retries happen at this layer.
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Configuration for the HTTP inference endpoint.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_url: String,
    pub api_token: Option<secrecy::SecretString>,
    pub timeout: Duration,
}

/// Build the generator described by `config`.
pub fn create_generator(config: &LlmConfig) -> Result<Arc<dyn TextGenerator>, LlmError> {
    let generator = HttpGenerator::new(config)?;
    tracing::info!(endpoint = %config.api_url, "Using HTTP text generator");
    Ok(Arc::new(generator))
}
