use std::time::Duration;

use serde::Deserialize;

use ragway_core::runtime::RetryPolicy;
use ragway_core::traits::CompletionParams;

/// `[models]` configuration section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// OpenAI-compatible API root, e.g. `http://127.0.0.1:11434/v1`.
    pub base_url: String,
    pub api_key: Option<String>,
    pub completion_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_ms: u64,
    pub max_concurrency: usize,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub embed_batch_size: usize,
    pub use_fake_embeddings: bool,
    /// Only read by the hash embedder.
    pub fake_embedding_dim: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434/v1".to_string(),
            api_key: None,
            completion_model: "qwen2.5:7b-instruct".to_string(),
            temperature: 0.2,
            max_tokens: 1024,
            timeout_ms: 30_000,
            max_concurrency: 8,
            retry_attempts: 3,
            retry_delay_ms: 500,
            embed_batch_size: 32,
            use_fake_embeddings: false,
            fake_embedding_dim: 1024,
        }
    }
}

impl ModelSettings {
    pub fn completion_params(&self) -> CompletionParams {
        CompletionParams {
            model: self.completion_model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, Duration::from_millis(self.retry_delay_ms))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
