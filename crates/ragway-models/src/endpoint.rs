//! OpenAI-compatible HTTP client for completions and embeddings.
//!
//! Works against any server speaking `/chat/completions` and `/embeddings`
//! (Ollama, vLLM, llama.cpp server, hosted APIs).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use ragway_core::error::{Error, Result};
use ragway_core::runtime::{with_timeout, RetryPolicy};
use ragway_core::traits::{CompletionParams, Completer, Embedder, Message};

use crate::settings::ModelSettings;

#[derive(Debug, Clone, Copy)]
enum Call {
    Completion,
    Embedding,
}

impl Call {
    fn path(self) -> &'static str {
        match self {
            Self::Completion => "chat/completions",
            Self::Embedding => "embeddings",
        }
    }

    fn fail(self, status: Option<u16>, message: impl Into<String>) -> Error {
        let message = message.into();
        match self {
            Self::Completion => Error::CompletionFailed { status, message },
            Self::Embedding => Error::EmbeddingFailed { status, message },
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Shared handle to the model server. Cheap to clone.
#[derive(Clone)]
pub struct ModelEndpoint {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    permits: Arc<Semaphore>,
    retry: RetryPolicy,
    timeout: Duration,
    embed_batch_size: usize,
}

impl ModelEndpoint {
    pub fn new(settings: &ModelSettings) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| Error::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            permits: Arc::new(Semaphore::new(settings.max_concurrency.max(1))),
            retry: settings.retry_policy(),
            timeout: settings.timeout(),
            embed_batch_size: settings.embed_batch_size.max(1),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B, R>(&self, call: Call, body: &B) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| Error::Operation("model endpoint is shutting down".into()))?;
        let url = format!("{}/{}", self.base_url, call.path());
        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let exchange = async {
            let response = request
                .send()
                .await
                .map_err(|e| call.fail(e.status().map(|s| s.as_u16()), e.to_string()))?;
            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(call.fail(Some(status.as_u16()), text));
            }
            response
                .json::<R>()
                .await
                .map_err(|e| call.fail(Some(status.as_u16()), format!("malformed response: {e}")))
        };
        with_timeout(call.path(), self.timeout, exchange).await
    }
}

#[async_trait]
impl Completer for ModelEndpoint {
    async fn complete(&self, messages: &[Message], params: &CompletionParams) -> Result<String> {
        let body = ChatRequest {
            model: &params.model,
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            stream: false,
        };
        let response: ChatResponse = self.retry.run("completion", || self.post(Call::Completion, &body)).await?;
        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| Call::Completion.fail(Some(200), "response had no choices"))
    }
}

#[async_trait]
impl Embedder for ModelEndpoint {
    async fn embed(&self, texts: &[String], model: &str) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.embed_batch_size) {
            let body = EmbeddingRequest { model, input: batch };
            let mut response: EmbeddingResponse =
                self.retry.run("embedding", || self.post(Call::Embedding, &body)).await?;
            if response.data.len() != batch.len() {
                return Err(Call::Embedding.fail(
                    Some(200),
                    format!("expected {} vectors, got {}", batch.len(), response.data.len()),
                ));
            }
            response.data.sort_by_key(|d| d.index);
            vectors.extend(response.data.into_iter().map(|d| d.embedding));
        }
        tracing::debug!(count = vectors.len(), model, "embedded texts");
        Ok(vectors)
    }
}
