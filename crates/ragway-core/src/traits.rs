use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Chunk, ChunkPage, CollectionId, Cursor, QueryMethod, SearchRequest, SearchResult};

/// Upserts are sent to the backends in groups of this many chunks.
pub const UPSERT_BATCH_SIZE: usize = 48;

/// Uniform surface over a concrete search store.
///
/// Backends only execute single methods; hybrid search is composed on top of
/// this trait by `ragway-hybrid`. A backend asked for a method it does not
/// support must return [`Error::UnsupportedMethod`] instead of answering with
/// another method.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &'static str;

    fn supports(&self, method: QueryMethod) -> bool;

    async fn create_collection(&self, collection_id: &str, vector_size: usize) -> Result<()>;

    async fn delete_collection(&self, collection_id: &str) -> Result<()>;

    async fn list_collections(&self) -> Result<Vec<CollectionId>>;

    /// Insert or replace chunks. `embeddings[i]` belongs to `chunks[i]`.
    /// An empty slice is a no-op.
    async fn upsert(&self, collection_id: &str, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()>;

    async fn query(&self, method: QueryMethod, request: &SearchRequest<'_>) -> Result<Vec<SearchResult>>;

    /// Number of chunks indexed for a document, or `None` when the backend
    /// cannot tell right now. `None` means unknown, not zero.
    async fn chunk_count(&self, collection_id: &str, document_id: &str) -> Option<u64>;

    async fn list_chunks(
        &self,
        collection_id: &str,
        document_id: &str,
        cursor: Option<Cursor>,
        limit: usize,
    ) -> Result<ChunkPage>;

    async fn delete_document(&self, collection_id: &str, document_id: &str) -> Result<()>;

    /// Cheap liveness probe. Never errors.
    async fn check(&self) -> bool;
}

/// Validates the shape of an upsert before any backend work happens.
pub fn check_upsert(chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
    if chunks.len() != embeddings.len() {
        return Err(Error::InvalidInput(format!(
            "{} chunks but {} embeddings",
            chunks.len(),
            embeddings.len()
        )));
    }
    Ok(())
}

/// Fails fast when a backend is asked for something it cannot do.
pub fn ensure_supported(backend: &dyn SearchBackend, method: QueryMethod) -> Result<()> {
    if backend.supports(method) {
        Ok(())
    } else {
        Err(Error::UnsupportedMethod { backend: backend.name().to_string(), method })
    }
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String], model: &str) -> Result<Vec<Vec<f32>>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, messages: &[Message], params: &CompletionParams) -> Result<String>;
}

/// Fresh passages from the open web. Each returned chunk carries the source
/// URL or title as its `document_name`.
#[async_trait]
pub trait WebFallbackSource: Send + Sync {
    async fn fetch(&self, query: &str, limit: usize) -> Result<Vec<Chunk>>;
}
