use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use ragway_core::error::{Error, Result};
use ragway_core::traits::{check_upsert, SearchBackend};
use ragway_core::types::{
    validate_collection_id, Chunk, ChunkPage, CollectionId, Cursor, MethodTag, QueryMethod, SearchRequest, SearchResult,
};
use ragway_text::LexicalStore;

use crate::VectorStore;

/// Embedded backend: LanceDB for vectors, tantivy for full text.
///
/// Supports both retrieval methods. Lexical search goes through the blocking
/// pool since tantivy is synchronous.
pub struct LocalBackend {
    vectors: VectorStore,
    lexical: Arc<LexicalStore>,
}

impl LocalBackend {
    /// Lays out `root/lancedb` and `root/tantivy`.
    pub async fn open(root: &Path) -> Result<Self> {
        let lance_dir = root.join("lancedb");
        std::fs::create_dir_all(&lance_dir).map_err(|e| Error::backend("lancedb", e))?;
        let vectors = VectorStore::open(&lance_dir.to_string_lossy()).await?;
        let lexical = Arc::new(LexicalStore::open(root.join("tantivy"))?);
        Ok(Self { vectors, lexical })
    }

    async fn lexical<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&LexicalStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.lexical.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| Error::backend("tantivy", e))?
    }
}

#[async_trait]
impl SearchBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    fn supports(&self, method: QueryMethod) -> bool {
        matches!(method, QueryMethod::Lexical | QueryMethod::Semantic)
    }

    async fn create_collection(&self, collection_id: &str, vector_size: usize) -> Result<()> {
        validate_collection_id(collection_id)?;
        self.vectors.create_collection(collection_id, vector_size).await?;
        let id = collection_id.to_string();
        self.lexical(move |store| store.create_collection(&id)).await
    }

    async fn delete_collection(&self, collection_id: &str) -> Result<()> {
        validate_collection_id(collection_id)?;
        self.vectors.delete_collection(collection_id).await?;
        let id = collection_id.to_string();
        self.lexical(move |store| store.delete_collection(&id)).await
    }

    async fn list_collections(&self) -> Result<Vec<CollectionId>> {
        self.vectors.list_collections().await
    }

    async fn upsert(&self, collection_id: &str, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
        check_upsert(chunks, embeddings)?;
        if chunks.is_empty() {
            return Ok(());
        }
        self.vectors.upsert(collection_id, chunks, embeddings).await?;
        let id = collection_id.to_string();
        let owned = chunks.to_vec();
        self.lexical(move |store| {
            owned
                .chunks(ragway_core::traits::UPSERT_BATCH_SIZE)
                .try_for_each(|batch| store.upsert(&id, batch))
        })
        .await
    }

    async fn query(&self, method: QueryMethod, request: &SearchRequest<'_>) -> Result<Vec<SearchResult>> {
        let hits = match method {
            QueryMethod::Lexical => {
                let text = request
                    .text
                    .ok_or_else(|| Error::InvalidInput("lexical search needs query text".into()))?
                    .to_string();
                let ids = request.collection_ids.to_vec();
                let k = request.k;
                self.lexical(move |store| store.search(&ids, &text, k)).await?
            }
            QueryMethod::Semantic => {
                let vector = request
                    .vector
                    .ok_or_else(|| Error::InvalidInput("semantic search needs a query vector".into()))?;
                self.vectors
                    .search(request.collection_ids, vector, request.k, request.score_threshold)
                    .await?
            }
        };
        Ok(hits
            .into_iter()
            .map(|(chunk, score)| SearchResult { method: MethodTag::from(method), score: f64::from(score), chunk })
            .collect())
    }

    async fn chunk_count(&self, collection_id: &str, document_id: &str) -> Option<u64> {
        match self.vectors.count_document(collection_id, document_id).await {
            Ok(count) => Some(count),
            Err(err) => {
                tracing::warn!(collection_id, document_id, error = %err, "chunk count unavailable");
                None
            }
        }
    }

    async fn list_chunks(
        &self,
        collection_id: &str,
        document_id: &str,
        cursor: Option<Cursor>,
        limit: usize,
    ) -> Result<ChunkPage> {
        self.vectors.list_document(collection_id, document_id, cursor, limit).await
    }

    async fn delete_document(&self, collection_id: &str, document_id: &str) -> Result<()> {
        self.vectors.delete_document(collection_id, document_id).await?;
        let (id, doc) = (collection_id.to_string(), document_id.to_string());
        self.lexical(move |store| store.delete_document(&id, &doc)).await
    }

    async fn check(&self) -> bool {
        self.vectors.is_reachable().await && self.lexical.root().is_dir()
    }
}
