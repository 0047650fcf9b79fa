use std::time::Duration;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointStruct,
    ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Qdrant, QdrantError};
use serde::Deserialize;

use ragway_core::error::{Error, Result};
use ragway_core::traits::{check_upsert, ensure_supported, SearchBackend, UPSERT_BATCH_SIZE};
use ragway_core::types::{
    validate_collection_id, Chunk, ChunkPage, CollectionId, Cursor, MethodTag, QueryMethod, SearchRequest, SearchResult,
};

use crate::payload::{chunk_to_payload, cursor_from_point, payload_to_chunk, point_from_cursor, point_id};

const BACKEND: &str = "qdrant";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QdrantSettings {
    pub url: String,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
}

impl Default for QdrantSettings {
    fn default() -> Self {
        Self { url: "http://localhost:6334".to_string(), api_key: None, timeout_ms: 10_000 }
    }
}

fn qdrant_err(err: QdrantError) -> Error {
    Error::backend(BACKEND, err)
}

fn document_filter(document_id: &str) -> Filter {
    Filter::must([Condition::matches("document_id", document_id.to_string())])
}

/// Vector-only backend over a Qdrant server.
pub struct QdrantBackend {
    client: Qdrant,
}

impl QdrantBackend {
    /// Builds the client; the connection itself is established lazily.
    pub fn connect(settings: &QdrantSettings) -> Result<Self> {
        let client = Qdrant::from_url(&settings.url)
            .api_key(settings.api_key.clone())
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .map_err(qdrant_err)?;
        tracing::debug!(url = %settings.url, "qdrant client ready");
        Ok(Self { client })
    }
}

#[async_trait]
impl SearchBackend for QdrantBackend {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn supports(&self, method: QueryMethod) -> bool {
        method == QueryMethod::Semantic
    }

    async fn create_collection(&self, collection_id: &str, vector_size: usize) -> Result<()> {
        validate_collection_id(collection_id)?;
        if self.client.collection_exists(collection_id).await.map_err(qdrant_err)? {
            return Ok(());
        }
        self.client
            .create_collection(
                CreateCollectionBuilder::new(collection_id)
                    .vectors_config(VectorParamsBuilder::new(vector_size as u64, Distance::Cosine)),
            )
            .await
            .map_err(qdrant_err)?;
        Ok(())
    }

    async fn delete_collection(&self, collection_id: &str) -> Result<()> {
        validate_collection_id(collection_id)?;
        self.client.delete_collection(collection_id).await.map_err(qdrant_err)?;
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<CollectionId>> {
        let response = self.client.list_collections().await.map_err(qdrant_err)?;
        let mut names: Vec<CollectionId> = response.collections.into_iter().map(|c| c.name).collect();
        names.sort();
        Ok(names)
    }

    async fn upsert(&self, collection_id: &str, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
        check_upsert(chunks, embeddings)?;
        for (batch, vectors) in chunks.chunks(UPSERT_BATCH_SIZE).zip(embeddings.chunks(UPSERT_BATCH_SIZE)) {
            let points: Vec<PointStruct> = batch
                .iter()
                .zip(vectors)
                .map(|(chunk, vector)| {
                    PointStruct::new(point_id(collection_id, &chunk.id), vector.clone(), chunk_to_payload(chunk))
                })
                .collect();
            self.client
                .upsert_points(UpsertPointsBuilder::new(collection_id, points).wait(true))
                .await
                .map_err(qdrant_err)?;
        }
        Ok(())
    }

    async fn query(&self, method: QueryMethod, request: &SearchRequest<'_>) -> Result<Vec<SearchResult>> {
        ensure_supported(self, method)?;
        let vector = request
            .vector
            .ok_or_else(|| Error::InvalidInput("semantic search needs a query vector".into()))?;
        let mut results = Vec::new();
        if request.k == 0 {
            return Ok(results);
        }
        for collection_id in request.collection_ids {
            let mut search = SearchPointsBuilder::new(collection_id.as_str(), vector.to_vec(), request.k as u64)
                .with_payload(true);
            if let Some(threshold) = request.score_threshold {
                search = search.score_threshold(threshold);
            }
            let response = self.client.search_points(search).await.map_err(qdrant_err)?;
            results.extend(response.result.into_iter().map(|point| SearchResult {
                method: MethodTag::from(QueryMethod::Semantic),
                score: f64::from(point.score),
                chunk: payload_to_chunk(point.payload),
            }));
        }
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(request.k);
        Ok(results)
    }

    async fn chunk_count(&self, collection_id: &str, document_id: &str) -> Option<u64> {
        let request = CountPointsBuilder::new(collection_id).filter(document_filter(document_id)).exact(true);
        match self.client.count(request).await {
            Ok(response) => response.result.map(|r| r.count),
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
        let limit = u32::try_from(limit).map_err(|_| Error::InvalidInput(format!("page limit {limit} too large")))?;
        let mut scroll = ScrollPointsBuilder::new(collection_id)
            .filter(document_filter(document_id))
            .limit(limit)
            .with_payload(true)
            .with_vectors(false);
        if let Some(cursor) = cursor {
            scroll = scroll.offset(point_from_cursor(cursor));
        }
        let response = self.client.scroll(scroll).await.map_err(qdrant_err)?;
        Ok(ChunkPage {
            chunks: response.result.into_iter().map(|point| payload_to_chunk(point.payload)).collect(),
            next: response.next_page_offset.and_then(cursor_from_point),
        })
    }

    async fn delete_document(&self, collection_id: &str, document_id: &str) -> Result<()> {
        self.client
            .delete_points(DeletePointsBuilder::new(collection_id).points(document_filter(document_id)).wait(true))
            .await
            .map_err(qdrant_err)?;
        Ok(())
    }

    async fn check(&self) -> bool {
        match self.client.health_check().await {
            Ok(_) => true,
            Err(err) => {
                tracing::debug!(error = %err, "qdrant health check failed");
                false
            }
        }
    }
}
