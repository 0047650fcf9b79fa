use std::path::Path;
use std::sync::Arc;

use ragway_agents::{build_web_source, AgentSettings, OrchestratedAnswer, RetrievalOrchestrator};
use ragway_core::config::Config;
use ragway_core::error::{Error, Result};
use ragway_core::runtime::cancellable;
use ragway_core::traits::{check_upsert, Completer, Embedder, SearchBackend, WebFallbackSource};
use ragway_core::types::{Chunk, Collection, CollectionId, QueryMethod, SearchMethod, SearchResult};
use ragway_core::CancellationToken;
use ragway_hybrid::{HybridSearchEngine, SearchQuery};
use ragway_models::{select_embedder, ModelEndpoint};

use crate::catalog::{resolve, shared_embedding_model, CollectionCatalog, StaticCatalog};
use crate::registry::open_backend;
use crate::settings::GatewaySettings;

/// Per-call knobs for [`GatewayContext::search`].
#[derive(Debug, Clone, Copy)]
pub struct SearchParams {
    pub method: SearchMethod,
    pub k: usize,
    pub rrf_k: Option<f64>,
    pub score_threshold: Option<f32>,
}

/// Everything a gateway needs, already constructed.
pub struct GatewayParts {
    pub settings: GatewaySettings,
    pub backend: Arc<dyn SearchBackend>,
    pub catalog: Arc<dyn CollectionCatalog>,
    pub embedder: Arc<dyn Embedder>,
    pub completer: Arc<dyn Completer>,
    pub web: Arc<dyn WebFallbackSource>,
}

/// Hybrid when the backend can do lexical search, semantic otherwise.
pub fn default_method(configured: Option<SearchMethod>, backend: &dyn SearchBackend) -> SearchMethod {
    configured.unwrap_or(if backend.supports(QueryMethod::Lexical) { SearchMethod::Hybrid } else { SearchMethod::Semantic })
}

/// Immutable state shared by every request.
pub struct GatewayContext {
    catalog: Arc<dyn CollectionCatalog>,
    engine: HybridSearchEngine,
    embedder: Arc<dyn Embedder>,
    orchestrator: RetrievalOrchestrator,
    agents: AgentSettings,
}

impl GatewayContext {
    /// Build from loaded configuration. Relative paths resolve against `base`.
    pub async fn from_config(config: &Config, base: &Path) -> Result<Arc<Self>> {
        let settings = GatewaySettings::from_config(config)?;
        let backend = open_backend(&settings.backend, base).await?;
        let catalog = Arc::new(StaticCatalog::new(settings.collections.clone())?);
        let endpoint = ModelEndpoint::new(&settings.models)?;
        let embedder = select_embedder(&settings.models, &endpoint);
        let web = build_web_source(&settings.web)?;
        Ok(Self::from_parts(GatewayParts {
            settings,
            backend,
            catalog,
            embedder,
            completer: Arc::new(endpoint),
            web,
        }))
    }

    pub fn from_parts(parts: GatewayParts) -> Arc<Self> {
        let GatewayParts { settings, backend, catalog, embedder, completer, web } = parts;
        let orchestrator = RetrievalOrchestrator::new(
            completer,
            web,
            settings.prompts,
            settings.models.completion_params(),
            settings.agents.clone(),
            settings.search.rrf_k,
        );
        Arc::new(Self {
            catalog,
            engine: HybridSearchEngine::new(backend, settings.search),
            embedder,
            orchestrator,
            agents: settings.agents,
        })
    }

    pub fn backend(&self) -> &Arc<dyn SearchBackend> {
        self.engine.backend()
    }

    pub fn catalog(&self) -> &Arc<dyn CollectionCatalog> {
        &self.catalog
    }

    pub fn agents(&self) -> &AgentSettings {
        &self.agents
    }

    /// Ranked results for `prompt` over `collection_ids`.
    pub async fn search(
        &self,
        collection_ids: &[CollectionId],
        prompt: &str,
        params: SearchParams,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>> {
        let collections = resolve(self.catalog.as_ref(), collection_ids).await?;
        let model = shared_embedding_model(&collections)?;
        let vector = if params.method.needs_vector() {
            Some(self.embed_one(prompt, &model, cancel).await?)
        } else {
            None
        };
        let query = SearchQuery {
            collection_ids,
            method: params.method,
            text: Some(prompt),
            vector: vector.as_deref(),
            k: params.k,
            rrf_k: params.rrf_k,
            score_threshold: params.score_threshold,
        };
        self.engine.query(&query, cancel).await
    }

    /// Retrieve candidates and run the multi-agent loop over them.
    ///
    /// `None` for either limit uses the configured value. The request deadline,
    /// when configured, cancels everything still in flight.
    pub async fn orchestrated_answer(
        &self,
        collection_ids: &[CollectionId],
        prompt: &str,
        max_retries: Option<usize>,
        window_size: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<OrchestratedAnswer> {
        let token = cancel.child_token();
        let deadline = self.agents.request_timeout().map(|limit| {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                tracing::warn!(after_ms = limit.as_millis() as u64, "request deadline reached");
                token.cancel();
            })
        });
        let out = self.answer_within(collection_ids, prompt, max_retries, window_size, &token).await;
        if let Some(timer) = deadline {
            timer.abort();
        }
        out
    }

    async fn answer_within(
        &self,
        collection_ids: &[CollectionId],
        prompt: &str,
        max_retries: Option<usize>,
        window_size: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<OrchestratedAnswer> {
        let window_size = window_size.unwrap_or(self.agents.window_size).max(1);
        let max_retries = max_retries.unwrap_or(self.agents.max_retries);
        let params = SearchParams {
            method: default_method(self.agents.method, self.backend().as_ref()),
            k: window_size.saturating_mul(max_retries.saturating_add(1)),
            rrf_k: None,
            score_threshold: None,
        };
        let candidates = self.search(collection_ids, prompt, params, cancel).await?;
        tracing::debug!(candidates = candidates.len(), method = %params.method, "candidates retrieved");
        self.orchestrator.answer(prompt, &candidates, window_size, max_retries, cancel).await
    }

    /// Embed and store chunks of one collection, creating it on first use.
    pub async fn load_chunks(&self, collection_id: &str, chunks: &[Chunk], cancel: &CancellationToken) -> Result<usize> {
        let collection = self.collection(collection_id).await?;
        if let Some(stray) = chunks.iter().find(|c| c.collection_id() != collection_id) {
            return Err(Error::InvalidInput(format!(
                "chunk '{}' belongs to collection '{}'",
                stray.id,
                stray.collection_id()
            )));
        }
        if chunks.is_empty() {
            return Ok(0);
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = cancellable(cancel, self.embedder.embed(&texts, &collection.embedding_model)).await?;
        check_upsert(chunks, &embeddings)?;
        let dim = embeddings.first().map_or(0, Vec::len);
        if dim == 0 || embeddings.iter().any(|e| e.len() != dim) {
            return Err(Error::EmbeddingFailed {
                status: None,
                message: format!("model '{}' returned empty or ragged vectors", collection.embedding_model),
            });
        }
        let backend = self.backend();
        if !backend.list_collections().await?.iter().any(|id| id == collection_id) {
            backend.create_collection(collection_id, dim).await?;
        }
        cancellable(cancel, backend.upsert(collection_id, chunks, &embeddings)).await?;
        tracing::info!(collection_id, chunks = chunks.len(), "chunks loaded");
        Ok(chunks.len())
    }

    /// Remove a document, returning how many chunks it had when that is known.
    pub async fn delete_document(&self, collection_id: &str, document_id: &str) -> Result<Option<u64>> {
        self.collection(collection_id).await?;
        let backend = self.backend();
        let before = backend.chunk_count(collection_id, document_id).await;
        backend.delete_document(collection_id, document_id).await?;
        tracing::info!(collection_id, document_id, removed = ?before, "document deleted");
        Ok(before)
    }

    /// Drop this handle. Backend connections and model clients are owned by
    /// the context and close when the last `Arc` to it is dropped, so other
    /// live handles keep working.
    pub fn shutdown(self: Arc<Self>) {
        let remaining = Arc::strong_count(&self) - 1;
        tracing::info!(remaining, "gateway shutting down");
    }

    async fn collection(&self, id: &str) -> Result<Collection> {
        self.catalog.get(id).await?.ok_or_else(|| Error::NotFound(format!("collection '{id}'")))
    }

    async fn embed_one(&self, text: &str, model: &str, cancel: &CancellationToken) -> Result<Vec<f32>> {
        let mut vectors = cancellable(cancel, self.embedder.embed(&[text.to_string()], model)).await?;
        if vectors.is_empty() {
            return Err(Error::EmbeddingFailed { status: None, message: "no vector returned for query".into() });
        }
        Ok(vectors.swap_remove(0))
    }
}
