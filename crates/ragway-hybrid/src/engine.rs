use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use ragway_core::error::{Error, Result};
use ragway_core::runtime::{cancellable, with_timeout};
use ragway_core::traits::{ensure_supported, SearchBackend};
use ragway_core::types::{CollectionId, QueryMethod, SearchMethod, SearchRequest, SearchResult};
use ragway_core::CancellationToken;

use crate::rrf::{fuse, DEFAULT_RRF_K};

/// `[search]` configuration section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub rrf_k: f64,
    pub subquery_timeout_ms: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self { rrf_k: DEFAULT_RRF_K, subquery_timeout_ms: 10_000 }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SearchQuery<'a> {
    pub collection_ids: &'a [CollectionId],
    pub method: SearchMethod,
    pub text: Option<&'a str>,
    pub vector: Option<&'a [f32]>,
    pub k: usize,
    /// Falls back to the configured value when unset.
    pub rrf_k: Option<f64>,
    pub score_threshold: Option<f32>,
}

/// Runs single-method queries directly and splits hybrid ones into a lexical
/// and a semantic pass that are fused afterwards.
pub struct HybridSearchEngine {
    backend: Arc<dyn SearchBackend>,
    settings: SearchSettings,
}

impl HybridSearchEngine {
    pub fn new(backend: Arc<dyn SearchBackend>, settings: SearchSettings) -> Self {
        Self { backend, settings }
    }

    pub fn backend(&self) -> &Arc<dyn SearchBackend> {
        &self.backend
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    pub async fn query(&self, query: &SearchQuery<'_>, cancel: &CancellationToken) -> Result<Vec<SearchResult>> {
        let request = SearchRequest {
            collection_ids: query.collection_ids,
            text: query.text,
            vector: query.vector,
            k: query.k,
            score_threshold: query.score_threshold,
        };
        if query.method.needs_text() && request.text.is_none() {
            return Err(Error::InvalidInput(format!("{} search needs query text", query.method)));
        }
        if query.method.needs_vector() && request.vector.is_none() {
            return Err(Error::InvalidInput(format!("{} search needs a query vector", query.method)));
        }
        for method in query.method.components() {
            ensure_supported(self.backend.as_ref(), *method)?;
        }

        let rrf_k = query.rrf_k.unwrap_or(self.settings.rrf_k);
        let results = match query.method {
            SearchMethod::Lexical => cancellable(cancel, self.backend.query(QueryMethod::Lexical, &request)).await?,
            SearchMethod::Semantic => cancellable(cancel, self.backend.query(QueryMethod::Semantic, &request)).await?,
            SearchMethod::Hybrid => {
                // Validate before spending two backend calls.
                fuse(Vec::new(), 0, rrf_k)?;
                let (lexical, semantic) = cancellable(cancel, async {
                    tokio::try_join!(
                        self.subquery(QueryMethod::Lexical, &request),
                        self.subquery(QueryMethod::Semantic, &request),
                    )
                })
                .await?;
                fuse(vec![lexical, semantic], query.k, rrf_k)?
            }
        };
        tracing::debug!(
            backend = self.backend.name(),
            method = %query.method,
            hits = results.len(),
            "search finished"
        );
        Ok(results)
    }

    async fn subquery(&self, method: QueryMethod, request: &SearchRequest<'_>) -> Result<Vec<SearchResult>> {
        let limit = Duration::from_millis(self.settings.subquery_timeout_ms);
        let operation = format!("{method} subquery");
        with_timeout(&operation, limit, self.backend.query(method, request))
            .await
            .map_err(|err| match err {
                Error::BackendUnavailable { .. }
                | Error::NotFound(_)
                | Error::InvalidInput(_)
                | Error::InvalidConfig(_)
                | Error::UnsupportedMethod { .. }
                | Error::DifferentCollectionModels(_)
                | Error::CancelledByCaller => err,
                other => Error::BackendUnavailable {
                    backend: self.backend.name().to_string(),
                    message: format!("{operation} failed: {other}"),
                },
            })
    }
}
