//! Web fallback sources.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;

use ragway_core::error::{Error, Result};
use ragway_core::traits::WebFallbackSource;
use ragway_core::types::{Chunk, ChunkMetadata};

pub const WEB_COLLECTION: &str = "web";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebKind {
    #[default]
    Disabled,
    Searxng,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearxngSettings {
    pub url: String,
    pub timeout_ms: u64,
}

impl Default for SearxngSettings {
    fn default() -> Self {
        Self { url: "http://127.0.0.1:8888".to_string(), timeout_ms: 10_000 }
    }
}

/// `[web]` configuration section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WebSettings {
    pub kind: WebKind,
    pub searxng: SearxngSettings,
}

pub fn build_web_source(settings: &WebSettings) -> Result<Arc<dyn WebFallbackSource>> {
    Ok(match settings.kind {
        WebKind::Disabled => Arc::new(DisabledWebFallback),
        WebKind::Searxng => Arc::new(SearxngSource::new(&settings.searxng)?),
    })
}

/// Never finds anything.
pub struct DisabledWebFallback;

#[async_trait]
impl WebFallbackSource for DisabledWebFallback {
    async fn fetch(&self, _query: &str, _limit: usize) -> Result<Vec<Chunk>> {
        Ok(Vec::new())
    }
}

#[derive(Deserialize)]
struct SearxngResponse {
    #[serde(default)]
    results: Vec<SearxngResult>,
}

#[derive(Deserialize)]
struct SearxngResult {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
}

/// Queries a SearXNG instance's JSON API.
pub struct SearxngSource {
    client: Client,
    base_url: String,
}

impl SearxngSource {
    pub fn new(settings: &SearxngSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .map_err(|e| Error::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self { client, base_url: settings.url.trim_end_matches('/').to_string() })
    }
}

fn to_chunk(result: SearxngResult, rank: usize) -> Chunk {
    let document_name = if result.title.trim().is_empty() {
        result.url.clone()
    } else {
        format!("{} ({})", result.title.trim(), result.url)
    };
    Chunk {
        id: result.url.clone(),
        content: result.content.trim().to_string(),
        metadata: ChunkMetadata {
            document_id: result.url,
            document_name,
            document_part: u32::try_from(rank).unwrap_or(u32::MAX),
            collection_id: WEB_COLLECTION.to_string(),
            created_at: Utc::now(),
            extra: Default::default(),
        },
    }
}

#[async_trait]
impl WebFallbackSource for SearxngSource {
    async fn fetch(&self, query: &str, limit: usize) -> Result<Vec<Chunk>> {
        let url = format!("{}/search", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("q", query), ("format", "json")])
            .send()
            .await
            .map_err(|e| Error::backend("searxng", e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::backend("searxng", format!("status {status}")));
        }
        let body: SearxngResponse = response.json().await.map_err(|e| Error::backend("searxng", e))?;
        let chunks: Vec<Chunk> = body
            .results
            .into_iter()
            .filter(|r| !r.content.trim().is_empty())
            .take(limit)
            .enumerate()
            .map(|(rank, r)| to_chunk(r, rank))
            .collect();
        tracing::debug!(query, found = chunks.len(), "web fallback fetched");
        Ok(chunks)
    }
}
