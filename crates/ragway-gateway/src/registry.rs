//! Backend selection.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use ragway_core::config::resolve_with_base;
use ragway_core::error::Result;
use ragway_core::traits::SearchBackend;
use ragway_qdrant::QdrantBackend;
use ragway_vector::LocalBackend;

use crate::settings::BackendSettings;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// LanceDB and tantivy on local disk.
    #[default]
    Local,
    Qdrant,
}

impl BackendKind {
    pub async fn open(self, settings: &BackendSettings, base: &Path) -> Result<Arc<dyn SearchBackend>> {
        let backend: Arc<dyn SearchBackend> = match self {
            Self::Local => {
                let root = resolve_with_base(base, &settings.local.root_dir);
                Arc::new(LocalBackend::open(&root).await?)
            }
            Self::Qdrant => Arc::new(QdrantBackend::connect(&settings.qdrant)?),
        };
        tracing::info!(backend = backend.name(), "search backend opened");
        Ok(backend)
    }
}

pub async fn open_backend(settings: &BackendSettings, base: &Path) -> Result<Arc<dyn SearchBackend>> {
    settings.kind.open(settings, base).await
}
