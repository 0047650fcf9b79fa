//! ragway-models
//!
//! Completion and embedding clients behind the `Completer`/`Embedder` traits.

use std::sync::Arc;

use ragway_core::traits::Embedder;

pub mod endpoint;
pub mod fake;
pub mod settings;

pub use endpoint::ModelEndpoint;
pub use fake::HashEmbedder;
pub use settings::ModelSettings;

/// `APP_USE_FAKE_EMBEDDINGS=1` forces the hash embedder regardless of config.
pub fn fake_embeddings_requested(settings: &ModelSettings) -> bool {
    let from_env = std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
    settings.use_fake_embeddings || from_env
}

pub fn select_embedder(settings: &ModelSettings, endpoint: &ModelEndpoint) -> Arc<dyn Embedder> {
    if fake_embeddings_requested(settings) {
        tracing::info!(dim = settings.fake_embedding_dim, "using hash embedder");
        Arc::new(HashEmbedder::new(settings.fake_embedding_dim))
    } else {
        Arc::new(endpoint.clone())
    }
}
