use std::collections::BTreeMap;

use async_trait::async_trait;

use ragway_core::error::{Error, Result};
use ragway_core::types::{validate_collection_id, Collection, CollectionId};

/// Read access to collection metadata.
#[async_trait]
pub trait CollectionCatalog: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Collection>>;
    async fn list(&self) -> Result<Vec<Collection>>;
}

/// Catalog fixed at startup, usually from `[[collections]]` in config.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    by_id: BTreeMap<CollectionId, Collection>,
}

impl StaticCatalog {
    pub fn new(collections: Vec<Collection>) -> Result<Self> {
        let mut by_id = BTreeMap::new();
        for collection in collections {
            validate_collection_id(&collection.id).map_err(|e| Error::InvalidConfig(e.to_string()))?;
            if collection.embedding_model.trim().is_empty() {
                return Err(Error::InvalidConfig(format!("collection '{}' has no embedding_model", collection.id)));
            }
            let id = collection.id.clone();
            if by_id.insert(id.clone(), collection).is_some() {
                return Err(Error::InvalidConfig(format!("collection '{id}' is declared twice")));
            }
        }
        Ok(Self { by_id })
    }
}

#[async_trait]
impl CollectionCatalog for StaticCatalog {
    async fn get(&self, id: &str) -> Result<Option<Collection>> {
        Ok(self.by_id.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Collection>> {
        Ok(self.by_id.values().cloned().collect())
    }
}

/// Look up every id, failing on the first unknown one.
pub async fn resolve(catalog: &dyn CollectionCatalog, ids: &[CollectionId]) -> Result<Vec<Collection>> {
    if ids.is_empty() {
        return Err(Error::InvalidInput("at least one collection is required".into()));
    }
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        let collection = catalog.get(id).await?.ok_or_else(|| Error::NotFound(format!("collection '{id}'")))?;
        out.push(collection);
    }
    Ok(out)
}

/// The one embedding model shared by all `collections`.
pub fn shared_embedding_model(collections: &[Collection]) -> Result<String> {
    let mut models: Vec<String> = Vec::new();
    for collection in collections {
        if !models.contains(&collection.embedding_model) {
            models.push(collection.embedding_model.clone());
        }
    }
    match models.len() {
        1 => Ok(models.remove(0)),
        0 => Err(Error::InvalidInput("at least one collection is required".into())),
        _ => Err(Error::DifferentCollectionModels(models)),
    }
}
