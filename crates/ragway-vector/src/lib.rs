//! ragway-vector
//!
//! LanceDB vector store (one table per collection) and the local backend that
//! pairs it with the tantivy lexical store.

use lancedb::Connection;

use ragway_core::error::Result;
use ragway_core::types::CollectionId;

pub mod backend;
pub mod schema;
pub mod search;
pub mod table;
pub mod writer;

pub use backend::LocalBackend;

pub struct VectorStore {
    pub(crate) db: Connection,
}

impl VectorStore {
    pub async fn open(uri: &str) -> Result<Self> {
        let db = table::open_db(uri).await?;
        Ok(Self { db })
    }

    pub async fn create_collection(&self, collection_id: &str, vector_size: usize) -> Result<()> {
        let dim = i32::try_from(vector_size)
            .map_err(|_| ragway_core::Error::InvalidInput(format!("vector size {vector_size} too large")))?;
        table::ensure_table(&self.db, collection_id, schema::build_chunk_schema(dim)).await
    }

    pub async fn delete_collection(&self, collection_id: &str) -> Result<()> {
        table::drop_table(&self.db, collection_id).await
    }

    pub async fn list_collections(&self) -> Result<Vec<CollectionId>> {
        let mut names = self.db.table_names().execute().await.map_err(table::lance_err)?;
        names.sort();
        Ok(names)
    }

    pub async fn is_reachable(&self) -> bool {
        self.db.table_names().execute().await.is_ok()
    }
}
