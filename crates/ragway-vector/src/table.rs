//! LanceDB connection and housekeeping helpers.
//!
//! One table per collection; the table name is the collection id.

use arrow_array::RecordBatchIterator;
use lancedb::{connect, Connection, Table};
use std::sync::Arc;

use ragway_core::error::{Error, Result};

pub(crate) fn lance_err(err: impl std::fmt::Display) -> Error {
    Error::backend("lancedb", err)
}

pub async fn open_db(uri: &str) -> Result<Connection> {
    connect(uri).execute().await.map_err(lance_err)
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let names = conn.table_names().execute().await.map_err(lance_err)?;
    Ok(names.iter().any(|n| n == name))
}

pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<arrow_schema::Schema>) -> Result<()> {
    if table_exists(conn, name).await? {
        return Ok(());
    }
    // create empty table with 0 rows
    let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
    conn.create_table(name, Box::new(iter)).execute().await.map_err(lance_err)?;
    Ok(())
}

pub async fn open_table(conn: &Connection, name: &str) -> Result<Table> {
    if !table_exists(conn, name).await? {
        return Err(Error::NotFound(format!("vector table for collection '{name}'")));
    }
    conn.open_table(name).execute().await.map_err(lance_err)
}

pub async fn drop_table(conn: &Connection, name: &str) -> Result<()> {
    if table_exists(conn, name).await? {
        conn.drop_table(name, &[]).await.map_err(lance_err)?;
    }
    Ok(())
}

/// SQL string literal for a LanceDB predicate.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
