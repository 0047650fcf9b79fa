use arrow_array::{Array, Float32Array, RecordBatch, StringArray, TimestampMillisecondArray, UInt32Array};
use chrono::{TimeZone, Utc};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::DistanceType;

use ragway_core::error::{Error, Result};
use ragway_core::types::{Chunk, ChunkMetadata, ChunkPage, CollectionId, Cursor, Meta};

use crate::table::{lance_err, open_table, quote};
use crate::VectorStore;

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
	batch
		.column_by_name(name)
		.and_then(|c| c.as_any().downcast_ref::<T>())
		.ok_or_else(|| Error::backend("lancedb", format!("column '{name}' missing or mistyped")))
}

/// Decode chunk rows, paired with the `_distance` column when present.
pub fn batch_to_chunks(batch: &RecordBatch) -> Result<Vec<(Chunk, Option<f32>)>> {
	let ids = column::<StringArray>(batch, "id")?;
	let document_ids = column::<StringArray>(batch, "document_id")?;
	let document_names = column::<StringArray>(batch, "document_name")?;
	let parts = column::<UInt32Array>(batch, "document_part")?;
	let collection_ids = column::<StringArray>(batch, "collection_id")?;
	let created = column::<TimestampMillisecondArray>(batch, "created_at")?;
	let extras = column::<StringArray>(batch, "extra")?;
	let contents = column::<StringArray>(batch, "content")?;
	let distances = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>());
	let mut out = Vec::with_capacity(batch.num_rows());
	for i in 0..batch.num_rows() {
		let extra: Meta = serde_json::from_str(extras.value(i)).unwrap_or_default();
		let created_at = Utc.timestamp_millis_opt(created.value(i)).single().unwrap_or_default();
		let chunk = Chunk {
			id: ids.value(i).to_string(),
			content: contents.value(i).to_string(),
			metadata: ChunkMetadata {
				document_id: document_ids.value(i).to_string(),
				document_name: document_names.value(i).to_string(),
				document_part: parts.value(i),
				collection_id: collection_ids.value(i).to_string(),
				created_at,
				extra,
			},
		};
		let distance = distances.filter(|d| d.is_valid(i)).map(|d| d.value(i));
		out.push((chunk, distance));
	}
	Ok(out)
}

impl VectorStore {
	/// Cosine nearest neighbours across collections; score is `1 - distance`.
	///
	/// Hits below `score_threshold` are dropped before the merge. A collection
	/// without a vector table contributes nothing.
	pub async fn search(&self, collection_ids: &[CollectionId], vector: &[f32], k: usize, score_threshold: Option<f32>) -> Result<Vec<(Chunk, f32)>> {
		let mut hits = Vec::new();
		if k == 0 { return Ok(hits); }
		for collection_id in collection_ids {
			let table = match open_table(&self.db, collection_id).await {
				Ok(table) => table,
				Err(Error::NotFound(what)) => {
					tracing::debug!(%what, "skipping collection without vector table");
					continue;
				}
				Err(e) => return Err(e),
			};
			let mut stream = table
				.vector_search(vector.to_vec()).map_err(lance_err)?
				.distance_type(DistanceType::Cosine)
				.limit(k)
				.execute().await.map_err(lance_err)?;
			while let Some(batch) = stream.try_next().await.map_err(lance_err)? {
				for (chunk, distance) in batch_to_chunks(&batch)? {
					let score = 1.0 - distance.unwrap_or(1.0);
					if score_threshold.is_some_and(|t| score < t) { continue; }
					hits.push((chunk, score));
				}
			}
		}
		hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
		hits.truncate(k);
		Ok(hits)
	}

	pub async fn count_document(&self, collection_id: &str, document_id: &str) -> Result<u64> {
		let table = open_table(&self.db, collection_id).await?;
		let count = table.count_rows(Some(format!("document_id = {}", quote(document_id)))).await.map_err(lance_err)?;
		Ok(count as u64)
	}

	/// Offset-paginated listing of one document's chunks.
	pub async fn list_document(&self, collection_id: &str, document_id: &str, cursor: Option<Cursor>, limit: usize) -> Result<ChunkPage> {
		let offset = match cursor {
			None => 0,
			Some(Cursor::Numeric(n)) => n,
			Some(Cursor::Opaque(other)) => return Err(Error::InvalidInput(format!("lancedb pages by offset, got cursor '{other}'"))),
		};
		let table = open_table(&self.db, collection_id).await?;
		let mut stream = table
			.query()
			.only_if(format!("document_id = {}", quote(document_id)))
			.offset(offset as usize)
			.limit(limit)
			.execute().await.map_err(lance_err)?;
		let mut chunks = Vec::new();
		while let Some(batch) = stream.try_next().await.map_err(lance_err)? {
			chunks.extend(batch_to_chunks(&batch)?.into_iter().map(|(c, _)| c));
		}
		let next = (limit > 0 && chunks.len() == limit).then(|| Cursor::Numeric(offset + chunks.len() as u64));
		Ok(ChunkPage { chunks, next })
	}

	pub async fn delete_document(&self, collection_id: &str, document_id: &str) -> Result<()> {
		let table = open_table(&self.db, collection_id).await?;
		table.delete(&format!("document_id = {}", quote(document_id))).await.map_err(lance_err)?;
		Ok(())
	}
}
