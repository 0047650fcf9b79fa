use arrow_array::{FixedSizeListArray, RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray, UInt32Array};
use std::sync::Arc;

use ragway_core::error::{Error, Result};
use ragway_core::traits::{check_upsert, UPSERT_BATCH_SIZE};
use ragway_core::types::Chunk;

use crate::schema::{build_chunk_schema, vector_dim};
use crate::table::{lance_err, open_table};
use crate::VectorStore;

pub fn chunks_to_record_batch(chunks: &[Chunk], embeddings: &[Vec<f32>], dim: i32) -> Result<RecordBatch> {
	let mut ids = Vec::new(); let mut document_ids = Vec::new(); let mut document_names = Vec::new(); let mut parts = Vec::new();
	let mut collection_ids = Vec::new(); let mut created = Vec::new(); let mut extras = Vec::new(); let mut contents = Vec::new();
	let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::new();
	for (chunk, embedding) in chunks.iter().zip(embeddings) {
		if embedding.len() != dim as usize {
			return Err(Error::InvalidInput(format!("chunk '{}' has a {}-d embedding, table expects {}", chunk.id, embedding.len(), dim)));
		}
		let meta = &chunk.metadata;
		ids.push(chunk.id.clone()); document_ids.push(meta.document_id.clone()); document_names.push(meta.document_name.clone());
		parts.push(meta.document_part); collection_ids.push(meta.collection_id.clone()); created.push(meta.created_at.timestamp_millis());
		extras.push(serde_json::to_string(&meta.extra).map_err(|e| Error::Operation(e.to_string()))?);
		contents.push(chunk.content.clone());
		vectors.push(Some(embedding.iter().map(|&x| Some(x)).collect()));
	}
	let record_batch = RecordBatch::try_new(build_chunk_schema(dim), vec![
		Arc::new(StringArray::from(ids)),
		Arc::new(StringArray::from(document_ids)),
		Arc::new(StringArray::from(document_names)),
		Arc::new(UInt32Array::from(parts)),
		Arc::new(StringArray::from(collection_ids)),
		Arc::new(TimestampMillisecondArray::from(created)),
		Arc::new(StringArray::from(extras)),
		Arc::new(StringArray::from(contents)),
		Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors.into_iter(), dim)),
	]).map_err(lance_err)?;
	Ok(record_batch)
}

impl VectorStore {
	/// Upsert keyed on chunk id, sent in groups of [`UPSERT_BATCH_SIZE`].
	pub async fn upsert(&self, collection_id: &str, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
		check_upsert(chunks, embeddings)?;
		if chunks.is_empty() { return Ok(()); }
		let table = open_table(&self.db, collection_id).await?;
		let schema = table.schema().await.map_err(lance_err)?;
		let dim = vector_dim(&schema).ok_or_else(|| Error::Operation(format!("table '{collection_id}' has no vector column")))?;
		for (batch_chunks, batch_embeddings) in chunks.chunks(UPSERT_BATCH_SIZE).zip(embeddings.chunks(UPSERT_BATCH_SIZE)) {
			let record_batch = chunks_to_record_batch(batch_chunks, batch_embeddings, dim)?;
			let schema = record_batch.schema();
			let reader = Box::new(RecordBatchIterator::new(vec![Ok(record_batch)].into_iter(), schema));
			let mut mi = table.merge_insert(&["id"]);
			mi.when_matched_update_all(None).when_not_matched_insert_all();
			mi.execute(reader).await.map_err(lance_err)?;
		}
		tracing::debug!(collection_id, chunks = chunks.len(), "vector upsert complete");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use ragway_core::types::ChunkMetadata;

	fn chunk(id: &str) -> Chunk {
		Chunk {
			id: id.into(),
			content: "text".into(),
			metadata: ChunkMetadata {
				document_id: "d".into(),
				document_name: "d.txt".into(),
				document_part: 2,
				collection_id: "c".into(),
				created_at: chrono::Utc::now(),
				extra: Default::default(),
			},
		}
	}

	#[test]
	fn batch_has_one_row_per_chunk() {
		let rb = chunks_to_record_batch(&[chunk("a"), chunk("b")], &[vec![0.5; 4], vec![0.1; 4]], 4).expect("batch");
		assert_eq!(rb.num_rows(), 2);
		assert_eq!(rb.num_columns(), 9);
	}

	#[test]
	fn wrong_dimension_is_rejected() {
		let err = chunks_to_record_batch(&[chunk("a")], &[vec![0.5; 3]], 4).unwrap_err();
		assert!(matches!(err, Error::InvalidInput(_)));
	}
}
