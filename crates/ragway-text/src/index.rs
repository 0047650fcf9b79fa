use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tantivy::collector::Count;
use tantivy::directory::MmapDirectory;
use tantivy::query::TermQuery;
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

use ragway_core::error::{Error, Result};
use ragway_core::types::{validate_collection_id, Chunk, ChunkMetadata, CollectionId, Meta};

use crate::tantivy_utils::{build_schema, register_tokenizer, ChunkFields};

const WRITER_MEMORY_BYTES: usize = 50_000_000;

pub(crate) fn tantivy_err(err: impl std::fmt::Display) -> Error {
	Error::backend("tantivy", err)
}

/// One open tantivy index holding the chunks of a single collection.
pub(crate) struct CollectionIndex {
	pub(crate) index: Index,
	pub(crate) reader: IndexReader,
	writer: Mutex<IndexWriter>,
	pub(crate) fields: ChunkFields,
}

impl CollectionIndex {
	fn open_or_create(dir: &Path) -> Result<Self> {
		std::fs::create_dir_all(dir).map_err(tantivy_err)?;
		let directory = MmapDirectory::open(dir).map_err(tantivy_err)?;
		let index = Index::open_or_create(directory, build_schema()).map_err(tantivy_err)?;
		register_tokenizer(&index);
		let fields = ChunkFields::resolve(&index.schema()).map_err(tantivy_err)?;
		let reader: IndexReader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into().map_err(tantivy_err)?;
		let writer = index.writer(WRITER_MEMORY_BYTES).map_err(tantivy_err)?;
		Ok(Self { index, reader, writer: Mutex::new(writer), fields })
	}

	fn commit(&self, writer: &mut IndexWriter) -> Result<()> {
		writer.commit().map_err(tantivy_err)?;
		self.reader.reload().map_err(tantivy_err)
	}

	fn to_document(&self, chunk: &Chunk) -> Result<TantivyDocument> {
		let f = &self.fields;
		let extra = serde_json::to_string(&chunk.metadata.extra).map_err(|e| Error::Operation(e.to_string()))?;
		Ok(doc!(
			f.chunk_id => chunk.id.clone(),
			f.document_id => chunk.metadata.document_id.clone(),
			f.document_name => chunk.metadata.document_name.clone(),
			f.document_part => u64::from(chunk.metadata.document_part),
			f.collection_id => chunk.metadata.collection_id.clone(),
			f.created_at => chunk.metadata.created_at.to_rfc3339(),
			f.extra => extra,
			f.content => chunk.content.clone(),
		))
	}

	pub(crate) fn to_chunk(&self, doc: &TantivyDocument) -> Chunk {
		let f = &self.fields;
		let text = |field: tantivy::schema::Field| doc.get_first(field).and_then(|v| v.as_str()).unwrap_or_default().to_string();
		let created_at = DateTime::parse_from_rfc3339(&text(f.created_at))
			.map(|d| d.with_timezone(&Utc))
			.unwrap_or_default();
		let extra: Meta = serde_json::from_str(&text(f.extra)).unwrap_or_default();
		let document_part = doc.get_first(f.document_part).and_then(|v| v.as_u64()).unwrap_or_default();
		Chunk {
			id: text(f.chunk_id),
			content: text(f.content),
			metadata: ChunkMetadata {
				document_id: text(f.document_id),
				document_name: text(f.document_name),
				document_part: u32::try_from(document_part).unwrap_or(u32::MAX),
				collection_id: text(f.collection_id),
				created_at,
				extra,
			},
		}
	}
}

/// Full-text store with one tantivy index directory per collection under `root`.
///
/// All methods block; async callers run them on the blocking pool.
pub struct LexicalStore {
	root: PathBuf,
	open: RwLock<HashMap<CollectionId, Arc<CollectionIndex>>>,
}

impl LexicalStore {
	pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
		let root = root.into();
		std::fs::create_dir_all(&root).map_err(tantivy_err)?;
		Ok(Self { root, open: RwLock::new(HashMap::new()) })
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	fn dir_for(&self, collection_id: &str) -> Result<PathBuf> {
		validate_collection_id(collection_id)?;
		Ok(self.root.join(collection_id))
	}

	pub fn create_collection(&self, collection_id: &str) -> Result<()> {
		let dir = self.dir_for(collection_id)?;
		let mut open = self.open.write();
		if !open.contains_key(collection_id) {
			let index = CollectionIndex::open_or_create(&dir)?;
			open.insert(collection_id.to_string(), Arc::new(index));
		}
		Ok(())
	}

	pub fn delete_collection(&self, collection_id: &str) -> Result<()> {
		let dir = self.dir_for(collection_id)?;
		self.open.write().remove(collection_id);
		if dir.exists() {
			std::fs::remove_dir_all(&dir).map_err(tantivy_err)?;
		}
		Ok(())
	}

	pub fn list_collections(&self) -> Result<Vec<CollectionId>> {
		let mut ids = Vec::new();
		for entry in std::fs::read_dir(&self.root).map_err(tantivy_err)? {
			let entry = entry.map_err(tantivy_err)?;
			if entry.file_type().map_err(tantivy_err)?.is_dir() {
				ids.push(entry.file_name().to_string_lossy().to_string());
			}
		}
		ids.sort();
		Ok(ids)
	}

	/// Open handle for a collection, opening it from disk on first use.
	pub(crate) fn collection(&self, collection_id: &str) -> Result<Arc<CollectionIndex>> {
		if let Some(index) = self.open.read().get(collection_id) {
			return Ok(index.clone());
		}
		let dir = self.dir_for(collection_id)?;
		if !dir.join("meta.json").exists() {
			return Err(Error::NotFound(format!("lexical index for collection '{collection_id}'")));
		}
		let mut open = self.open.write();
		if let Some(index) = open.get(collection_id) {
			return Ok(index.clone());
		}
		let index = Arc::new(CollectionIndex::open_or_create(&dir)?);
		open.insert(collection_id.to_string(), index.clone());
		Ok(index)
	}

	/// Replace-by-id: any stored chunk with the same id is removed first.
	pub fn upsert(&self, collection_id: &str, chunks: &[Chunk]) -> Result<()> {
		if chunks.is_empty() { return Ok(()); }
		let index = self.collection(collection_id)?;
		let mut writer = index.writer.lock();
		for chunk in chunks {
			writer.delete_term(Term::from_field_text(index.fields.chunk_id, &chunk.id));
			writer.add_document(index.to_document(chunk)?).map_err(tantivy_err)?;
		}
		index.commit(&mut writer)
	}

	pub fn delete_document(&self, collection_id: &str, document_id: &str) -> Result<()> {
		let index = self.collection(collection_id)?;
		let mut writer = index.writer.lock();
		writer.delete_term(Term::from_field_text(index.fields.document_id, document_id));
		index.commit(&mut writer)
	}

	pub fn count_document(&self, collection_id: &str, document_id: &str) -> Result<u64> {
		let index = self.collection(collection_id)?;
		let searcher = index.reader.searcher();
		let query = TermQuery::new(Term::from_field_text(index.fields.document_id, document_id), IndexRecordOption::Basic);
		let count = searcher.search(&query, &Count).map_err(tantivy_err)?;
		Ok(count as u64)
	}
}
