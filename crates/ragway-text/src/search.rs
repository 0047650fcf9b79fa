use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, FuzzyTermQuery, Occur, Query, QueryParser};
use tantivy::{TantivyDocument, Term};

use ragway_core::error::Result;
use ragway_core::types::{Chunk, CollectionId};

use crate::index::{tantivy_err, CollectionIndex, LexicalStore};
use crate::tantivy_utils::analyze;

/// Queries with at most this many terms also match terms one edit away.
pub const FUZZY_MAX_TERMS: usize = 3;
/// Terms shorter than this are never fuzzed; one edit on "ai" matches everything.
pub const FUZZY_MIN_TERM_CHARS: usize = 4;

impl LexicalStore {
	/// BM25 search over each collection, merged by score and cut to `k`.
	///
	/// A collection without a lexical index contributes nothing.
	pub fn search(&self, collection_ids: &[CollectionId], text: &str, k: usize) -> Result<Vec<(Chunk, f32)>> {
		let mut hits = Vec::new();
		for collection_id in collection_ids {
			let index = match self.collection(collection_id) {
				Ok(index) => index,
				Err(ragway_core::Error::NotFound(what)) => {
					tracing::debug!(%what, "skipping collection without lexical index");
					continue;
				}
				Err(e) => return Err(e),
			};
			hits.extend(search_one(&index, text, k)?);
		}
		hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
		hits.truncate(k);
		Ok(hits)
	}
}

fn search_one(index: &CollectionIndex, text: &str, k: usize) -> Result<Vec<(Chunk, f32)>> {
	if k == 0 { return Ok(vec![]); }
	let query = build_query(index, text);
	let searcher = index.reader.searcher();
	let top_docs = searcher.search(&query, &TopDocs::with_limit(k)).map_err(tantivy_err)?;
	let mut hits = Vec::with_capacity(top_docs.len());
	for (score, addr) in top_docs {
		let doc: TantivyDocument = searcher.doc(addr).map_err(tantivy_err)?;
		hits.push((index.to_chunk(&doc), score));
	}
	Ok(hits)
}

/// The parsed query, OR-ed with per-term fuzzy matches for short queries.
///
/// Parsing is lenient: user text with stray quotes or colons still searches.
pub(crate) fn build_query(index: &CollectionIndex, text: &str) -> Box<dyn Query> {
	let content = index.fields.content;
	let parser = QueryParser::for_index(&index.index, vec![content]);
	let (parsed, errors) = parser.parse_query_lenient(text);
	if !errors.is_empty() {
		tracing::debug!(errors = errors.len(), "lenient query parse dropped clauses");
	}
	let terms = analyze(text);
	if terms.is_empty() || terms.len() > FUZZY_MAX_TERMS {
		return parsed;
	}
	let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![(Occur::Should, parsed)];
	for term in terms.iter().filter(|t| t.chars().count() >= FUZZY_MIN_TERM_CHARS) {
		let fuzzy = FuzzyTermQuery::new(Term::from_field_text(content, term), 1, true);
		clauses.push((Occur::Should, Box::new(fuzzy)));
	}
	if clauses.len() == 1 {
		return clauses.remove(0).1;
	}
	Box::new(BooleanQuery::new(clauses))
}
