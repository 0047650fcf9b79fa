use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer, TokenStream};
use tantivy::Index;

pub const TOKENIZER_NAME: &str = "text_with_stopwords";

/// Field handles of the chunk schema, resolved once per open index.
#[derive(Debug, Clone, Copy)]
pub struct ChunkFields {
	pub chunk_id: Field,
	pub document_id: Field,
	pub document_name: Field,
	pub document_part: Field,
	pub collection_id: Field,
	pub created_at: Field,
	pub extra: Field,
	pub content: Field,
}

impl ChunkFields {
	pub fn resolve(schema: &Schema) -> tantivy::Result<Self> {
		Ok(Self {
			chunk_id: schema.get_field("chunk_id")?,
			document_id: schema.get_field("document_id")?,
			document_name: schema.get_field("document_name")?,
			document_part: schema.get_field("document_part")?,
			collection_id: schema.get_field("collection_id")?,
			created_at: schema.get_field("created_at")?,
			extra: schema.get_field("extra")?,
			content: schema.get_field("content")?,
		})
	}
}

pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	schema_builder.add_text_field("chunk_id", STRING | STORED);
	schema_builder.add_text_field("document_id", STRING | STORED);
	schema_builder.add_text_field("document_name", STRING | STORED);
	schema_builder.add_u64_field("document_part", STORED);
	schema_builder.add_text_field("collection_id", STRING | STORED);
	schema_builder.add_text_field("created_at", STORED);
	schema_builder.add_text_field("extra", STORED);
	let text_field_indexing = TextFieldIndexing::default().set_tokenizer(TOKENIZER_NAME).set_index_option(IndexRecordOption::WithFreqsAndPositions);
	let text_options = TextOptions::default().set_indexing_options(text_field_indexing).set_stored();
	schema_builder.add_text_field("content", text_options);
	schema_builder.build()
}

pub fn register_tokenizer(index: &Index) {
	index.tokenizers().register(TOKENIZER_NAME, build_analyzer());
}

pub fn build_analyzer() -> TextAnalyzer {
	let stop_words = vec![
		"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
	];
	TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(stop_words.into_iter().map(|s| s.to_string())))
		.build()
}

/// Run `text` through the index analyzer and return the surviving terms.
pub fn analyze(text: &str) -> Vec<String> {
	let mut analyzer = build_analyzer();
	let mut stream = analyzer.token_stream(text);
	let mut terms = Vec::new();
	while stream.advance() {
		terms.push(stream.token().text.clone());
	}
	terms
}
