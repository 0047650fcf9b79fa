//! ragway-text
//!
//! Tantivy-based lexical store: one index per collection, BM25 ranking with
//! fuzzy term matching for short queries.

pub mod index;
pub mod search;
pub mod tantivy_utils;

pub use index::LexicalStore;
