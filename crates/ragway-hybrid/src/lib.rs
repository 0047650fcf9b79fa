//! ragway-hybrid
//!
//! Rank fusion and the query engine that decomposes hybrid searches.

pub mod engine;
pub mod rrf;

pub use engine::{HybridSearchEngine, SearchQuery, SearchSettings};
pub use rrf::{fuse, DEFAULT_RRF_K};
