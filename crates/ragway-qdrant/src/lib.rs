//! ragway-qdrant
//!
//! Qdrant adapter for the `SearchBackend` seam. Dense vectors only.

pub mod backend;
pub mod payload;

pub use backend::{QdrantBackend, QdrantSettings};
