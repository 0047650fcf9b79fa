//! Reciprocal rank fusion.
//!
//! Each list contributes `1 / (rrf_k + rank + 1)` to a chunk's fused score,
//! rank 0 being the top hit. Raw backend scores are ignored, which is what
//! makes BM25 and cosine lists mergeable at all.

use std::collections::HashMap;

use ragway_core::error::{Error, Result};
use ragway_core::types::SearchResult;

pub const DEFAULT_RRF_K: f64 = 20.0;

/// Merge ranked lists into one.
///
/// Chunks are identified by `(collection_id, id)`. A chunk seen again in a
/// later list gets that list's method tag appended. Ties keep first-seen
/// order. The output is truncated to `k` unless `k` is zero.
pub fn fuse(lists: Vec<Vec<SearchResult>>, k: usize, rrf_k: f64) -> Result<Vec<SearchResult>> {
    if !rrf_k.is_finite() || rrf_k <= 0.0 {
        return Err(Error::InvalidConfig(format!("rrf_k must be a positive number, got {rrf_k}")));
    }
    let mut fused: Vec<SearchResult> = Vec::new();
    let mut position: HashMap<(String, String), usize> = HashMap::new();
    for list in lists {
        for (rank, result) in list.into_iter().enumerate() {
            let contribution = 1.0 / (rrf_k + rank as f64 + 1.0);
            let key = (result.chunk.metadata.collection_id.clone(), result.chunk.id.clone());
            match position.get(&key) {
                Some(&at) => {
                    let entry = &mut fused[at];
                    entry.score += contribution;
                    entry.method.append(&result.method);
                }
                None => {
                    position.insert(key, fused.len());
                    fused.push(SearchResult { score: contribution, ..result });
                }
            }
        }
    }
    // sort_by is stable
    fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    if k > 0 {
        fused.truncate(k);
    }
    Ok(fused)
}
