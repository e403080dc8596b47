//! Retrieval engine: vector-first ranked retrieval with lexical fallback.
//!
//! Embeds the query, asks the active store for the top-k nearest chunks
//! under the given filters, and falls back to lexical search on the
//! relational store when the vector path yields nothing — which covers both
//! transient vector-index issues and meaningless-embedding cases from the
//! random tier.
//!
//! Any failure is caught, logged, and converted to an empty sequence;
//! callers cannot distinguish "no matches" from "error" via the return
//! value. The orchestrator disambiguates absence via its own existence
//! checks.

use anyhow::Result;
use tracing::warn;

use crate::embedding::Embedder;
use crate::models::{ChunkFilters, RetrievedChunk};
use crate::store::{Backend, ScoredChunk};

/// Return up to `top_k` chunks relevant to `query`, most similar first.
///
/// Vector-path similarities lie in `[0, 1]`; lexical scores are a relevance
/// proxy. "Higher is better" holds only within one call — never compare
/// scores across calls that may have taken different paths.
pub async fn retrieve(
    backend: &Backend,
    embedder: &dyn Embedder,
    query: &str,
    top_k: usize,
    filters: &ChunkFilters,
) -> Vec<RetrievedChunk> {
    match try_retrieve(backend, embedder, query, top_k, filters).await {
        Ok(results) => results,
        Err(e) => {
            warn!(%query, error = %e, "retrieval failed, returning empty result");
            Vec::new()
        }
    }
}

async fn try_retrieve(
    backend: &Backend,
    embedder: &dyn Embedder,
    query: &str,
    top_k: usize,
    filters: &ChunkFilters,
) -> Result<Vec<RetrievedChunk>> {
    let query_vec = embedder.embed_one(query).await?;

    let mut vector_path = true;
    let mut candidates = match backend
        .active()
        .search_by_vector(&query_vec, top_k, filters)
        .await
    {
        Ok(candidates) => candidates,
        Err(e) => {
            warn!(%query, error = %e, "vector search failed");
            Vec::new()
        }
    };

    if candidates.is_empty() && backend.relational.supports_text_search() {
        warn!(%query, "vector search yielded nothing, falling back to lexical search");
        candidates = backend
            .relational
            .search_by_text(query, top_k, filters)
            .await?;
        vector_path = false;
    }

    candidates.sort_by(|a, b| {
        b.raw_score
            .partial_cmp(&a.raw_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(candidates
        .into_iter()
        .map(|ScoredChunk { chunk, raw_score }| RetrievedChunk {
            chunk,
            similarity: if vector_path {
                raw_score.clamp(0.0, 1.0)
            } else {
                raw_score
            },
            query: query.to_string(),
        })
        .collect())
}
