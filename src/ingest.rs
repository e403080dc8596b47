//! Chunk ingestion pipeline.
//!
//! Turns a content item into embedded, stored chunks: fetch → chunk →
//! embed in batches → persist per batch. Batching bounds memory and
//! isolates per-batch failure; a batch whose embedding fails is stored
//! without vectors (still lexically searchable), and a batch the vector
//! store rejects falls back to the relational store rather than aborting
//! the whole ingestion.

use anyhow::Result;
use tracing::warn;

use crate::chunk::chunk_text;
use crate::config::PipelineConfig;
use crate::embedding::Embedder;
use crate::models::Chunk;
use crate::store::Backend;

/// Ingest one content item end to end.
///
/// Returns `false` when the content is absent or any batch was lost; every
/// failure is caught and logged, never propagated. Re-invoking is the retry
/// mechanism — idempotent in effect when the store dedupes by
/// `(content_id, ordinal)`.
pub async fn ingest(
    backend: &Backend,
    config: &PipelineConfig,
    embedder: &dyn Embedder,
    content_id: &str,
) -> bool {
    match try_ingest(backend, config, embedder, content_id).await {
        Ok(ok) => ok,
        Err(e) => {
            warn!(%content_id, error = %e, "ingestion failed");
            false
        }
    }
}

async fn try_ingest(
    backend: &Backend,
    config: &PipelineConfig,
    embedder: &dyn Embedder,
    content_id: &str,
) -> Result<bool> {
    let item = match backend.relational.get_content(content_id).await? {
        Some(item) => item,
        None => {
            warn!(%content_id, "content not found, nothing to ingest");
            return Ok(false);
        }
    };

    let chunks = chunk_text(&item, config.chunking.window, config.chunking.overlap);
    let mut all_persisted = true;

    for batch in chunks.chunks(config.ingestion.batch_size) {
        let embedded = embed_batch(embedder, batch).await;
        if !store_batch(backend, &embedded).await {
            all_persisted = false;
        }
    }

    Ok(all_persisted)
}

/// Attach embeddings to one batch. Embedding failure is non-fatal: the
/// batch is kept without vectors so lexical retrieval still covers it.
async fn embed_batch(embedder: &dyn Embedder, batch: &[Chunk]) -> Vec<Chunk> {
    let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
    match embedder.embed(&texts).await {
        Ok(vectors) if vectors.len() == batch.len() => batch
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(chunk, vector)| chunk.with_embedding(vector))
            .collect(),
        Ok(vectors) => {
            warn!(
                expected = batch.len(),
                got = vectors.len(),
                "embedding batch size mismatch, storing batch without vectors"
            );
            batch.to_vec()
        }
        Err(e) => {
            warn!(error = %e, "batch embedding failed, storing batch without vectors");
            batch.to_vec()
        }
    }
}

/// Persist one batch, preferring the vector store when configured and
/// falling back to the relational store on failure.
async fn store_batch(backend: &Backend, batch: &[Chunk]) -> bool {
    if let Some(vector_store) = &backend.vector {
        match vector_store.store_chunks(batch).await {
            Ok(()) => return true,
            Err(e) => {
                warn!(error = %e, "vector store write failed, falling back to relational store");
            }
        }
    }
    match backend.relational.store_chunks(batch).await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "relational store write failed, batch lost");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::TermFrequencyEmbedder;
    use crate::models::ContentItem;
    use crate::store::memory::InMemoryStore;
    use crate::store::ChunkStore;
    use std::sync::Arc;

    fn content(id: &str, text: &str) -> ContentItem {
        ContentItem {
            id: id.to_string(),
            text: text.to_string(),
            domain: "acme.com".to_string(),
            content_type: "article".to_string(),
        }
    }

    #[tokio::test]
    async fn test_ingest_embeds_and_stores() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_content(content("doc1", &"word ".repeat(300)));
        let backend = Backend::relational_only(store.clone());
        let config = PipelineConfig::default();
        let embedder = TermFrequencyEmbedder::new(64);

        assert!(ingest(&backend, &config, &embedder, "doc1").await);

        let stored = store.stored_chunks();
        assert!(stored.len() > 1);
        assert!(stored.iter().all(|c| c.embedding.is_some()));
        let dims: Vec<usize> = stored
            .iter()
            .map(|c| c.embedding.as_ref().unwrap().len())
            .collect();
        assert!(dims.iter().all(|d| *d == 64));
    }

    #[tokio::test]
    async fn test_ingest_missing_content_returns_false() {
        let store = Arc::new(InMemoryStore::new());
        let backend = Backend::relational_only(store);
        let config = PipelineConfig::default();
        let embedder = TermFrequencyEmbedder::new(64);

        assert!(!ingest(&backend, &config, &embedder, "ghost").await);
    }

    #[tokio::test]
    async fn test_ingest_empty_text_stores_nothing() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_content(content("doc1", ""));
        let backend = Backend::relational_only(store.clone());
        let config = PipelineConfig::default();
        let embedder = TermFrequencyEmbedder::new(64);

        assert!(ingest(&backend, &config, &embedder, "doc1").await);
        assert_eq!(store.chunk_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_vector_store_failure_falls_back_to_relational() {
        let relational = Arc::new(InMemoryStore::new());
        let vector = Arc::new(InMemoryStore::new());
        vector.set_fail_store_chunks(true);
        relational.insert_content(content("doc1", "short text to ingest"));
        let backend = Backend::with_vector(relational.clone(), vector.clone());
        let config = PipelineConfig::default();
        let embedder = TermFrequencyEmbedder::new(64);

        assert!(ingest(&backend, &config, &embedder, "doc1").await);
        assert_eq!(vector.chunk_count().await.unwrap(), 0);
        assert_eq!(relational.chunk_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_both_stores_failing_returns_false() {
        let relational = Arc::new(InMemoryStore::new());
        relational.insert_content(content("doc1", "short text to ingest"));
        relational.set_fail_store_chunks(true);
        let backend = Backend::relational_only(relational);
        let config = PipelineConfig::default();
        let embedder = TermFrequencyEmbedder::new(64);

        assert!(!ingest(&backend, &config, &embedder, "doc1").await);
    }

    #[tokio::test]
    async fn test_reingest_does_not_duplicate() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_content(content("doc1", &"alpha beta ".repeat(100)));
        let backend = Backend::relational_only(store.clone());
        let config = PipelineConfig::default();
        let embedder = TermFrequencyEmbedder::new(64);

        assert!(ingest(&backend, &config, &embedder, "doc1").await);
        let first_count = store.chunk_count().await.unwrap();
        assert!(ingest(&backend, &config, &embedder, "doc1").await);
        assert_eq!(store.chunk_count().await.unwrap(), first_count);
    }
}
