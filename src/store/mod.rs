//! Storage abstraction for Content Forge.
//!
//! The [`ChunkStore`] trait defines the query/write contract the core
//! depends on; the storage engines themselves are collaborator-provided.
//! [`Backend`] pairs the always-present relational store with an optional
//! vector-capable store, which the pipeline prefers when configured and
//! falls back from when it misbehaves.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::models::{Chunk, ChunkFilters, ContentItem};

/// A candidate chunk returned from vector or lexical search.
///
/// Carries the backend's raw score (cosine similarity or a lexical
/// relevance proxy); the retrieval engine attaches query context and
/// normalizes ordering.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub raw_score: f64,
}

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get_content`](ChunkStore::get_content) | Fetch a content item by id |
/// | [`store_chunks`](ChunkStore::store_chunks) | Persist one batch of chunks |
/// | [`search_by_vector`](ChunkStore::search_by_vector) | Top-k nearest chunks by similarity |
/// | [`search_by_text`](ChunkStore::search_by_text) | Lexical search (optional capability) |
/// | [`content_exists`](ChunkStore::content_exists) | Existence check over content items |
/// | [`chunk_count`](ChunkStore::chunk_count) | Total number of stored chunks |
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Fetch a content item by its opaque id.
    async fn get_content(&self, id: &str) -> Result<Option<ContentItem>>;

    /// Persist one batch of chunks. Stores that dedupe should key on
    /// `(content_id, ordinal)`.
    async fn store_chunks(&self, batch: &[Chunk]) -> Result<()>;

    /// Return the top-k chunks nearest to `query_vec`, restricted to
    /// `filters`, most similar first.
    async fn search_by_vector(
        &self,
        query_vec: &[f32],
        top_k: usize,
        filters: &ChunkFilters,
    ) -> Result<Vec<ScoredChunk>>;

    /// Lexical search with the same filter semantics. Only meaningful when
    /// [`supports_text_search`](ChunkStore::supports_text_search) is true.
    async fn search_by_text(
        &self,
        query: &str,
        top_k: usize,
        filters: &ChunkFilters,
    ) -> Result<Vec<ScoredChunk>>;

    /// Whether this store exposes lexical search.
    fn supports_text_search(&self) -> bool {
        false
    }

    /// Whether any content item matches the filters.
    async fn content_exists(&self, filters: &ChunkFilters) -> Result<bool>;

    /// Total number of stored chunks, unfiltered.
    async fn chunk_count(&self) -> Result<u64>;
}

/// The configured pair of stores the pipeline runs against.
///
/// The relational store is authoritative and must always work; the vector
/// store is optional, and its failures degrade to the relational store
/// rather than aborting operations.
#[derive(Clone)]
pub struct Backend {
    pub relational: Arc<dyn ChunkStore>,
    pub vector: Option<Arc<dyn ChunkStore>>,
}

impl Backend {
    /// Backend with only the relational store; it serves every query.
    pub fn relational_only(relational: Arc<dyn ChunkStore>) -> Self {
        Self {
            relational,
            vector: None,
        }
    }

    /// Backend with a vector-capable store preferred for retrieval.
    pub fn with_vector(relational: Arc<dyn ChunkStore>, vector: Arc<dyn ChunkStore>) -> Self {
        Self {
            relational,
            vector: Some(vector),
        }
    }

    /// The store queried first for similarity search.
    pub fn active(&self) -> &Arc<dyn ChunkStore> {
        self.vector.as_ref().unwrap_or(&self.relational)
    }

    /// Total chunks across both stores.
    ///
    /// Ingestion lands each batch in exactly one store, so a single-store
    /// count under-reports a dual-store backend.
    pub async fn chunk_count(&self) -> Result<u64> {
        let mut total = self.relational.chunk_count().await?;
        if let Some(vector) = &self.vector {
            total += vector.chunk_count().await?;
        }
        Ok(total)
    }
}
