//! In-memory [`ChunkStore`] implementation for tests and embedded use.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! Vector search is brute-force cosine similarity over all stored vectors;
//! lexical search scores by query-term overlap. Failure-injection switches
//! let tests exercise the pipeline's degradation paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{Chunk, ChunkFilters, ContentItem};

use super::{ChunkStore, ScoredChunk};

/// In-memory store backing the test suite.
pub struct InMemoryStore {
    contents: RwLock<HashMap<String, ContentItem>>,
    chunks: RwLock<Vec<Chunk>>,
    text_search_enabled: bool,
    fail_vector_search: AtomicBool,
    fail_store_chunks: AtomicBool,
    fail_existence_checks: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            contents: RwLock::new(HashMap::new()),
            chunks: RwLock::new(Vec::new()),
            text_search_enabled: true,
            fail_vector_search: AtomicBool::new(false),
            fail_store_chunks: AtomicBool::new(false),
            fail_existence_checks: AtomicBool::new(false),
        }
    }

    /// A store without the lexical-search capability.
    pub fn without_text_search() -> Self {
        Self {
            text_search_enabled: false,
            ..Self::new()
        }
    }

    pub fn insert_content(&self, item: ContentItem) {
        self.contents.write().unwrap().insert(item.id.clone(), item);
    }

    /// Make every vector search return an error until cleared.
    pub fn set_fail_vector_search(&self, fail: bool) {
        self.fail_vector_search.store(fail, Ordering::SeqCst);
    }

    /// Make every chunk write return an error until cleared.
    pub fn set_fail_store_chunks(&self, fail: bool) {
        self.fail_store_chunks.store(fail, Ordering::SeqCst);
    }

    /// Make existence checks and chunk counts return errors until cleared.
    pub fn set_fail_existence_checks(&self, fail: bool) {
        self.fail_existence_checks.store(fail, Ordering::SeqCst);
    }

    pub fn stored_chunks(&self) -> Vec<Chunk> {
        self.chunks.read().unwrap().clone()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChunkStore for InMemoryStore {
    async fn get_content(&self, id: &str) -> Result<Option<ContentItem>> {
        Ok(self.contents.read().unwrap().get(id).cloned())
    }

    async fn store_chunks(&self, batch: &[Chunk]) -> Result<()> {
        if self.fail_store_chunks.load(Ordering::SeqCst) {
            bail!("injected store_chunks failure");
        }
        let mut chunks = self.chunks.write().unwrap();
        for chunk in batch {
            // Dedupe by (content_id, ordinal) so re-ingestion replaces.
            chunks.retain(|c| !(c.content_id == chunk.content_id && c.ordinal == chunk.ordinal));
            chunks.push(chunk.clone());
        }
        Ok(())
    }

    async fn search_by_vector(
        &self,
        query_vec: &[f32],
        top_k: usize,
        filters: &ChunkFilters,
    ) -> Result<Vec<ScoredChunk>> {
        if self.fail_vector_search.load(Ordering::SeqCst) {
            bail!("injected vector search failure");
        }
        let chunks = self.chunks.read().unwrap();
        let mut candidates: Vec<ScoredChunk> = chunks
            .iter()
            .filter(|c| filters.matches_chunk(c))
            .filter_map(|c| {
                let embedding = c.embedding.as_ref()?;
                let sim = cosine_similarity(query_vec, embedding) as f64;
                Some(ScoredChunk {
                    chunk: c.clone(),
                    raw_score: sim,
                })
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.raw_score
                .partial_cmp(&a.raw_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(top_k);
        Ok(candidates)
    }

    async fn search_by_text(
        &self,
        query: &str,
        top_k: usize,
        filters: &ChunkFilters,
    ) -> Result<Vec<ScoredChunk>> {
        let query_lower = query.to_lowercase();
        let terms: Vec<&str> = query_lower.split_whitespace().collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let chunks = self.chunks.read().unwrap();
        let mut candidates: Vec<ScoredChunk> = chunks
            .iter()
            .filter(|c| filters.matches_chunk(c))
            .filter_map(|c| {
                let text_lower = c.text.to_lowercase();
                let matches = terms.iter().filter(|t| text_lower.contains(*t)).count();
                if matches > 0 {
                    Some(ScoredChunk {
                        chunk: c.clone(),
                        raw_score: matches as f64 / terms.len() as f64,
                    })
                } else {
                    None
                }
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.raw_score
                .partial_cmp(&a.raw_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(top_k);
        Ok(candidates)
    }

    fn supports_text_search(&self) -> bool {
        self.text_search_enabled
    }

    async fn content_exists(&self, filters: &ChunkFilters) -> Result<bool> {
        if self.fail_existence_checks.load(Ordering::SeqCst) {
            bail!("injected existence check failure");
        }
        let contents = self.contents.read().unwrap();
        Ok(contents.values().any(|item| filters.matches_content(item)))
    }

    async fn chunk_count(&self) -> Result<u64> {
        if self.fail_existence_checks.load(Ordering::SeqCst) {
            bail!("injected chunk count failure");
        }
        Ok(self.chunks.read().unwrap().len() as u64)
    }
}
