//! End-to-end orchestration.
//!
//! Sequences existence checks, retrieval, and assembly, mapping empty
//! outcomes to a stable taxonomy: `no_content` (nothing was ever ingested
//! for the scope), `no_chunks` (content exists but was never chunked),
//! `no_relevant_chunks` (chunks exist but none matched), and `unknown`
//! (availability could not be determined). A failed existence check is
//! treated as "unknown", never as "absent". No cross-stage retries.

use chrono::Utc;
use std::sync::Arc;
use tracing::warn;

use crate::assemble::Assembler;
use crate::config::PipelineConfig;
use crate::embedding::Embedder;
use crate::models::{ChunkFilters, GeneratedResponse, ResponseMetadata, ResponseStatus};
use crate::retrieve::retrieve;
use crate::store::Backend;
use crate::template::{TemplateStore, DEFAULT_TEMPLATE_ID};

/// The wired retrieval-and-generation core.
///
/// Request-scoped and stateless across calls; the only shared state is the
/// read-only resolved embedder, so any number of
/// [`process_and_generate`](Pipeline::process_and_generate) calls may run
/// concurrently.
pub struct Pipeline {
    pub backend: Backend,
    pub templates: Arc<dyn TemplateStore>,
    pub embedder: Arc<dyn Embedder>,
    pub config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        mut backend: Backend,
        templates: Arc<dyn TemplateStore>,
        embedder: Arc<dyn Embedder>,
        config: PipelineConfig,
    ) -> Self {
        if !config.store.use_vector && backend.vector.is_some() {
            warn!("store.use_vector is disabled, ignoring the attached vector store");
            backend.vector = None;
        }
        Self {
            backend,
            templates,
            embedder,
            config,
        }
    }

    /// Build a pipeline around the process-wide resolved embedder.
    ///
    /// Resolution happens lazily on the first call and is shared by every
    /// pipeline constructed this way; see [`crate::embedding::resolve`].
    pub async fn with_resolved_embedder(
        backend: Backend,
        templates: Arc<dyn TemplateStore>,
        config: PipelineConfig,
    ) -> Self {
        let embedder = crate::embedding::resolve(&config.embedding).await;
        Self::new(backend, templates, embedder, config)
    }

    /// Ingest one content item; see [`crate::ingest::ingest`].
    pub async fn ingest(&self, content_id: &str) -> bool {
        crate::ingest::ingest(&self.backend, &self.config, self.embedder.as_ref(), content_id)
            .await
    }

    /// Retrieve ranked chunks; see [`crate::retrieve::retrieve`].
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        filters: &ChunkFilters,
    ) -> Vec<crate::models::RetrievedChunk> {
        retrieve(&self.backend, self.embedder.as_ref(), query, top_k, filters).await
    }

    /// The end-to-end entry point: locate relevant chunks and assemble a
    /// templated response, or diagnose why nothing came back.
    ///
    /// `top_k` defaults to the configured retrieval top-k when `None`.
    pub async fn process_and_generate(
        &self,
        query: &str,
        platform: &str,
        tone: &str,
        filters: &ChunkFilters,
        top_k: Option<usize>,
    ) -> GeneratedResponse {
        let top_k = top_k.unwrap_or(self.config.retrieval.top_k);

        // Existence check first: if nothing was ever ingested for the scope,
        // retrieval would only produce misleading messaging.
        let content_known = match self.backend.relational.content_exists(filters).await {
            Ok(exists) => Some(exists),
            Err(e) => {
                warn!(error = %e, "content existence check failed, treating as unknown");
                None
            }
        };
        if content_known == Some(false) {
            return absence_response(ResponseStatus::NoContent, query, platform, tone);
        }

        let chunks = self.retrieve(query, top_k, filters).await;

        if chunks.is_empty() {
            // Second, independent check over chunks to disambiguate the
            // empty result. Counts span both stores: ingestion may have
            // landed every batch in the vector store.
            let chunk_total = match self.backend.chunk_count().await {
                Ok(n) => Some(n),
                Err(e) => {
                    warn!(error = %e, "chunk count check failed, treating as unknown");
                    None
                }
            };
            let status = match (content_known, chunk_total) {
                (_, Some(n)) if n > 0 => ResponseStatus::NoRelevantChunks,
                (Some(true), Some(_)) => ResponseStatus::NoChunks,
                _ => ResponseStatus::Unknown,
            };
            return absence_response(status, query, platform, tone);
        }

        Assembler::new(self.templates.as_ref(), &self.config.assembly)
            .assemble(query, platform, tone, &chunks)
            .await
    }
}

fn absence_response(
    status: ResponseStatus,
    query: &str,
    platform: &str,
    tone: &str,
) -> GeneratedResponse {
    let text = match status {
        ResponseStatus::NoContent => {
            "No content has been ingested for the requested scope yet."
        }
        ResponseStatus::NoChunks => {
            "Content exists but has not been processed into searchable chunks yet."
        }
        ResponseStatus::NoRelevantChunks => "No ingested content matched this query.",
        _ => "Content availability could not be determined.",
    };
    GeneratedResponse {
        text: text.to_string(),
        source_chunks: Vec::new(),
        template_id: DEFAULT_TEMPLATE_ID.to_string(),
        status,
        error: None,
        metadata: ResponseMetadata::new(platform, tone, query, Utc::now()),
    }
}
