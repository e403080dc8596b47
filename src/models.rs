//! Core data models used throughout Content Forge.
//!
//! These types represent the content items, chunks, and responses that flow
//! through the ingestion, retrieval, and assembly pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An externally-owned piece of ingested content.
#[derive(Debug, Clone)]
pub struct ContentItem {
    pub id: String,
    pub text: String,
    pub domain: String,
    pub content_type: String,
}

/// The retrieval unit: a bounded text window derived from a content item.
///
/// The embedding is set at most once; re-embedding produces a logically new
/// chunk via [`Chunk::with_embedding`] rather than mutating in place.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub content_id: String,
    /// Position within the parent content, contiguous from 0.
    pub ordinal: i64,
    pub text: String,
    pub embedding: Option<Vec<f32>>,
    pub domain: String,
    pub content_type: String,
    /// SHA-256 of the chunk text, for staleness detection.
    pub hash: String,
}

impl Chunk {
    /// Returns a new chunk carrying the given embedding vector.
    pub fn with_embedding(self, vector: Vec<f32>) -> Chunk {
        Chunk {
            embedding: Some(vector),
            ..self
        }
    }
}

/// Optional domain / content-type constraints applied to storage queries.
#[derive(Debug, Clone, Default)]
pub struct ChunkFilters {
    pub domain: Option<String>,
    pub content_type: Option<String>,
}

impl ChunkFilters {
    pub fn domain(domain: impl Into<String>) -> Self {
        Self {
            domain: Some(domain.into()),
            content_type: None,
        }
    }

    pub fn matches_content(&self, item: &ContentItem) -> bool {
        self.domain.as_deref().map_or(true, |d| d == item.domain)
            && self
                .content_type
                .as_deref()
                .map_or(true, |t| t == item.content_type)
    }

    pub fn matches_chunk(&self, chunk: &Chunk) -> bool {
        self.domain.as_deref().map_or(true, |d| d == chunk.domain)
            && self
                .content_type
                .as_deref()
                .map_or(true, |t| t == chunk.content_type)
    }
}

/// A chunk returned from retrieval, scored against one query.
///
/// Ephemeral, per-call only. The similarity semantic differs between the
/// vector and lexical paths; "higher is better" holds only within one call.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub similarity: f64,
    pub query: String,
}

/// Truncated chunk view attached to a [`GeneratedResponse`] for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPreview {
    pub content_id: String,
    pub ordinal: i64,
    pub text: String,
    pub similarity: f64,
}

/// Outcome tag carried on every response.
///
/// The absence states are not errors — they are first-class response states
/// that turn an opaque "nothing came back" into an actionable signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Ok,
    /// Nothing was ever ingested for the requested scope.
    NoContent,
    /// Content exists but was never processed into chunks.
    NoChunks,
    /// Chunks exist but none matched the query.
    NoRelevantChunks,
    /// Availability could not be determined.
    Unknown,
}

impl ResponseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseStatus::Ok => "ok",
            ResponseStatus::NoContent => "no_content",
            ResponseStatus::NoChunks => "no_chunks",
            ResponseStatus::NoRelevantChunks => "no_relevant_chunks",
            ResponseStatus::Unknown => "unknown",
        }
    }
}

/// Delivery metadata attached to every response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub platform: String,
    pub tone: String,
    pub query: String,
    /// ISO-8601 UTC timestamp.
    pub generated_at: String,
}

impl ResponseMetadata {
    pub fn new(platform: &str, tone: &str, query: &str, now: DateTime<Utc>) -> Self {
        Self {
            platform: platform.to_string(),
            tone: tone.to_string(),
            query: query.to_string(),
            generated_at: now.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        }
    }
}

/// The assembled response returned to the caller.
///
/// Ephemeral unless the caller persists it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedResponse {
    pub text: String,
    pub source_chunks: Vec<ChunkPreview>,
    pub template_id: String,
    pub status: ResponseStatus,
    /// Assembly failure detail; `None` on the happy path.
    pub error: Option<String>,
    pub metadata: ResponseMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_chunk(domain: &str, content_type: &str) -> Chunk {
        Chunk {
            id: "c1".to_string(),
            content_id: "doc1".to_string(),
            ordinal: 0,
            text: "hello".to_string(),
            embedding: None,
            domain: domain.to_string(),
            content_type: content_type.to_string(),
            hash: String::new(),
        }
    }

    #[test]
    fn test_with_embedding_produces_new_chunk() {
        let chunk = sample_chunk("acme.com", "article");
        assert!(chunk.embedding.is_none());
        let embedded = chunk.with_embedding(vec![0.1, 0.2]);
        assert_eq!(embedded.embedding.as_deref(), Some(&[0.1f32, 0.2][..]));
    }

    #[test]
    fn test_empty_filters_match_everything() {
        let filters = ChunkFilters::default();
        assert!(filters.matches_chunk(&sample_chunk("a", "b")));
    }

    #[test]
    fn test_domain_filter() {
        let filters = ChunkFilters::domain("acme.com");
        assert!(filters.matches_chunk(&sample_chunk("acme.com", "article")));
        assert!(!filters.matches_chunk(&sample_chunk("other.com", "article")));
    }

    #[test]
    fn test_status_tags_serialize_snake_case() {
        let json = serde_json::to_string(&ResponseStatus::NoRelevantChunks).unwrap();
        assert_eq!(json, "\"no_relevant_chunks\"");
        assert_eq!(ResponseStatus::NoContent.as_str(), "no_content");
    }
}
