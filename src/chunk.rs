//! Sliding-window text chunker.
//!
//! Splits a content item's text into fixed-size character windows with a
//! configurable overlap, so boundary concepts rarely fall outside every
//! window. Consecutive chunks overlap by exactly `overlap` characters except
//! possibly the last; concatenating the chunks with the overlap removed
//! reconstructs the original text.
//!
//! Each chunk receives a v4 UUID, a SHA-256 hash of its text for staleness
//! detection, and the domain/content-type of its parent item.

use sha2::{Digest, Sha256};
use tracing::warn;
use uuid::Uuid;

use crate::models::{Chunk, ContentItem};

/// Split a content item into overlapping character-window chunks.
///
/// Returns chunks with contiguous ordinals starting at 0. Empty text yields
/// no chunks, as do degenerate parameters (`window == 0` or
/// `overlap >= window`, which would make the window unable to advance).
/// Operates on character boundaries, so multi-byte text is safe.
pub fn chunk_text(item: &ContentItem, window: usize, overlap: usize) -> Vec<Chunk> {
    if window == 0 || overlap >= window {
        warn!(window, overlap, "degenerate chunking parameters, producing no chunks");
        return Vec::new();
    }

    let chars: Vec<char> = item.text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let stride = window - overlap;
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut ordinal: i64 = 0;

    loop {
        let end = (start + window).min(chars.len());
        let text: String = chars[start..end].iter().collect();
        chunks.push(make_chunk(item, ordinal, &text));

        if end == chars.len() {
            break;
        }
        start += stride;
        ordinal += 1;
    }

    chunks
}

fn make_chunk(item: &ContentItem, ordinal: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        content_id: item.id.clone(),
        ordinal,
        text: text.to_string(),
        embedding: None,
        domain: item.domain.clone(),
        content_type: item.content_type.clone(),
        hash,
    }
}
