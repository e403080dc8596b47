//! # Content Forge
//!
//! The retrieval-and-generation core of a content intelligence pipeline:
//! given a query and delivery parameters (target platform, tone), it locates
//! the most semantically relevant previously-ingested content fragments and
//! assembles a templated response grounded in them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────────┐
//! │   Content   │──▶│ Chunk+Embed  │──▶│   Storage     │
//! │  (caller)   │   │  (batched)   │   │ vector | rel. │
//! └─────────────┘   └──────────────┘   └──────┬────────┘
//!                                             │
//!                 ┌───────────────────────────┤
//!                 ▼                           ▼
//!           ┌──────────┐               ┌──────────────┐
//!           │ Retrieve │──────────────▶│   Assemble   │
//!           │ (top-k)  │               │ (templated)  │
//!           └──────────┘               └──────────────┘
//! ```
//!
//! Three independently-available subsystems — an embedding model that may or
//! may not be present, a vector-capable store that may or may not exist, and
//! a relational store that must always work — are reconciled into one
//! pipeline where at least one path always succeeds. Every degradation
//! (embedder tier fallback, store fallback, lexical retrieval fallback) is
//! logged via `tracing` so silent quality loss stays diagnosable.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`chunk`] | Sliding-window text chunking |
//! | [`embedding`] | Tiered embedding resolution |
//! | [`store`] | Storage contract and in-memory backend |
//! | [`template`] | Response templates |
//! | [`ingest`] | Chunk ingestion pipeline |
//! | [`retrieve`] | Vector-first retrieval with lexical fallback |
//! | [`assemble`] | Templated response assembly |
//! | [`pipeline`] | End-to-end orchestration |

pub mod assemble;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod ingest;
pub mod models;
pub mod pipeline;
pub mod retrieve;
pub mod store;
pub mod template;

pub use config::PipelineConfig;
pub use models::{ChunkFilters, GeneratedResponse, ResponseStatus, RetrievedChunk};
pub use pipeline::Pipeline;
pub use store::Backend;
