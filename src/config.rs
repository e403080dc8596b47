use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Top-level configuration for the retrieval-and-generation core.
///
/// Every section has serde defaults, so an empty TOML file (or
/// `PipelineConfig::default()`) yields a working configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct PipelineConfig {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub assembly: AssemblyConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Chunk window size in characters.
    #[serde(default = "default_window")]
    pub window: usize,
    /// Overlap between consecutive chunks in characters.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            overlap: default_overlap(),
        }
    }
}

fn default_window() -> usize {
    500
}
fn default_overlap() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestionConfig {
    /// Number of chunks embedded and persisted per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

fn default_batch_size() -> usize {
    32
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Default number of chunks returned per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct AssemblyConfig {
    /// Maximum number of extracted key points.
    #[serde(default = "default_max_key_points")]
    pub max_key_points: usize,
    /// Character length of chunk previews attached to responses.
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            max_key_points: default_max_key_points(),
            preview_chars: default_preview_chars(),
        }
    }
}

fn default_max_key_points() -> usize {
    5
}
fn default_preview_chars() -> usize {
    150
}

/// Embedding resolution settings.
///
/// `url`/`model` configure the remote (host-supplied) tier; `local_model`
/// names the tier-2 local model. Neither is required — the resolver always
/// ends with tiers that cannot fail.
#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// Remote embedding endpoint base URL (e.g. `http://localhost:11434`).
    #[serde(default)]
    pub url: Option<String>,
    /// Remote model name.
    #[serde(default)]
    pub model: Option<String>,
    /// Local sentence-embedding model name.
    #[serde(default = "default_local_model")]
    pub local_model: String,
    /// Vector dimensionality for the degraded tiers.
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_embed_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: None,
            model: None,
            local_model: default_local_model(),
            dims: default_dims(),
            batch_size: default_embed_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_local_model() -> String {
    "bge-base-en-v1.5".to_string()
}
fn default_dims() -> usize {
    768
}
fn default_embed_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    /// Whether the remote tier is configured at all.
    pub fn has_remote(&self) -> bool {
        self.url.is_some() && self.model.is_some()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Whether to search a vector-capable store attached to the
    /// [`Backend`](crate::store::Backend). When false the pipeline detaches
    /// any attached vector store and the relational store serves everything.
    #[serde(default = "default_use_vector")]
    pub use_vector: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            use_vector: default_use_vector(),
        }
    }
}

fn default_use_vector() -> bool {
    true
}

pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: PipelineConfig =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &PipelineConfig) -> Result<()> {
    if config.chunking.window == 0 {
        anyhow::bail!("chunking.window must be > 0");
    }
    if config.chunking.overlap >= config.chunking.window {
        anyhow::bail!("chunking.overlap must be < chunking.window");
    }
    if config.ingestion.batch_size == 0 {
        anyhow::bail!("ingestion.batch_size must be > 0");
    }
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.url.is_some() && config.embedding.model.is_none() {
        anyhow::bail!("embedding.model must be set when embedding.url is configured");
    }
    Ok(())
}
