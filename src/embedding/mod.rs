//! Tiered embedding resolution.
//!
//! Obtains a text→vector function via an ordered fallback chain, first
//! success wins:
//!
//! 1. **[`RemoteTier`]** — host-supplied HTTP embedding endpoint, with
//!    batching, retry, and exponential backoff.
//! 2. **`LocalTier`** — local sentence-embedding model by name via fastembed
//!    (behind the `local-embeddings` feature); no network calls after the
//!    model download.
//! 3. **[`TermFrequencyTier`]** — deterministic hashed term-frequency
//!    vectors; degraded but stable.
//! 4. **[`RandomTier`]** — random unit vectors, guaranteeing the pipeline
//!    never blocks at the cost of meaningless similarity.
//!
//! Each tier failure is logged non-fatally and the selected tier is logged
//! at `info`, so silent degradation stays diagnosable. The resolved
//! [`Embedder`] is cached process-wide ([`resolve`]); initialization is
//! single-flight, and there is no background re-attempt at a higher tier
//! once a lower one is chosen.
//!
//! # Retry Strategy (remote tier)
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::config::EmbeddingConfig;

/// A resolved text→vector function.
///
/// Dimensionality is constant for the lifetime of one embedder; all chunks
/// embedded through it share the same vector length.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Which fallback tier produced this embedder.
    fn tier(&self) -> &'static str;
    /// Model identifier (e.g. `"bge-base-en-v1.5"`, `"term-frequency"`).
    fn model_name(&self) -> &str;
    /// Embedding vector dimensionality.
    fn dims(&self) -> usize;
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text (e.g. a search query).
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }
}

/// One candidate strategy in the fallback chain.
///
/// `build` either produces a working [`Embedder`] or fails, in which case
/// the chain moves on to the next tier. Tiers are independently testable.
#[async_trait]
pub trait EmbedderTier: Send + Sync {
    fn name(&self) -> &'static str;
    async fn build(&self) -> Result<Arc<dyn Embedder>>;
}

/// Try each tier in order and return the first embedder that builds.
///
/// Failures are logged and swallowed; the selected tier is logged at `info`.
pub async fn resolve_chain(tiers: &[Box<dyn EmbedderTier>]) -> Result<Arc<dyn Embedder>> {
    for tier in tiers {
        match tier.build().await {
            Ok(embedder) => {
                info!(
                    tier = tier.name(),
                    model = embedder.model_name(),
                    dims = embedder.dims(),
                    "embedding tier selected"
                );
                return Ok(embedder);
            }
            Err(e) => {
                warn!(tier = tier.name(), error = %e, "embedding tier unavailable, trying next");
            }
        }
    }
    bail!("no embedding tier could be resolved")
}

/// The standard tier order for a given configuration.
pub fn default_tiers(config: &EmbeddingConfig) -> Vec<Box<dyn EmbedderTier>> {
    let mut tiers: Vec<Box<dyn EmbedderTier>> = Vec::new();
    tiers.push(Box::new(RemoteTier::new(config)));
    #[cfg(feature = "local-embeddings")]
    tiers.push(Box::new(local::LocalTier::new(config)));
    tiers.push(Box::new(TermFrequencyTier::new(config.dims)));
    tiers.push(Box::new(RandomTier::new(config.dims)));
    tiers
}

static RESOLVED: OnceCell<Arc<dyn Embedder>> = OnceCell::const_new();

/// Resolve the process-wide embedder, lazily, exactly once.
///
/// Concurrent first callers share a single initialization; the result is
/// cached for the process lifetime and shared read-only afterwards. The
/// chain ends in a tier that cannot fail, so this never blocks the pipeline.
pub async fn resolve(config: &EmbeddingConfig) -> Arc<dyn Embedder> {
    RESOLVED
        .get_or_init(|| async {
            match resolve_chain(&default_tiers(config)).await {
                Ok(embedder) => embedder,
                Err(e) => {
                    warn!(error = %e, "all embedding tiers failed; using random vectors");
                    Arc::new(RandomEmbedder::new(config.dims)) as Arc<dyn Embedder>
                }
            }
        })
        .await
        .clone()
}

// ============ Tier 1: remote endpoint ============

/// Host-supplied HTTP embedding endpoint (Ollama-compatible `/api/embed`).
///
/// Build-time liveness probe: one short text is embedded; a dead endpoint
/// degrades at resolve time rather than on every call. Dimensionality is
/// taken from the probe response.
pub struct RemoteTier {
    config: EmbeddingConfig,
}

impl RemoteTier {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

#[async_trait]
impl EmbedderTier for RemoteTier {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn build(&self) -> Result<Arc<dyn Embedder>> {
        if !self.config.has_remote() {
            bail!("remote embedding endpoint not configured");
        }
        let url = self.config.url.clone().unwrap_or_default();
        let model = self.config.model.clone().unwrap_or_default();

        let probe = embed_remote(&self.config, &url, &model, &["ping".to_string()]).await?;
        let dims = probe
            .first()
            .map(|v| v.len())
            .filter(|d| *d > 0)
            .ok_or_else(|| anyhow::anyhow!("remote endpoint returned no embedding"))?;

        Ok(Arc::new(RemoteEmbedder {
            config: self.config.clone(),
            url,
            model,
            dims,
        }))
    }
}

struct RemoteEmbedder {
    config: EmbeddingConfig,
    url: String,
    model: String,
    dims: usize,
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    fn tier(&self) -> &'static str {
        "remote"
    }
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        embed_remote(&self.config, &self.url, &self.model, texts).await
    }
}

async fn embed_remote(
    config: &EmbeddingConfig,
    url: &str,
    model: &str,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let body = serde_json::json!({
        "model": model,
        "input": texts,
    });

    let mut last_err = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let resp = client
            .post(format!("{}/api/embed", url))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let json: serde_json::Value = response.json().await?;
                    return parse_remote_response(&json);
                }

                // Rate limited or server error — retry
                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow::anyhow!(
                        "embedding endpoint error {}: {}",
                        status,
                        body_text
                    ));
                    continue;
                }

                // Client error (not 429) — don't retry
                let body_text = response.text().await.unwrap_or_default();
                bail!("embedding endpoint error {}: {}", status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow::anyhow!(
                    "embedding endpoint connection error (is it running at {}?): {}",
                    url,
                    e
                ));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("remote embedding failed after retries")))
}

fn parse_remote_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid embedding response: missing embeddings array"))?;

    let mut result = Vec::with_capacity(embeddings.len());

    for embedding in embeddings {
        let vec: Vec<f32> = embedding
            .as_array()
            .ok_or_else(|| anyhow::anyhow!("Invalid embedding response: not an array"))?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        result.push(vec);
    }

    Ok(result)
}

// ============ Tier 2: local model (fastembed) ============

#[cfg(feature = "local-embeddings")]
mod local {
    use super::*;
    use std::sync::Mutex;

    /// Local sentence-embedding model, loaded once at build time.
    ///
    /// The model is downloaded on first use from Hugging Face and cached;
    /// after that, embedding runs entirely offline.
    pub struct LocalTier {
        config: EmbeddingConfig,
    }

    impl LocalTier {
        pub fn new(config: &EmbeddingConfig) -> Self {
            Self {
                config: config.clone(),
            }
        }
    }

    #[async_trait]
    impl EmbedderTier for LocalTier {
        fn name(&self) -> &'static str {
            "local"
        }

        async fn build(&self) -> Result<Arc<dyn Embedder>> {
            let model_name = self.config.local_model.clone();
            let dims = local_model_dims(&model_name);
            let fastembed_model = fastembed_model_for(&model_name)?;

            let model = tokio::task::spawn_blocking(move || {
                fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
                )
                .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))
            })
            .await??;

            Ok(Arc::new(LocalEmbedder {
                model: Arc::new(Mutex::new(model)),
                model_name,
                dims,
                batch_size: self.config.batch_size,
            }))
        }
    }

    struct LocalEmbedder {
        model: Arc<Mutex<fastembed::TextEmbedding>>,
        model_name: String,
        dims: usize,
        batch_size: usize,
    }

    #[async_trait]
    impl Embedder for LocalEmbedder {
        fn tier(&self) -> &'static str {
            "local"
        }
        fn model_name(&self) -> &str {
            &self.model_name
        }
        fn dims(&self) -> usize {
            self.dims
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let model = Arc::clone(&self.model);
            let texts = texts.to_vec();
            let batch_size = self.batch_size;

            tokio::task::spawn_blocking(move || {
                let mut model = model
                    .lock()
                    .map_err(|_| anyhow::anyhow!("local embedding model lock poisoned"))?;
                model
                    .embed(texts, Some(batch_size))
                    .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))
            })
            .await?
        }
    }

    fn local_model_dims(name: &str) -> usize {
        match name {
            "all-minilm-l6-v2" => 384,
            "bge-small-en-v1.5" => 384,
            "bge-base-en-v1.5" => 768,
            "bge-large-en-v1.5" => 1024,
            "nomic-embed-text-v1" | "nomic-embed-text-v1.5" => 768,
            "multilingual-e5-small" => 384,
            "multilingual-e5-base" => 768,
            "multilingual-e5-large" => 1024,
            _ => 384,
        }
    }

    fn fastembed_model_for(name: &str) -> Result<fastembed::EmbeddingModel> {
        match name {
            "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
            "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
            "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
            "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
            "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
            "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
            "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
            "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
            "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
            other => bail!(
                "Unknown local embedding model: '{}'. Supported models: \
                 all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
                 nomic-embed-text-v1, nomic-embed-text-v1.5, \
                 multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
                other
            ),
        }
    }
}

// ============ Tier 3: term frequency ============

/// Deterministic lexical embedder: hashed term-frequency vectors.
///
/// Each token is hashed into one of `dims` buckets; counts are
/// L2-normalized. Identical text always maps to the identical vector, so
/// similarity remains meaningful for exact-vocabulary overlap even when no
/// model is available.
pub struct TermFrequencyTier {
    dims: usize,
}

impl TermFrequencyTier {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

#[async_trait]
impl EmbedderTier for TermFrequencyTier {
    fn name(&self) -> &'static str {
        "term-frequency"
    }

    async fn build(&self) -> Result<Arc<dyn Embedder>> {
        Ok(Arc::new(TermFrequencyEmbedder { dims: self.dims }))
    }
}

pub struct TermFrequencyEmbedder {
    dims: usize,
}

impl TermFrequencyEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let bucket = token_bucket(token, self.dims);
            vector[bucket] += 1.0;
        }
        l2_normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl Embedder for TermFrequencyEmbedder {
    fn tier(&self) -> &'static str {
        "term-frequency"
    }
    fn model_name(&self) -> &str {
        "term-frequency"
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

fn token_bucket(token: &str, dims: usize) -> usize {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    (u64::from_le_bytes(bytes) % dims as u64) as usize
}

fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

// ============ Tier 4: random vectors ============

/// Last-resort embedder: random unit vectors.
///
/// Similarity is meaningless, but the pipeline never blocks on a missing
/// model. Selection of this tier is logged by the chain.
pub struct RandomTier {
    dims: usize,
}

impl RandomTier {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

#[async_trait]
impl EmbedderTier for RandomTier {
    fn name(&self) -> &'static str {
        "random"
    }

    async fn build(&self) -> Result<Arc<dyn Embedder>> {
        Ok(Arc::new(RandomEmbedder { dims: self.dims }))
    }
}

pub struct RandomEmbedder {
    dims: usize,
}

impl RandomEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

#[async_trait]
impl Embedder for RandomEmbedder {
    fn tier(&self) -> &'static str {
        "random"
    }
    fn model_name(&self) -> &str {
        "random"
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        Ok(texts
            .iter()
            .map(|_| {
                let mut vector: Vec<f32> =
                    (0..self.dims).map(|_| rng.gen_range(-1.0..1.0)).collect();
                l2_normalize(&mut vector);
                vector
            })
            .collect())
    }
}

// ============ Vector utilities ============

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty vectors or vectors of
/// different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingTier;

    #[async_trait]
    impl EmbedderTier for FailingTier {
        fn name(&self) -> &'static str {
            "failing"
        }
        async fn build(&self) -> Result<Arc<dyn Embedder>> {
            bail!("deliberately unavailable")
        }
    }

    #[tokio::test]
    async fn test_chain_skips_failing_tiers() {
        let tiers: Vec<Box<dyn EmbedderTier>> = vec![
            Box::new(FailingTier),
            Box::new(FailingTier),
            Box::new(TermFrequencyTier::new(64)),
            Box::new(RandomTier::new(64)),
        ];
        let embedder = resolve_chain(&tiers).await.unwrap();
        assert_eq!(embedder.tier(), "term-frequency");
    }

    #[tokio::test]
    async fn test_chain_with_no_working_tier_errors() {
        let tiers: Vec<Box<dyn EmbedderTier>> = vec![Box::new(FailingTier)];
        assert!(resolve_chain(&tiers).await.is_err());
    }

    #[tokio::test]
    async fn test_remote_tier_unconfigured_fails_fast() {
        let tier = RemoteTier::new(&EmbeddingConfig::default());
        assert!(tier.build().await.is_err());
    }

    #[tokio::test]
    async fn test_term_frequency_deterministic() {
        let embedder = TermFrequencyEmbedder::new(128);
        let a = embedder.embed_one("the refund policy is simple").await.unwrap();
        let b = embedder.embed_one("the refund policy is simple").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 128);
    }

    #[tokio::test]
    async fn test_term_frequency_similarity_tracks_overlap() {
        let embedder = TermFrequencyEmbedder::new(256);
        let base = embedder.embed_one("refund policy details").await.unwrap();
        let near = embedder.embed_one("refund policy overview").await.unwrap();
        let far = embedder.embed_one("kubernetes cluster autoscaling").await.unwrap();
        assert!(cosine_similarity(&base, &near) > cosine_similarity(&base, &far));
    }

    #[tokio::test]
    async fn test_term_frequency_vectors_are_unit_length() {
        let embedder = TermFrequencyEmbedder::new(64);
        let v = embedder.embed_one("alpha beta gamma").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_random_embedder_never_fails() {
        let embedder = RandomEmbedder::new(32);
        let vectors = embedder
            .embed(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors.len(), 2);
        assert!(vectors.iter().all(|v| v.len() == 32));
    }

    #[tokio::test]
    async fn test_dims_constant_across_batch() {
        let embedder = TermFrequencyEmbedder::new(96);
        let texts: Vec<String> = (0..10).map(|i| format!("text number {}", i)).collect();
        let vectors = embedder.embed(&texts).await.unwrap();
        assert!(vectors.iter().all(|v| v.len() == embedder.dims()));
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        let sim = cosine_similarity(&a, &b);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_empty() {
        let sim = cosine_similarity(&[], &[]);
        assert_eq!(sim, 0.0);
    }

    #[test]
    fn test_cosine_different_lengths() {
        let a = vec![1.0, 2.0];
        let b = vec![1.0];
        let sim = cosine_similarity(&a, &b);
        assert_eq!(sim, 0.0);
    }
}
