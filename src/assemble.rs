//! Templated response assembly.
//!
//! Turns retrieved chunks plus a template into the final text artifact:
//! template lookup by (platform, tone) with a built-in default, lightweight
//! topic and key-point extraction, and `{{name}}` placeholder filling that
//! never fails on missing keys. This component never raises past its
//! boundary — any internal failure becomes an apologetic but well-formed
//! response carrying the error detail.

use chrono::{DateTime, Utc};
use tracing::warn;

use anyhow::Result;

use crate::config::AssemblyConfig;
use crate::models::{
    ChunkPreview, GeneratedResponse, ResponseMetadata, ResponseStatus, RetrievedChunk,
};
use crate::template::{default_template, Template, TemplateStore, DEFAULT_TEMPLATE_ID};

/// Leading discourse connectives stripped from extracted key points.
const DISCOURSE_CONNECTIVES: &[&str] = &[
    "However",
    "Moreover",
    "Therefore",
    "Furthermore",
    "Additionally",
    "Consequently",
    "Nevertheless",
    "Meanwhile",
    "Thus",
    "Also",
    "Finally",
];

pub struct Assembler<'a> {
    templates: &'a dyn TemplateStore,
    config: &'a AssemblyConfig,
}

impl<'a> Assembler<'a> {
    pub fn new(templates: &'a dyn TemplateStore, config: &'a AssemblyConfig) -> Self {
        Self { templates, config }
    }

    /// Assemble a response using the current wall clock.
    pub async fn assemble(
        &self,
        query: &str,
        platform: &str,
        tone: &str,
        chunks: &[RetrievedChunk],
    ) -> GeneratedResponse {
        self.assemble_at(query, platform, tone, chunks, Utc::now())
            .await
    }

    /// Assemble with an explicit clock. Identical inputs and a fixed `now`
    /// yield identical output.
    pub async fn assemble_at(
        &self,
        query: &str,
        platform: &str,
        tone: &str,
        chunks: &[RetrievedChunk],
        now: DateTime<Utc>,
    ) -> GeneratedResponse {
        match self.try_assemble(query, platform, tone, chunks, now).await {
            Ok(response) => response,
            Err(e) => {
                warn!(%query, error = %e, "assembly failed, returning apologetic response");
                GeneratedResponse {
                    text: "We couldn't put together a response this time. Please try again."
                        .to_string(),
                    source_chunks: Vec::new(),
                    template_id: DEFAULT_TEMPLATE_ID.to_string(),
                    status: ResponseStatus::Ok,
                    error: Some(e.to_string()),
                    metadata: ResponseMetadata::new(platform, tone, query, now),
                }
            }
        }
    }

    async fn try_assemble(
        &self,
        query: &str,
        platform: &str,
        tone: &str,
        chunks: &[RetrievedChunk],
        now: DateTime<Utc>,
    ) -> Result<GeneratedResponse> {
        let template = match self.templates.get_template(platform, tone).await? {
            Some(template) => template,
            None => default_template(),
        };

        let topic = extract_topic(query);
        let content: Vec<&str> = chunks.iter().map(|c| c.chunk.text.as_str()).collect();
        let content = content.join("\n\n");
        let key_points = extract_key_points(&content, self.config.max_key_points);
        let key_points_text = key_points
            .iter()
            .map(|p| format!("- {}", p))
            .collect::<Vec<_>>()
            .join("\n");

        let text = fill_template(
            &template,
            &[
                ("query", query),
                ("topic", &topic),
                ("content", &content),
                ("key_points", &key_points_text),
                ("platform", platform),
                ("tone", tone),
            ],
        );

        let source_chunks = chunks
            .iter()
            .map(|c| ChunkPreview {
                content_id: c.chunk.content_id.clone(),
                ordinal: c.chunk.ordinal,
                text: truncate_preview(&c.chunk.text, self.config.preview_chars),
                similarity: c.similarity,
            })
            .collect();

        Ok(GeneratedResponse {
            text,
            source_chunks,
            template_id: template.id,
            status: ResponseStatus::Ok,
            error: None,
            metadata: ResponseMetadata::new(platform, tone, query, now),
        })
    }
}

/// A short topic label for the query — not a summary.
///
/// Queries of up to three words pass through verbatim; longer queries keep
/// their first three words plus an ellipsis marker.
pub fn extract_topic(query: &str) -> String {
    let words: Vec<&str> = query.split_whitespace().collect();
    if words.len() <= 3 {
        query.trim().to_string()
    } else {
        format!("{}...", words[..3].join(" "))
    }
}

/// Extract up to `max_points` key sentences from concatenated chunk text.
///
/// Splits on sentence-terminal punctuation, discards fragments shorter than
/// 10 characters, strips a fixed set of leading discourse connectives, and
/// keeps the first `max_points` results longer than 15 characters.
pub fn extract_key_points(content: &str, max_points: usize) -> Vec<String> {
    content
        .split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| s.len() >= 10)
        .map(strip_connective)
        .filter(|s| s.len() > 15)
        .take(max_points)
        .collect()
}

fn strip_connective(sentence: &str) -> String {
    for connective in DISCOURSE_CONNECTIVES {
        let Some(rest) = strip_prefix_ignore_case(sentence, connective) else {
            continue;
        };
        // Only a whole leading word counts, optionally followed by a comma.
        let rest = rest.strip_prefix(',').unwrap_or(rest);
        if rest.starts_with(char::is_whitespace) {
            return rest.trim_start().to_string();
        }
        if rest.is_empty() {
            return String::new();
        }
    }
    sentence.to_string()
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    if text.len() >= prefix.len()
        && text.is_char_boundary(prefix.len())
        && text[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&text[prefix.len()..])
    } else {
        None
    }
}

/// Replace every known `{{name}}` placeholder with its value.
///
/// Unresolved placeholders remain literal; filling never fails.
pub fn fill_template(template: &Template, values: &[(&str, &str)]) -> String {
    let mut text = template.body.clone();
    for (name, value) in values {
        text = text.replace(&format!("{{{{{}}}}}", name), value);
    }
    text
}

/// Truncate chunk text for display: at most `limit` characters plus an
/// ellipsis when cut.
pub fn truncate_preview(text: &str, limit: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= limit {
        text.to_string()
    } else {
        let mut preview: String = chars[..limit].iter().collect();
        preview.push_str("...");
        preview
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;
    use crate::template::InMemoryTemplateStore;
    use anyhow::bail;
    use async_trait::async_trait;
    use chrono::TimeZone;

    fn retrieved(text: &str, ordinal: i64, similarity: f64) -> RetrievedChunk {
        RetrievedChunk {
            chunk: Chunk {
                id: format!("c{}", ordinal),
                content_id: "doc1".to_string(),
                ordinal,
                text: text.to_string(),
                embedding: None,
                domain: "acme.com".to_string(),
                content_type: "article".to_string(),
                hash: String::new(),
            },
            similarity,
            query: "What is our refund policy?".to_string(),
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_topic_short_query_verbatim() {
        assert_eq!(extract_topic("refund policy"), "refund policy");
        assert_eq!(extract_topic("one two three"), "one two three");
    }

    #[test]
    fn test_topic_long_query_truncated() {
        assert_eq!(
            extract_topic("What is our refund policy?"),
            "What is our..."
        );
    }

    #[test]
    fn test_key_points_cap_and_connective_stripping() {
        let content = "However, returns are accepted within thirty days. \
            Refunds are issued to the original payment method. \
            Moreover, shipping costs are not refundable in most cases. \
            Exchanges can be requested instead of a refund. \
            Gift purchases follow the same thirty day window. \
            Support can override the policy for defective items.";
        let points = extract_key_points(content, 5);
        assert_eq!(points.len(), 5);
        assert_eq!(points[0], "returns are accepted within thirty days");
        assert_eq!(
            points[2],
            "shipping costs are not refundable in most cases"
        );
        assert!(points.iter().all(|p| !p.starts_with("However")));
        assert!(points.iter().all(|p| !p.starts_with("Moreover")));
    }

    #[test]
    fn test_key_points_discard_short_fragments() {
        let points = extract_key_points("Too short. Ok. This sentence is long enough to keep.", 5);
        assert_eq!(points, vec!["This sentence is long enough to keep"]);
    }

    #[test]
    fn test_connective_requires_whole_word() {
        // "Thusly" starts with "Thus" but is not the connective.
        let points = extract_key_points("Thusly named products sell well enough.", 5);
        assert_eq!(points, vec!["Thusly named products sell well enough"]);
    }

    #[test]
    fn test_fill_leaves_unresolved_placeholders_literal() {
        let template = Template {
            id: "t".to_string(),
            platform: None,
            tone: None,
            body: "{{topic}} and {{mystery}}".to_string(),
        };
        let filled = fill_template(&template, &[("topic", "refunds")]);
        assert_eq!(filled, "refunds and {{mystery}}");
    }

    #[test]
    fn test_preview_truncation_bounds() {
        let text = "x".repeat(400);
        let preview = truncate_preview(&text, 150);
        assert_eq!(preview.chars().count(), 153);
        assert!(preview.ends_with("..."));
        assert_eq!(truncate_preview("short", 150), "short");
    }

    #[tokio::test]
    async fn test_assemble_with_scoped_template() {
        let store = InMemoryTemplateStore::new();
        store.insert(Template {
            id: "email-pro".to_string(),
            platform: Some("email".to_string()),
            tone: Some("professional".to_string()),
            body: "Topic: {{topic}}\n{{content}}".to_string(),
        });
        let config = AssemblyConfig::default();
        let assembler = Assembler::new(&store, &config);

        let chunks = vec![
            retrieved(
                "Our refund policy allows returns within thirty days of purchase for any reason.",
                0,
                0.91,
            ),
            retrieved(
                "Refunds are issued to the original payment method within five business days.",
                1,
                0.77,
            ),
        ];
        let response = assembler
            .assemble_at(
                "What is our refund policy?",
                "email",
                "professional",
                &chunks,
                fixed_now(),
            )
            .await;

        assert_eq!(response.template_id, "email-pro");
        assert_eq!(response.status, ResponseStatus::Ok);
        assert!(response.error.is_none());
        assert!(response.text.contains("What is our..."));
        assert!(response.text.contains("thirty days of purchase"));
        assert!(response.text.contains("original payment method"));
        assert_eq!(response.source_chunks.len(), 2);
        for preview in &response.source_chunks {
            assert!(preview.text.chars().count() <= 153);
        }
        assert_eq!(response.metadata.generated_at, "2024-06-01T12:00:00Z");
        assert_eq!(response.metadata.platform, "email");
    }

    #[tokio::test]
    async fn test_assemble_falls_back_to_default_template() {
        let store = InMemoryTemplateStore::new();
        let config = AssemblyConfig::default();
        let assembler = Assembler::new(&store, &config);

        let response = assembler
            .assemble_at("pricing", "twitter", "casual", &[], fixed_now())
            .await;
        assert_eq!(response.template_id, DEFAULT_TEMPLATE_ID);
        assert!(response.text.contains("pricing"));
    }

    #[tokio::test]
    async fn test_assemble_never_fails_on_empty_chunks() {
        let store = InMemoryTemplateStore::new();
        let config = AssemblyConfig::default();
        let assembler = Assembler::new(&store, &config);
        let response = assembler
            .assemble_at("anything at all", "web", "neutral", &[], fixed_now())
            .await;
        assert!(response.error.is_none());
        assert!(response.source_chunks.is_empty());
    }

    #[tokio::test]
    async fn test_assemble_idempotent_with_fixed_clock() {
        let store = InMemoryTemplateStore::new();
        let config = AssemblyConfig::default();
        let assembler = Assembler::new(&store, &config);
        let chunks = vec![retrieved("A perfectly ordinary chunk of text here.", 0, 0.5)];

        let first = assembler
            .assemble_at("refund policy", "email", "professional", &chunks, fixed_now())
            .await;
        let second = assembler
            .assemble_at("refund policy", "email", "professional", &chunks, fixed_now())
            .await;
        assert_eq!(first.text, second.text);
        assert_eq!(first.metadata.generated_at, second.metadata.generated_at);
    }

    struct FailingTemplateStore;

    #[async_trait]
    impl TemplateStore for FailingTemplateStore {
        async fn get_template(&self, _platform: &str, _tone: &str) -> Result<Option<Template>> {
            bail!("template backend offline")
        }
    }

    #[tokio::test]
    async fn test_assembly_failure_becomes_apologetic_response() {
        let store = FailingTemplateStore;
        let config = AssemblyConfig::default();
        let assembler = Assembler::new(&store, &config);
        let response = assembler
            .assemble_at("refund policy", "email", "professional", &[], fixed_now())
            .await;
        assert!(response.error.as_deref().unwrap().contains("offline"));
        assert!(!response.text.is_empty());
        assert_eq!(response.metadata.platform, "email");
        assert_eq!(response.metadata.tone, "professional");
    }
}
