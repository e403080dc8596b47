//! Response templates and the template lookup contract.
//!
//! A [`Template`] is a text pattern with `{{name}}` placeholders, optionally
//! scoped to a (platform, tone) pair. Templates are read-only to this core
//! except for one built-in default used when no scoped template exists.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::RwLock;

/// Sentinel id reported when the built-in template was used.
pub const DEFAULT_TEMPLATE_ID: &str = "default";

/// A text pattern with named `{{name}}` placeholders.
#[derive(Debug, Clone)]
pub struct Template {
    pub id: String,
    pub platform: Option<String>,
    pub tone: Option<String>,
    pub body: String,
}

/// The built-in generic template used when no (platform, tone) match exists.
pub fn default_template() -> Template {
    Template {
        id: DEFAULT_TEMPLATE_ID.to_string(),
        platform: None,
        tone: None,
        body: "Here's what we know about {{topic}}:\n\n{{key_points}}\n\n{{content}}".to_string(),
    }
}

/// Collaborator-provided template lookup.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Return the template scoped to `(platform, tone)`, if one exists.
    async fn get_template(&self, platform: &str, tone: &str) -> Result<Option<Template>>;
}

/// In-memory [`TemplateStore`] for tests and embedded use.
pub struct InMemoryTemplateStore {
    templates: RwLock<Vec<Template>>,
}

impl InMemoryTemplateStore {
    pub fn new() -> Self {
        Self {
            templates: RwLock::new(Vec::new()),
        }
    }

    pub fn insert(&self, template: Template) {
        self.templates.write().unwrap().push(template);
    }
}

impl Default for InMemoryTemplateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TemplateStore for InMemoryTemplateStore {
    async fn get_template(&self, platform: &str, tone: &str) -> Result<Option<Template>> {
        let templates = self.templates.read().unwrap();
        Ok(templates
            .iter()
            .find(|t| {
                t.platform.as_deref() == Some(platform) && t.tone.as_deref() == Some(tone)
            })
            .cloned())
    }
}
