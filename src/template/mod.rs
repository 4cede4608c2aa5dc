//! Alerting-rule templates: storage, declared variables, and rendering.
//!
//! Template bodies use `[[ .name ]]` placeholders. The non-default delimiters
//! keep stored bodies from colliding with the `{{ }}` templating syntax the
//! downstream alerting systems expand at notification time.

mod renderer;
mod repository;

pub use renderer::{render_body, TemplateService};
pub use repository::TemplateRepository;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Template-specific error type
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template not found")]
    NotFound,

    #[error("template render failed: {0}")]
    Render(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A named rule template with declared variables and defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: i64,
    pub name: String,
    /// Rule body with `[[ .name ]]` placeholders
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Declared variables, in declaration order
    #[serde(default)]
    pub variables: Vec<TemplateVariable>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A variable declared by a template, with its default value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateVariable {
    pub name: String,
    #[serde(rename = "type", default)]
    pub variable_type: String,
    #[serde(default)]
    pub default: String,
    #[serde(default)]
    pub description: String,
}

/// Input for create-or-update; the row identity is the unique `name`.
#[derive(Debug, Clone)]
pub struct NewTemplate {
    pub name: String,
    pub body: String,
    pub tags: Vec<String>,
    pub variables: Vec<TemplateVariable>,
}

/// Read-and-render access to stored templates.
///
/// The rule synchronizer consumes templates only through this trait, so tests
/// can stand in an in-memory implementation.
#[async_trait]
pub trait TemplateRenderer: Send + Sync {
    async fn get_by_name(&self, name: &str) -> Result<Option<Template>, TemplateError>;

    /// Render `name` against `variables`, falling back to declared defaults.
    async fn render(
        &self,
        name: &str,
        variables: &HashMap<String, String>,
    ) -> Result<String, TemplateError>;
}
