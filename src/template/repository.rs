//! Postgres-backed template storage.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;

use super::{NewTemplate, Template, TemplateError, TemplateVariable};

type TemplateRow = (
    i64,
    String,
    String,
    Vec<String>,
    Json<Vec<TemplateVariable>>,
    DateTime<Utc>,
    DateTime<Utc>,
);

const TEMPLATE_COLUMNS: &str = "id, name, body, tags, variables, created_at, updated_at";

fn from_row(row: TemplateRow) -> Template {
    let (id, name, body, tags, Json(variables), created_at, updated_at) = row;
    Template {
        id,
        name,
        body,
        tags,
        variables,
        created_at,
        updated_at,
    }
}

/// Template CRUD against Postgres. Templates are consumed read-only by the
/// rule synchronizer; writes come through the control-plane API.
#[derive(Clone)]
pub struct TemplateRepository {
    pool: PgPool,
}

impl TemplateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create-or-update keyed by `name`; an update keeps the existing row id.
    pub async fn upsert(&self, template: &NewTemplate) -> Result<Template, TemplateError> {
        let row: TemplateRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO templates (name, body, tags, variables)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (name) DO UPDATE
            SET body = EXCLUDED.body,
                tags = EXCLUDED.tags,
                variables = EXCLUDED.variables,
                updated_at = NOW()
            RETURNING {TEMPLATE_COLUMNS}
            "#
        ))
        .bind(&template.name)
        .bind(&template.body)
        .bind(&template.tags)
        .bind(Json(&template.variables))
        .fetch_one(&self.pool)
        .await?;

        Ok(from_row(row))
    }

    /// All templates, or only those carrying `tag`.
    pub async fn list(&self, tag: Option<&str>) -> Result<Vec<Template>, TemplateError> {
        let rows: Vec<TemplateRow> = match tag {
            None => {
                sqlx::query_as(&format!(
                    "SELECT {TEMPLATE_COLUMNS} FROM templates ORDER BY id"
                ))
                .fetch_all(&self.pool)
                .await?
            }
            Some(tag) => {
                sqlx::query_as(&format!(
                    "SELECT {TEMPLATE_COLUMNS} FROM templates WHERE $1 = ANY(tags) ORDER BY id"
                ))
                .bind(tag)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.into_iter().map(from_row).collect())
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<Template>, TemplateError> {
        let row: Option<TemplateRow> = sqlx::query_as(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM templates WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(from_row))
    }

    /// Deleting an absent template is a no-op.
    pub async fn delete(&self, name: &str) -> Result<(), TemplateError> {
        sqlx::query("DELETE FROM templates WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
