//! Postgres access for rule rows.
//!
//! Mutations run on a caller-supplied connection so the synchronizer can
//! scope them to its transaction; the filtered listing runs on the pool.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};

use super::{NewRule, Rule, RuleError, RuleVariable};

type RuleRow = (
    i64,
    String,
    String,
    String,
    String,
    bool,
    Json<Vec<RuleVariable>>,
    i64,
    DateTime<Utc>,
    DateTime<Utc>,
);

const RULE_COLUMNS: &str =
    "id, name, namespace, group_name, template, enabled, variables, provider_namespace, \
     created_at, updated_at";

fn from_row(row: RuleRow) -> Rule {
    let (
        id,
        name,
        namespace,
        group_name,
        template,
        enabled,
        Json(variables),
        provider_namespace,
        created_at,
        updated_at,
    ) = row;
    Rule {
        id,
        name,
        namespace,
        group_name,
        template,
        enabled,
        variables,
        provider_namespace,
        created_at,
        updated_at,
    }
}

/// Write a rule under its canonical name: insert, or update in place
/// preserving the existing row id. Returns the reloaded row as the
/// authoritative in-flight rule.
pub(crate) async fn upsert_by_name(
    conn: &mut PgConnection,
    name: &str,
    rule: &NewRule,
    variables: &[RuleVariable],
) -> Result<Rule, RuleError> {
    let row: RuleRow = sqlx::query_as(&format!(
        r#"
        INSERT INTO rules
            (name, namespace, group_name, template, enabled, variables, provider_namespace)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (name) DO UPDATE
        SET namespace = EXCLUDED.namespace,
            group_name = EXCLUDED.group_name,
            template = EXCLUDED.template,
            enabled = EXCLUDED.enabled,
            variables = EXCLUDED.variables,
            provider_namespace = EXCLUDED.provider_namespace,
            updated_at = NOW()
        RETURNING {RULE_COLUMNS}
        "#
    ))
    .bind(name)
    .bind(&rule.namespace)
    .bind(&rule.group_name)
    .bind(&rule.template)
    .bind(rule.enabled)
    .bind(Json(variables))
    .bind(rule.provider_namespace)
    .fetch_one(&mut *conn)
    .await?;

    Ok(from_row(row))
}

/// Full membership of one rule group, enabled or not, in stable id order.
pub(crate) async fn list_group(
    conn: &mut PgConnection,
    namespace: &str,
    group_name: &str,
    provider_namespace: i64,
) -> Result<Vec<Rule>, RuleError> {
    let rows: Vec<RuleRow> = sqlx::query_as(&format!(
        r#"
        SELECT {RULE_COLUMNS} FROM rules
        WHERE namespace = $1 AND group_name = $2 AND provider_namespace = $3
        ORDER BY id
        "#
    ))
    .bind(namespace)
    .bind(group_name)
    .bind(provider_namespace)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(from_row).collect())
}

/// Optional filters for [`RuleRepository::list`]. Every populated field
/// becomes a bind parameter.
#[derive(Debug, Clone, Default)]
pub struct RuleFilter {
    pub name: Option<String>,
    pub namespace: Option<String>,
    pub group_name: Option<String>,
    pub template: Option<String>,
    pub provider_namespace: Option<i64>,
}

/// Read access to rule rows outside a synchronization.
#[derive(Clone)]
pub struct RuleRepository {
    pool: PgPool,
}

impl RuleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, filter: &RuleFilter) -> Result<Vec<Rule>, RuleError> {
        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {RULE_COLUMNS} FROM rules"));

        let mut first = true;
        let mut condition = |query: &mut QueryBuilder<Postgres>| {
            query.push(if first { " WHERE " } else { " AND " });
            first = false;
        };

        if let Some(name) = &filter.name {
            condition(&mut query);
            query.push("name = ").push_bind(name);
        }
        if let Some(namespace) = &filter.namespace {
            condition(&mut query);
            query.push("namespace = ").push_bind(namespace);
        }
        if let Some(group_name) = &filter.group_name {
            condition(&mut query);
            query.push("group_name = ").push_bind(group_name);
        }
        if let Some(template) = &filter.template {
            condition(&mut query);
            query.push("template = ").push_bind(template);
        }
        if let Some(provider_namespace) = filter.provider_namespace {
            condition(&mut query);
            query.push("provider_namespace = ").push_bind(provider_namespace);
        }

        query.push(" ORDER BY id");

        let rows: Vec<RuleRow> = query.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(from_row).collect())
    }
}
