//! Rollback-law integration tests
//!
//! These need a real Postgres (set `DATABASE_URL`) and are ignored by
//! default: `cargo test -- --ignored` runs them. They verify that a failed
//! remote push rolls back the local row written earlier in the same
//! transaction.

use std::sync::Arc;

use async_trait::async_trait;

use siren::config::DatabaseConfig;
use siren::cortex::{
    AlertmanagerApi, CortexClientFactory, CortexError, RuleGroup, RulerApi,
};
use siren::rule::{NewRule, RuleFilter, RuleRepository, RuleService, RuleVariable};
use siren::store;
use siren::template::{NewTemplate, TemplateRepository, TemplateService, TemplateVariable};

struct FailingRuler;

#[async_trait]
impl RulerApi for FailingRuler {
    async fn create_rule_group(
        &self,
        _tenant: &str,
        _namespace: &str,
        _group: &RuleGroup,
    ) -> Result<(), CortexError> {
        Err(CortexError::Api {
            status: 500,
            message: "ruler down".to_string(),
        })
    }

    async fn delete_rule_group(
        &self,
        _tenant: &str,
        _namespace: &str,
        _group_name: &str,
    ) -> Result<(), CortexError> {
        Err(CortexError::Api {
            status: 500,
            message: "ruler down".to_string(),
        })
    }
}

struct FailingFactory;

impl CortexClientFactory for FailingFactory {
    fn ruler(&self, _host: &str) -> Result<Arc<dyn RulerApi>, CortexError> {
        Ok(Arc::new(FailingRuler))
    }

    fn alertmanager(&self, _host: &str) -> Result<Arc<dyn AlertmanagerApi>, CortexError> {
        Err(CortexError::Api {
            status: 500,
            message: "alertmanager down".to_string(),
        })
    }
}

async fn test_pool() -> sqlx::PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a test database");
    let pool = store::connect(&DatabaseConfig {
        url,
        ..DatabaseConfig::default()
    })
    .await
    .expect("connect");
    store::migrate(&pool).await.expect("migrate");
    pool
}

#[tokio::test]
#[ignore]
async fn test_failed_remote_push_rolls_back_rule_row() {
    let pool = test_pool().await;

    let marker = format!("rollback-{}", std::process::id());
    let (_, namespace_id): (i64, i64) = {
        let provider: (i64,) = sqlx::query_as(
            "INSERT INTO providers (urn, name, type, host) VALUES ($1, $1, 'cortex', 'http://localhost:9009') RETURNING id",
        )
        .bind(format!("provider-{marker}"))
        .fetch_one(&pool)
        .await
        .expect("seed provider");

        let namespace: (i64,) = sqlx::query_as(
            "INSERT INTO namespaces (urn, name, provider_id) VALUES ($1, $1, $2) RETURNING id",
        )
        .bind(format!("namespace-{marker}"))
        .bind(provider.0)
        .fetch_one(&pool)
        .await
        .expect("seed namespace");

        (provider.0, namespace.0)
    };

    let templates = TemplateRepository::new(pool.clone());
    templates
        .upsert(&NewTemplate {
            name: format!("template-{marker}"),
            body: "- alert: X\n  expr: up\n  for: [[ .for ]]\n".to_string(),
            tags: vec![],
            variables: vec![TemplateVariable {
                name: "for".to_string(),
                variable_type: "string".to_string(),
                default: "10m".to_string(),
                description: String::new(),
            }],
        })
        .await
        .expect("seed template");

    let service = RuleService::new(
        pool.clone(),
        Arc::new(TemplateService::new(templates)),
        Arc::new(FailingFactory),
    );

    let err = service
        .upsert(NewRule {
            namespace: format!("ns-{marker}"),
            group_name: "cpu".to_string(),
            template: format!("template-{marker}"),
            enabled: true,
            variables: vec![RuleVariable {
                name: "for".to_string(),
                variable_type: "string".to_string(),
                value: "20m".to_string(),
                description: String::new(),
            }],
            provider_namespace: namespace_id,
        })
        .await
        .expect_err("remote failure must abort the upsert");
    assert!(err.to_string().contains("ruler down"));

    // The row written inside the aborted transaction must not be visible.
    let rules = RuleRepository::new(pool.clone())
        .list(&RuleFilter {
            namespace: Some(format!("ns-{marker}")),
            ..RuleFilter::default()
        })
        .await
        .expect("list rules");
    assert!(rules.is_empty());
}
