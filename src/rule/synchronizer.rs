//! The rule synchronizer: upsert a rule locally and republish its whole
//! group remotely, inside one transaction.

use std::sync::Arc;
use std::time::Instant;

use sqlx::PgPool;

use crate::cortex::{parse_rule_nodes, CortexClientFactory, RuleGroup, RulerApi};
use crate::metrics::{REMOTE_PUSH_DURATION, RULES_RENDERED_TOTAL, RULE_GROUP_SYNCS_TOTAL};
use crate::provider::{resolve_namespace_provider, PROVIDER_TYPE_CORTEX};
use crate::template::TemplateRenderer;

use super::{
    canonical_rule_name, provisional_rule_name, repository, variable_map,
    merge_variables_with_defaults, NewRule, Rule, RuleError,
};

/// Remote pushes longer than this get a warning: the local transaction and
/// its row locks are held open for the whole call.
const SLOW_PUSH_WARN_SECS: f64 = 1.0;

/// Creates and updates rules. There is deliberately no plain CRUD write
/// path: every local change flows through [`RuleService::upsert`] so the
/// remote group is always recomputed.
pub struct RuleService {
    pool: PgPool,
    templates: Arc<dyn TemplateRenderer>,
    clients: Arc<dyn CortexClientFactory>,
}

impl RuleService {
    pub fn new(
        pool: PgPool,
        templates: Arc<dyn TemplateRenderer>,
        clients: Arc<dyn CortexClientFactory>,
    ) -> Self {
        Self {
            pool,
            templates,
            clients,
        }
    }

    /// Upsert one rule and republish its group.
    ///
    /// The transaction stays open across the remote call; any failure after
    /// the row write rolls the write back, so local and remote state never
    /// diverge durably. Returns the reloaded row.
    pub async fn upsert(&self, rule: NewRule) -> Result<Rule, RuleError> {
        let result = self.upsert_inner(&rule).await;
        if result.is_err() {
            RULE_GROUP_SYNCS_TOTAL.with_label_values(&["failed"]).inc();
        }
        result
    }

    async fn upsert_inner(&self, rule: &NewRule) -> Result<Rule, RuleError> {
        let provisional = provisional_rule_name(&rule.namespace, &rule.group_name, &rule.template);
        tracing::debug!(rule = %provisional, template = %rule.template, "rule upsert started");

        // Template selection needs no provider context.
        let template = self
            .templates
            .get_by_name(&rule.template)
            .await?
            .ok_or(RuleError::TemplateNotFound)?;
        let variables = merge_variables_with_defaults(&template.variables, &rule.variables);

        let mut tx = self.pool.begin().await?;

        let info = resolve_namespace_provider(&mut *tx, rule.provider_namespace)
            .await?
            .ok_or(RuleError::ProviderNotFound)?;

        // Persisted identity includes the provider and namespace urns.
        let name = canonical_rule_name(
            &info.provider_urn,
            &info.namespace_urn,
            &rule.namespace,
            &rule.group_name,
            &rule.template,
        );

        let stored = repository::upsert_by_name(&mut *tx, &name, rule, &variables).await?;

        if info.provider_type != PROVIDER_TYPE_CORTEX {
            return Err(RuleError::ProviderNotSupported);
        }

        let ruler = self.clients.ruler(&info.provider_host)?;

        let members = repository::list_group(
            &mut *tx,
            &rule.namespace,
            &rule.group_name,
            rule.provider_namespace,
        )
        .await?;

        sync_group_remote(
            ruler.as_ref(),
            self.templates.as_ref(),
            &info.namespace_urn,
            &rule.namespace,
            &rule.group_name,
            &members,
        )
        .await?;

        tx.commit().await?;

        tracing::info!(rule = %stored.name, group = %stored.group_name, "rule upsert committed");
        Ok(stored)
    }
}

/// Recompute and publish one rule group: render every enabled member in
/// query order, then push the concatenation — or delete the remote group
/// when nothing is enabled. An absent group on delete is already the
/// desired state.
pub(crate) async fn sync_group_remote(
    ruler: &dyn RulerApi,
    templates: &dyn TemplateRenderer,
    tenant: &str,
    namespace: &str,
    group_name: &str,
    members: &[Rule],
) -> Result<(), RuleError> {
    let mut rendered = String::new();
    for member in members {
        if !member.enabled {
            continue;
        }
        let variables = variable_map(&member.variables);
        rendered.push_str(&templates.render(&member.template, &variables).await?);
        RULES_RENDERED_TOTAL.inc();
    }

    if rendered.is_empty() {
        let pushed_at = Instant::now();
        let outcome = ruler.delete_rule_group(tenant, namespace, group_name).await;
        observe_push("ruler", pushed_at);
        match outcome {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        RULE_GROUP_SYNCS_TOTAL.with_label_values(&["deleted"]).inc();
        tracing::info!(namespace, group = group_name, tenant, "deleted empty rule group");
        return Ok(());
    }

    let nodes = parse_rule_nodes(&rendered).map_err(RuleError::InvalidRuleBody)?;
    let group = RuleGroup {
        name: group_name.to_string(),
        rules: nodes,
    };

    let pushed_at = Instant::now();
    let outcome = ruler.create_rule_group(tenant, namespace, &group).await;
    observe_push("ruler", pushed_at);
    outcome?;

    RULE_GROUP_SYNCS_TOTAL.with_label_values(&["created"]).inc();
    tracing::info!(
        namespace,
        group = group_name,
        tenant,
        rules = group.rules.len(),
        "pushed rule group"
    );
    Ok(())
}

fn observe_push(api: &str, started: Instant) {
    let elapsed = started.elapsed().as_secs_f64();
    REMOTE_PUSH_DURATION.with_label_values(&[api]).observe(elapsed);
    if elapsed > SLOW_PUSH_WARN_SECS {
        tracing::warn!(
            api,
            elapsed_secs = elapsed,
            "slow remote push held the local transaction open"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;

    use crate::cortex::CortexError;
    use crate::template::{render_body, Template, TemplateError, TemplateRenderer};

    use super::super::RuleVariable;
    use super::*;

    struct FakeRenderer {
        bodies: HashMap<String, String>,
    }

    impl FakeRenderer {
        fn with_body(name: &str, body: &str) -> Self {
            Self {
                bodies: HashMap::from([(name.to_string(), body.to_string())]),
            }
        }
    }

    #[async_trait]
    impl TemplateRenderer for FakeRenderer {
        async fn get_by_name(&self, name: &str) -> Result<Option<Template>, TemplateError> {
            Ok(self.bodies.get(name).map(|body| Template {
                id: 1,
                name: name.to_string(),
                body: body.clone(),
                tags: vec![],
                variables: vec![],
                created_at: Utc::now(),
                updated_at: Utc::now(),
            }))
        }

        async fn render(
            &self,
            name: &str,
            variables: &HashMap<String, String>,
        ) -> Result<String, TemplateError> {
            let body = self.bodies.get(name).ok_or(TemplateError::NotFound)?;
            render_body(body, variables)
        }
    }

    #[derive(Debug, PartialEq)]
    enum RulerCall {
        Create {
            tenant: String,
            namespace: String,
            group: RuleGroup,
        },
        Delete {
            tenant: String,
            namespace: String,
            group_name: String,
        },
    }

    #[derive(Default)]
    struct FakeRuler {
        calls: Mutex<Vec<RulerCall>>,
        delete_not_found: bool,
        fail: bool,
    }

    #[async_trait]
    impl RulerApi for FakeRuler {
        async fn create_rule_group(
            &self,
            tenant: &str,
            namespace: &str,
            group: &RuleGroup,
        ) -> Result<(), CortexError> {
            self.calls.lock().unwrap().push(RulerCall::Create {
                tenant: tenant.to_string(),
                namespace: namespace.to_string(),
                group: group.clone(),
            });
            if self.fail {
                return Err(CortexError::Api {
                    status: 500,
                    message: "ruler unavailable".to_string(),
                });
            }
            Ok(())
        }

        async fn delete_rule_group(
            &self,
            tenant: &str,
            namespace: &str,
            group_name: &str,
        ) -> Result<(), CortexError> {
            self.calls.lock().unwrap().push(RulerCall::Delete {
                tenant: tenant.to_string(),
                namespace: namespace.to_string(),
                group_name: group_name.to_string(),
            });
            if self.delete_not_found {
                return Err(CortexError::NotFound);
            }
            if self.fail {
                return Err(CortexError::Api {
                    status: 500,
                    message: "ruler unavailable".to_string(),
                });
            }
            Ok(())
        }
    }

    fn member(template: &str, enabled: bool, variables: &[(&str, &str)]) -> Rule {
        Rule {
            id: 1,
            name: format!("siren_api_p_n_odpf_cpu_{template}"),
            namespace: "odpf".to_string(),
            group_name: "cpu".to_string(),
            template: template.to_string(),
            enabled,
            variables: variables
                .iter()
                .map(|(name, value)| RuleVariable {
                    name: name.to_string(),
                    variable_type: "string".to_string(),
                    value: value.to_string(),
                    description: String::new(),
                })
                .collect(),
            provider_namespace: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_empty_group_deletes_remote_group() {
        let ruler = FakeRuler::default();
        let renderer = FakeRenderer::with_body("cpu-usage", "- alert: X\n  expr: up\n");
        let members = vec![member("cpu-usage", false, &[])];

        sync_group_remote(&ruler, &renderer, "odpf-ns", "odpf", "cpu", &members)
            .await
            .unwrap();

        let calls = ruler.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0],
            RulerCall::Delete {
                tenant: "odpf-ns".to_string(),
                namespace: "odpf".to_string(),
                group_name: "cpu".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_delete_not_found_is_success() {
        let ruler = FakeRuler {
            delete_not_found: true,
            ..Default::default()
        };
        let renderer = FakeRenderer::with_body("cpu-usage", "");
        let members = vec![member("cpu-usage", false, &[])];

        sync_group_remote(&ruler, &renderer, "t", "odpf", "cpu", &members)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_other_delete_error_propagates() {
        let ruler = FakeRuler {
            fail: true,
            ..Default::default()
        };
        let renderer = FakeRenderer::with_body("cpu-usage", "");

        let err = sync_group_remote(&ruler, &renderer, "t", "odpf", "cpu", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, RuleError::Cortex(_)));
    }

    #[tokio::test]
    async fn test_enabled_members_pushed_as_one_group() {
        let ruler = FakeRuler::default();
        let mut renderer = FakeRenderer::with_body(
            "cpu-usage",
            "- alert: CpuHigh\n  expr: cpu > [[ .threshold ]]\n",
        );
        renderer.bodies.insert(
            "disk-usage".to_string(),
            "- alert: DiskHigh\n  expr: disk > 0.8\n".to_string(),
        );

        let members = vec![
            member("cpu-usage", true, &[("threshold", "0.9")]),
            member("disk-usage", true, &[]),
            member("cpu-usage", false, &[("threshold", "0.5")]),
        ];

        sync_group_remote(&ruler, &renderer, "odpf-ns", "odpf", "cpu", &members)
            .await
            .unwrap();

        let calls = ruler.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            RulerCall::Create {
                tenant,
                namespace,
                group,
            } => {
                assert_eq!(tenant, "odpf-ns");
                assert_eq!(namespace, "odpf");
                assert_eq!(group.name, "cpu");
                // the disabled member is excluded, order follows the input
                assert_eq!(group.rules.len(), 2);
                assert_eq!(group.rules[0].alert.as_deref(), Some("CpuHigh"));
                assert_eq!(group.rules[0].expr, "cpu > 0.9");
                assert_eq!(group.rules[1].alert.as_deref(), Some("DiskHigh"));
            }
            other => panic!("expected create, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_rendered_body_is_fatal() {
        let ruler = FakeRuler::default();
        let renderer = FakeRenderer::with_body("cpu-usage", "not: [a rule\n");
        let members = vec![member("cpu-usage", true, &[])];

        let err = sync_group_remote(&ruler, &renderer, "t", "odpf", "cpu", &members)
            .await
            .unwrap_err();
        assert!(matches!(err, RuleError::InvalidRuleBody(_)));
        assert!(ruler.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_failure_propagates() {
        let ruler = FakeRuler {
            fail: true,
            ..Default::default()
        };
        let renderer = FakeRenderer::with_body("cpu-usage", "- alert: X\n  expr: up\n");
        let members = vec![member("cpu-usage", true, &[])];

        let err = sync_group_remote(&ruler, &renderer, "t", "odpf", "cpu", &members)
            .await
            .unwrap_err();
        assert!(matches!(err, RuleError::Cortex(CortexError::Api { .. })));
    }
}
