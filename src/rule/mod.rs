//! Alerting rules: templated rule rows and their synchronization into
//! remote rule groups.
//!
//! A rule group is the set of enabled rules sharing `(namespace, group_name,
//! provider_namespace)`; the remote side always receives the whole group,
//! recomputed after every local change.

mod repository;
mod synchronizer;

pub use repository::{RuleFilter, RuleRepository};
pub use synchronizer::RuleService;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cortex::CortexError;
use crate::template::{TemplateError, TemplateVariable};

/// Prefix of every derived rule name.
pub const RULE_NAME_PREFIX: &str = "siren_api";

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("template not found")]
    TemplateNotFound,

    #[error("provider not found")]
    ProviderNotFound,

    #[error("provider not supported")]
    ProviderNotSupported,

    /// Rendered group output did not parse as a rule-node list. This is a
    /// rendering defect in a stored template, not a caller error.
    #[error("rendered rule group is not valid rule yaml: {0}")]
    InvalidRuleBody(#[source] serde_yaml::Error),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Cortex(#[from] CortexError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A persisted alerting rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: i64,
    /// Derived, globally unique; see [`canonical_rule_name`].
    pub name: String,
    pub namespace: String,
    pub group_name: String,
    /// Template reference by name.
    pub template: String,
    pub enabled: bool,
    /// Always one entry per declared template variable, in declaration order.
    pub variables: Vec<RuleVariable>,
    pub provider_namespace: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A resolved rule variable (declared variable plus its effective value).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleVariable {
    pub name: String,
    #[serde(rename = "type", default)]
    pub variable_type: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub description: String,
}

/// Caller input for [`RuleService::upsert`]; name and id are derived.
#[derive(Debug, Clone)]
pub struct NewRule {
    pub namespace: String,
    pub group_name: String,
    pub template: String,
    pub enabled: bool,
    pub variables: Vec<RuleVariable>,
    pub provider_namespace: i64,
}

/// Name used before provider metadata is known; only template selection and
/// early logging see it.
pub fn provisional_rule_name(namespace: &str, group_name: &str, template: &str) -> String {
    format!("{RULE_NAME_PREFIX}_{namespace}_{group_name}_{template}")
}

/// The persisted identity: unique across providers and namespaces, so
/// upsert-by-name is idempotent.
pub fn canonical_rule_name(
    provider_urn: &str,
    namespace_urn: &str,
    namespace: &str,
    group_name: &str,
    template: &str,
) -> String {
    format!("{RULE_NAME_PREFIX}_{provider_urn}_{namespace_urn}_{namespace}_{group_name}_{template}")
}

/// Merge rule-supplied variables with template defaults.
///
/// The output carries exactly one entry per declared template variable, in
/// the template's declared order; a same-named rule variable wins over the
/// default, and supplied variables the template does not declare are
/// dropped.
pub fn merge_variables_with_defaults(
    template_variables: &[TemplateVariable],
    rule_variables: &[RuleVariable],
) -> Vec<RuleVariable> {
    template_variables
        .iter()
        .map(|declared| {
            rule_variables
                .iter()
                .rfind(|supplied| supplied.name == declared.name)
                .cloned()
                .unwrap_or_else(|| RuleVariable {
                    name: declared.name.clone(),
                    variable_type: declared.variable_type.clone(),
                    value: declared.default.clone(),
                    description: declared.description.clone(),
                })
        })
        .collect()
}

/// Flatten resolved variables into the render input map.
pub(crate) fn variable_map(variables: &[RuleVariable]) -> HashMap<String, String> {
    variables
        .iter()
        .map(|v| (v.name.clone(), v.value.clone()))
        .collect()
}
