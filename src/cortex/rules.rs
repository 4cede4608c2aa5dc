//! Rule-group wire format accepted by the ruler API.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A named rule group as pushed to one ruler namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleGroup {
    pub name: String,
    pub rules: Vec<RuleNode>,
}

/// One recording or alerting rule.
///
/// `deny_unknown_fields` makes deserialization the schema check for rendered
/// rule bodies: a template that renders keys outside this shape is a
/// rendering defect, not a user error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,
    pub expr: String,
    #[serde(rename = "for", default, skip_serializing_if = "Option::is_none")]
    pub hold_duration: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub annotations: HashMap<String, String>,
}

/// Parse a concatenation of rendered rule bodies as one YAML node list.
pub fn parse_rule_nodes(body: &str) -> Result<Vec<RuleNode>, serde_yaml::Error> {
    serde_yaml::from_str(body)
}
