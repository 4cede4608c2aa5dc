//! Routing-configuration generation for the remote alert-router.
//!
//! `generate` is a pure function from an enriched receiver list to the full
//! alertmanager configuration document for one tenant. The document is built
//! as typed structs, serialized to YAML, then re-parsed through the strict
//! model and referentially checked before it is handed to the client — a
//! failure after serialization is a generation defect, not a caller error.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::receiver::{RECEIVER_TYPE_HTTP, RECEIVER_TYPE_PAGERDUTY, RECEIVER_TYPE_SLACK};

/// File name the alert-router expects for the shared notification templates.
pub const HELPER_TEMPLATE_NAME: &str = "helper.tmpl";

/// Notification templates uploaded alongside every routing document.
pub const HELPER_TEMPLATE: &str = include_str!("helper.tmpl");

/// Catch-all receiver present in every generated document.
const DEFAULT_RECEIVER: &str = "default";

const RESOLVE_TIMEOUT: &str = "5m";
const SLACK_API_URL: &str = "https://slack.com/api/chat.postMessage";
const PAGERDUTY_URL: &str = "https://events.pagerduty.com/v2/enqueue";

const GROUP_WAIT: &str = "30s";
const GROUP_INTERVAL: &str = "30m";
const REPEAT_INTERVAL: &str = "4h";
const GROUP_BY: [&str; 6] = [
    "alertname",
    "severity",
    "owner",
    "service_name",
    "time_stamp",
    "identifier",
];

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("subscriptions for receiver type {0} not supported via Siren inside Cortex")]
    UnsupportedReceiverType(String),

    #[error("generated routing document failed validation: {0}")]
    Invalid(String),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// One route to generate: the deterministic receiver name assigned by the
/// subscription synchronizer, the owning subscription's match labels, and
/// the enriched receiver configuration.
#[derive(Debug, Clone)]
pub struct ReceiverRoute {
    pub name: String,
    pub receiver_type: String,
    pub match_labels: BTreeMap<String, String>,
    pub configuration: BTreeMap<String, String>,
}

/// The routing document, shaped as the alert-router's own config schema.
/// `deny_unknown_fields` keeps the round-trip validation honest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingConfig {
    pub templates: Vec<String>,
    pub global: GlobalConfig,
    pub receivers: Vec<ReceiverEntry>,
    pub route: Route,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    pub resolve_timeout: String,
    pub slack_api_url: String,
    pub pagerduty_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReceiverEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack_configs: Option<Vec<SlackConfig>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagerduty_configs: Option<Vec<PagerdutyConfig>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_configs: Option<Vec<WebhookConfig>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlackConfig {
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_config: Option<HttpClientConfig>,
    pub send_resolved: bool,
    pub icon_emoji: String,
    pub color: String,
    pub title: String,
    pub pretext: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpClientConfig {
    pub authorization: Authorization,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Authorization {
    pub credentials: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PagerdutyConfig {
    pub service_key: String,
    pub send_resolved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    pub url: String,
    pub send_resolved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Route {
    pub receiver: String,
    pub group_by: Vec<String>,
    pub group_wait: String,
    pub group_interval: String,
    pub repeat_interval: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<ChildRoute>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChildRoute {
    pub receiver: String,
    #[serde(
        rename = "match",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub match_labels: BTreeMap<String, String>,
    #[serde(rename = "continue")]
    pub continue_matching: bool,
}

/// Generate the full routing document for one tenant.
pub fn generate(routes: &[ReceiverRoute]) -> Result<String, RoutingError> {
    let config = build_config(routes)?;
    let yaml = serde_yaml::to_string(&config)?;
    validate(&yaml)?;
    Ok(yaml)
}

fn build_config(routes: &[ReceiverRoute]) -> Result<RoutingConfig, RoutingError> {
    let mut receivers = vec![ReceiverEntry {
        name: DEFAULT_RECEIVER.to_string(),
        slack_configs: None,
        pagerduty_configs: None,
        webhook_configs: None,
    }];
    let mut child_routes = Vec::with_capacity(routes.len());

    for route in routes {
        receivers.push(receiver_entry(route)?);
        child_routes.push(ChildRoute {
            receiver: route.name.clone(),
            match_labels: route.match_labels.clone(),
            continue_matching: true,
        });
    }

    Ok(RoutingConfig {
        templates: vec![HELPER_TEMPLATE_NAME.to_string()],
        global: GlobalConfig {
            resolve_timeout: RESOLVE_TIMEOUT.to_string(),
            slack_api_url: SLACK_API_URL.to_string(),
            pagerduty_url: PAGERDUTY_URL.to_string(),
        },
        receivers,
        route: Route {
            receiver: DEFAULT_RECEIVER.to_string(),
            group_by: GROUP_BY.iter().map(|s| s.to_string()).collect(),
            group_wait: GROUP_WAIT.to_string(),
            group_interval: GROUP_INTERVAL.to_string(),
            repeat_interval: REPEAT_INTERVAL.to_string(),
            routes: child_routes,
        },
    })
}

fn receiver_entry(route: &ReceiverRoute) -> Result<ReceiverEntry, RoutingError> {
    let mut entry = ReceiverEntry {
        name: route.name.clone(),
        slack_configs: None,
        pagerduty_configs: None,
        webhook_configs: None,
    };

    match route.receiver_type.as_str() {
        RECEIVER_TYPE_SLACK => {
            let channel = route
                .configuration
                .get("channel_name")
                .cloned()
                .unwrap_or_default();
            let http_config = route
                .configuration
                .get("token")
                .map(|token| HttpClientConfig {
                    authorization: Authorization {
                        credentials: token.clone(),
                    },
                });
            entry.slack_configs = Some(vec![SlackConfig {
                channel: format!("#{channel}"),
                http_config,
                send_resolved: true,
                icon_emoji: ":eagle:".to_string(),
                color: r#"{{ template "slack.color" . }}"#.to_string(),
                title: String::new(),
                pretext: r#"{{ template "slack.pretext" . }}"#.to_string(),
                text: r#"{{ template "slack.body" . }}"#.to_string(),
            }]);
        }
        RECEIVER_TYPE_PAGERDUTY => {
            entry.pagerduty_configs = Some(vec![PagerdutyConfig {
                service_key: route
                    .configuration
                    .get("service_key")
                    .cloned()
                    .unwrap_or_default(),
                send_resolved: true,
            }]);
        }
        RECEIVER_TYPE_HTTP => {
            entry.webhook_configs = Some(vec![WebhookConfig {
                url: route.configuration.get("url").cloned().unwrap_or_default(),
                send_resolved: true,
            }]);
        }
        other => {
            return Err(RoutingError::UnsupportedReceiverType(other.to_string()));
        }
    }

    Ok(entry)
}

/// Re-parse the serialized document and check referential integrity before
/// anything leaves the process.
fn validate(yaml: &str) -> Result<(), RoutingError> {
    let config: RoutingConfig = serde_yaml::from_str(yaml)
        .map_err(|e| RoutingError::Invalid(format!("document does not round-trip: {e}")))?;

    let mut names = HashSet::new();
    for receiver in &config.receivers {
        if !names.insert(receiver.name.as_str()) {
            return Err(RoutingError::Invalid(format!(
                "duplicate receiver name '{}'",
                receiver.name
            )));
        }

        let blocks = [
            receiver.slack_configs.is_some(),
            receiver.pagerduty_configs.is_some(),
            receiver.webhook_configs.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count();

        if receiver.name == DEFAULT_RECEIVER {
            if blocks != 0 {
                return Err(RoutingError::Invalid(
                    "default receiver must carry no config block".to_string(),
                ));
            }
        } else if blocks != 1 {
            return Err(RoutingError::Invalid(format!(
                "receiver '{}' must carry exactly one config block",
                receiver.name
            )));
        }

        for slack in receiver.slack_configs.iter().flatten() {
            if slack.channel == "#" || slack.channel.is_empty() {
                return Err(RoutingError::Invalid(format!(
                    "slack receiver '{}' has no channel",
                    receiver.name
                )));
            }
        }
    }

    if !names.contains(config.route.receiver.as_str()) {
        return Err(RoutingError::Invalid(format!(
            "route references undeclared receiver '{}'",
            config.route.receiver
        )));
    }
    for child in &config.route.routes {
        if !names.contains(child.receiver.as_str()) {
            return Err(RoutingError::Invalid(format!(
                "route references undeclared receiver '{}'",
                child.receiver
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slack_route(name: &str) -> ReceiverRoute {
        ReceiverRoute {
            name: name.to_string(),
            receiver_type: "slack".to_string(),
            match_labels: BTreeMap::from([("team".to_string(), "infra".to_string())]),
            configuration: BTreeMap::from([
                ("channel_name".to_string(), "alerts".to_string()),
                ("token".to_string(), "xoxb-1".to_string()),
            ]),
        }
    }

    #[test]
    fn test_generate_round_trips() {
        let routes = vec![
            slack_route("sub_receiverId_1_idx_0"),
            ReceiverRoute {
                name: "sub_receiverId_2_idx_1".to_string(),
                receiver_type: "pagerduty".to_string(),
                match_labels: BTreeMap::new(),
                configuration: BTreeMap::from([(
                    "service_key".to_string(),
                    "pd-key".to_string(),
                )]),
            },
        ];

        let yaml = generate(&routes).unwrap();
        let parsed: RoutingConfig = serde_yaml::from_str(&yaml).unwrap();

        // default + one per route
        assert_eq!(parsed.receivers.len(), 3);
        assert_eq!(parsed.route.routes.len(), 2);
        assert_eq!(parsed.route.receiver, "default");
        assert_eq!(parsed.global.resolve_timeout, "5m");
        assert_eq!(parsed.route.group_wait, "30s");
        assert_eq!(parsed.route.group_interval, "30m");
        assert_eq!(parsed.route.repeat_interval, "4h");
        assert_eq!(
            parsed.route.group_by,
            vec![
                "alertname",
                "severity",
                "owner",
                "service_name",
                "time_stamp",
                "identifier"
            ]
        );
    }

    #[test]
    fn test_generate_propagates_match_labels() {
        let yaml = generate(&[slack_route("r0")]).unwrap();
        let parsed: RoutingConfig = serde_yaml::from_str(&yaml).unwrap();

        let child = &parsed.route.routes[0];
        assert_eq!(child.receiver, "r0");
        assert!(child.continue_matching);
        assert_eq!(child.match_labels["team"], "infra");
    }

    #[test]
    fn test_generate_copies_secrets_into_blocks() {
        let yaml = generate(&[slack_route("r0")]).unwrap();
        let parsed: RoutingConfig = serde_yaml::from_str(&yaml).unwrap();

        let slack = parsed.receivers[1].slack_configs.as_ref().unwrap();
        assert_eq!(slack[0].channel, "#alerts");
        assert_eq!(
            slack[0].http_config.as_ref().unwrap().authorization.credentials,
            "xoxb-1"
        );
    }

    #[test]
    fn test_generate_empty_namespace_is_default_only() {
        let yaml = generate(&[]).unwrap();
        let parsed: RoutingConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.receivers.len(), 1);
        assert!(parsed.route.routes.is_empty());
    }

    #[test]
    fn test_generate_rejects_unknown_type() {
        let mut route = slack_route("r0");
        route.receiver_type = "carrier-pigeon".to_string();
        let err = generate(&[route]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "subscriptions for receiver type carrier-pigeon not supported via Siren inside Cortex"
        );
    }

    #[test]
    fn test_validation_catches_missing_slack_channel() {
        let mut route = slack_route("r0");
        route.configuration.remove("channel_name");
        let err = generate(&[route]).unwrap_err();
        assert!(matches!(err, RoutingError::Invalid(_)));
        assert!(err.to_string().contains("has no channel"));
    }

    #[test]
    fn test_helper_template_embedded() {
        assert!(HELPER_TEMPLATE.contains(r#"define "slack.body""#));
        assert_eq!(HELPER_TEMPLATE_NAME, "helper.tmpl");
    }
}
