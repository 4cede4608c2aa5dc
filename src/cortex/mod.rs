//! HTTP clients for the Cortex ruler and alertmanager APIs.
//!
//! Every call is tenant-scoped through the `X-Scope-OrgID` header. Clients
//! are produced by a [`CortexClientFactory`] that the synchronizers take as
//! a constructor argument, so tests inject fakes instead of patching
//! process-wide constructor state.
//!
//! No request timeout or retry is configured here: a synchronizer holds its
//! database transaction open across these calls and surfaces the first
//! failure as a transaction abort.

mod rules;

pub use rules::{parse_rule_nodes, RuleGroup, RuleNode};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Serialize;
use thiserror::Error;

/// Header carrying the tenant id on every remote call.
pub const TENANT_ID_HEADER: &str = "X-Scope-OrgID";

/// Errors from the remote Cortex APIs.
#[derive(Debug, Error)]
pub enum CortexError {
    /// The ruler has no such resource. Swallowed only when deleting a rule
    /// group; an error everywhere else.
    #[error("requested resource not found")]
    NotFound,

    #[error("cortex api error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_yaml::Error),

    #[error("invalid cortex host '{host}': {message}")]
    InvalidHost { host: String, message: String },
}

impl CortexError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CortexError::NotFound)
    }
}

/// Rule-group operations on the ruler API.
#[async_trait]
pub trait RulerApi: Send + Sync {
    async fn create_rule_group(
        &self,
        tenant: &str,
        namespace: &str,
        group: &RuleGroup,
    ) -> Result<(), CortexError>;

    async fn delete_rule_group(
        &self,
        tenant: &str,
        namespace: &str,
        group_name: &str,
    ) -> Result<(), CortexError>;
}

/// Routing-configuration upload on the alertmanager API.
#[async_trait]
pub trait AlertmanagerApi: Send + Sync {
    async fn create_alertmanager_config(
        &self,
        tenant: &str,
        config_yaml: &str,
        template_files: &HashMap<String, String>,
    ) -> Result<(), CortexError>;
}

/// Builds remote clients for a provider host.
pub trait CortexClientFactory: Send + Sync {
    fn ruler(&self, host: &str) -> Result<Arc<dyn RulerApi>, CortexError>;
    fn alertmanager(&self, host: &str) -> Result<Arc<dyn AlertmanagerApi>, CortexError>;
}

/// reqwest-backed client speaking both Cortex APIs.
#[derive(Clone, Debug)]
pub struct CortexClient {
    http: reqwest::Client,
    base_url: Url,
}

impl CortexClient {
    pub fn new(host: &str) -> Result<Self, CortexError> {
        Self::with_http_client(reqwest::Client::new(), host)
    }

    pub fn with_http_client(http: reqwest::Client, host: &str) -> Result<Self, CortexError> {
        let base_url = Url::parse(host).map_err(|e| CortexError::InvalidHost {
            host: host.to_string(),
            message: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(CortexError::InvalidHost {
                host: host.to_string(),
                message: "not a base url".to_string(),
            });
        }
        Ok(Self { http, base_url })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Checked at construction: the base url accepts path segments.
        url.path_segments_mut()
            .expect("base url validated in constructor")
            .pop_if_empty()
            .extend(segments);
        url
    }

    async fn check(response: reqwest::Response) -> Result<(), CortexError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::NOT_FOUND {
            return Err(CortexError::NotFound);
        }
        let message = response.text().await.unwrap_or_default();
        Err(CortexError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[derive(Serialize)]
struct AlertmanagerConfigPayload<'a> {
    template_files: &'a HashMap<String, String>,
    alertmanager_config: &'a str,
}

#[async_trait]
impl RulerApi for CortexClient {
    async fn create_rule_group(
        &self,
        tenant: &str,
        namespace: &str,
        group: &RuleGroup,
    ) -> Result<(), CortexError> {
        let body = serde_yaml::to_string(group)?;
        let response = self
            .http
            .post(self.url(&["api", "v1", "rules", namespace]))
            .header(TENANT_ID_HEADER, tenant)
            .header(reqwest::header::CONTENT_TYPE, "application/yaml")
            .body(body)
            .send()
            .await?;
        Self::check(response).await
    }

    async fn delete_rule_group(
        &self,
        tenant: &str,
        namespace: &str,
        group_name: &str,
    ) -> Result<(), CortexError> {
        let response = self
            .http
            .delete(self.url(&["api", "v1", "rules", namespace, group_name]))
            .header(TENANT_ID_HEADER, tenant)
            .send()
            .await?;
        Self::check(response).await
    }
}

#[async_trait]
impl AlertmanagerApi for CortexClient {
    async fn create_alertmanager_config(
        &self,
        tenant: &str,
        config_yaml: &str,
        template_files: &HashMap<String, String>,
    ) -> Result<(), CortexError> {
        let payload = AlertmanagerConfigPayload {
            template_files,
            alertmanager_config: config_yaml,
        };
        let body = serde_yaml::to_string(&payload)?;
        let response = self
            .http
            .post(self.url(&["api", "v1", "alerts"]))
            .header(TENANT_ID_HEADER, tenant)
            .header(reqwest::header::CONTENT_TYPE, "application/yaml")
            .body(body)
            .send()
            .await?;
        Self::check(response).await
    }
}

/// Default factory: one shared reqwest client, one `CortexClient` per host.
#[derive(Clone, Default)]
pub struct HttpCortexFactory {
    http: reqwest::Client,
}

impl HttpCortexFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CortexClientFactory for HttpCortexFactory {
    fn ruler(&self, host: &str) -> Result<Arc<dyn RulerApi>, CortexError> {
        Ok(Arc::new(CortexClient::with_http_client(
            self.http.clone(),
            host,
        )?))
    }

    fn alertmanager(&self, host: &str) -> Result<Arc<dyn AlertmanagerApi>, CortexError> {
        Ok(Arc::new(CortexClient::with_http_client(
            self.http.clone(),
            host,
        )?))
    }
}
