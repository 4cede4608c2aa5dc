//! Providers and namespaces, read-side.
//!
//! A namespace is a tenant-scoped grouping tied to one provider (an external
//! monitoring backend). Both synchronizers resolve this join before touching
//! the remote side; full CRUD for these rows lives outside this crate.

use serde::{Deserialize, Serialize};
use sqlx::PgConnection;

/// The only provider type the synchronizers currently push to.
pub const PROVIDER_TYPE_CORTEX: &str = "cortex";

/// An external monitoring/alerting backend hosting rules and routing config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: i64,
    pub urn: String,
    pub name: String,
    #[serde(rename = "type")]
    pub provider_type: String,
    pub host: String,
}

/// A tenant-scoped grouping tied to one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Namespace {
    pub id: i64,
    pub urn: String,
    pub name: String,
    pub provider_id: i64,
}

/// The provider metadata a synchronization needs: resolved once per call,
/// inside the transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderNamespaceInfo {
    pub namespace_urn: String,
    pub provider_urn: String,
    pub provider_type: String,
    pub provider_host: String,
}

/// Join a namespace id to its provider row. `None` means the caller should
/// fail with its "provider not found" consistency error.
pub async fn resolve_namespace_provider(
    conn: &mut PgConnection,
    namespace_id: i64,
) -> Result<Option<ProviderNamespaceInfo>, sqlx::Error> {
    let row: Option<(String, String, String, String)> = sqlx::query_as(
        r#"
        SELECT namespaces.urn, providers.urn, providers.type, providers.host
        FROM namespaces
        JOIN providers ON providers.id = namespaces.provider_id
        WHERE namespaces.id = $1
        "#,
    )
    .bind(namespace_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(
        |(namespace_urn, provider_urn, provider_type, provider_host)| ProviderNamespaceInfo {
            namespace_urn,
            provider_urn,
            provider_type,
            provider_host,
        },
    ))
}
