//! Notification receivers, read-side.
//!
//! Receivers carry type-specific, possibly secret configuration (slack
//! tokens, pagerduty service keys, webhook urls). The subscription
//! synchronizer reads them to enrich subscription receiver references;
//! receiver CRUD and credential encryption live outside this crate.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgConnection;

pub const RECEIVER_TYPE_SLACK: &str = "slack";
pub const RECEIVER_TYPE_PAGERDUTY: &str = "pagerduty";
pub const RECEIVER_TYPE_HTTP: &str = "http";

/// A notification destination with stored configuration.
///
/// `receiver_type` stays a free-form string: unsupported values must surface
/// verbatim in the enrichment error rather than fail deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receiver {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub receiver_type: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub configurations: HashMap<String, serde_json::Value>,
}

/// Load every receiver row, on the caller's connection so a synchronizing
/// transaction sees a consistent snapshot.
pub async fn list_all(conn: &mut PgConnection) -> Result<Vec<Receiver>, sqlx::Error> {
    let rows: Vec<(
        i64,
        String,
        String,
        Json<HashMap<String, String>>,
        Json<HashMap<String, serde_json::Value>>,
    )> = sqlx::query_as(
        "SELECT id, name, type, labels, configurations FROM receivers ORDER BY id",
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(
            |(id, name, receiver_type, Json(labels), Json(configurations))| Receiver {
                id,
                name,
                receiver_type,
                labels,
                configurations,
            },
        )
        .collect())
}
