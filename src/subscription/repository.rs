//! Postgres access for subscription rows.
//!
//! All mutations run on a caller-supplied connection: the synchronizer
//! scopes them to the transaction it holds across the remote push.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgConnection;

use super::{NewSubscription, ReceiverMetadata, Subscription, SubscriptionError};

use std::collections::BTreeMap;

type SubscriptionRow = (
    i64,
    i64,
    String,
    Json<Vec<ReceiverMetadata>>,
    Json<BTreeMap<String, String>>,
    DateTime<Utc>,
    DateTime<Utc>,
);

const SUBSCRIPTION_COLUMNS: &str =
    "id, namespace_id, urn, receivers, match_labels, created_at, updated_at";

fn from_row(row: SubscriptionRow) -> Subscription {
    let (id, namespace_id, urn, Json(receivers), Json(match_labels), created_at, updated_at) = row;
    Subscription {
        id,
        namespace_id,
        urn,
        receivers,
        match_labels,
        created_at,
        updated_at,
    }
}

pub(crate) async fn insert(
    conn: &mut PgConnection,
    subscription: &NewSubscription,
) -> Result<Subscription, SubscriptionError> {
    let row: SubscriptionRow = sqlx::query_as(&format!(
        r#"
        INSERT INTO subscriptions (namespace_id, urn, receivers, match_labels)
        VALUES ($1, $2, $3, $4)
        RETURNING {SUBSCRIPTION_COLUMNS}
        "#
    ))
    .bind(subscription.namespace_id)
    .bind(&subscription.urn)
    .bind(Json(&subscription.receivers))
    .bind(Json(&subscription.match_labels))
    .fetch_one(&mut *conn)
    .await?;

    Ok(from_row(row))
}

/// Update in place; an absent row is the caller's consistency error.
pub(crate) async fn update(
    conn: &mut PgConnection,
    id: i64,
    subscription: &NewSubscription,
) -> Result<Subscription, SubscriptionError> {
    let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
        r#"
        UPDATE subscriptions
        SET namespace_id = $1, urn = $2, receivers = $3, match_labels = $4, updated_at = NOW()
        WHERE id = $5
        RETURNING {SUBSCRIPTION_COLUMNS}
        "#
    ))
    .bind(subscription.namespace_id)
    .bind(&subscription.urn)
    .bind(Json(&subscription.receivers))
    .bind(Json(&subscription.match_labels))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(from_row).ok_or(SubscriptionError::NotFound)
}

pub(crate) async fn delete(conn: &mut PgConnection, id: i64) -> Result<(), SubscriptionError> {
    sqlx::query("DELETE FROM subscriptions WHERE id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub(crate) async fn find(
    conn: &mut PgConnection,
    id: i64,
) -> Result<Option<Subscription>, SubscriptionError> {
    let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
        "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(from_row))
}

/// Every subscription currently in the namespace; the remote document is
/// the union of all of them.
pub(crate) async fn list_in_namespace(
    conn: &mut PgConnection,
    namespace_id: i64,
) -> Result<Vec<Subscription>, SubscriptionError> {
    let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
        "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE namespace_id = $1 ORDER BY id"
    ))
    .bind(namespace_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(from_row).collect())
}

pub(crate) async fn list_all(
    conn: &mut PgConnection,
) -> Result<Vec<Subscription>, SubscriptionError> {
    let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
        "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions ORDER BY id"
    ))
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(from_row).collect())
}
