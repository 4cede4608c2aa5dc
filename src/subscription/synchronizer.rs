//! The subscription synchronizer: write the local row and republish the
//! owning namespace's entire routing document, inside one transaction.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use sqlx::{PgConnection, PgPool};

use crate::cortex::CortexClientFactory;
use crate::metrics::{REMOTE_PUSH_DURATION, ROUTING_SYNCS_TOTAL};
use crate::provider::{resolve_namespace_provider, PROVIDER_TYPE_CORTEX};
use crate::receiver;
use crate::routing::{self, HELPER_TEMPLATE, HELPER_TEMPLATE_NAME};

use super::{
    enrich_subscriptions, repository, routes_for_namespace, sort_receivers, NewSubscription,
    Subscription, SubscriptionError,
};

const SLOW_PUSH_WARN_SECS: f64 = 1.0;

/// Creates, updates and deletes subscriptions. As with rules, there is no
/// plain CRUD write path: every change republishes the namespace's routing
/// document before the local transaction commits.
pub struct SubscriptionService {
    pool: PgPool,
    clients: Arc<dyn CortexClientFactory>,
}

impl SubscriptionService {
    pub fn new(pool: PgPool, clients: Arc<dyn CortexClientFactory>) -> Self {
        Self { pool, clients }
    }

    pub async fn create(
        &self,
        mut subscription: NewSubscription,
    ) -> Result<Subscription, SubscriptionError> {
        sort_receivers(&mut subscription.receivers);

        let mut tx = self.pool.begin().await?;
        let stored = repository::insert(&mut tx, &subscription).await?;
        self.sync_namespace(&mut tx, stored.namespace_id).await?;
        tx.commit().await?;

        tracing::info!(urn = %stored.urn, namespace_id = stored.namespace_id, "subscription created");
        Ok(stored)
    }

    pub async fn update(
        &self,
        id: i64,
        mut subscription: NewSubscription,
    ) -> Result<Subscription, SubscriptionError> {
        sort_receivers(&mut subscription.receivers);

        let mut tx = self.pool.begin().await?;
        let stored = repository::update(&mut tx, id, &subscription).await?;
        self.sync_namespace(&mut tx, stored.namespace_id).await?;
        tx.commit().await?;

        tracing::info!(urn = %stored.urn, namespace_id = stored.namespace_id, "subscription updated");
        Ok(stored)
    }

    /// Deleting an absent subscription is a no-op; a present one republishes
    /// the namespace document without it.
    pub async fn delete(&self, id: i64) -> Result<(), SubscriptionError> {
        let mut tx = self.pool.begin().await?;

        let Some(existing) = repository::find(&mut tx, id).await? else {
            return Ok(());
        };

        repository::delete(&mut tx, id).await?;
        self.sync_namespace(&mut tx, existing.namespace_id).await?;
        tx.commit().await?;

        tracing::info!(urn = %existing.urn, namespace_id = existing.namespace_id, "subscription deleted");
        Ok(())
    }

    pub async fn get(&self, id: i64) -> Result<Option<Subscription>, SubscriptionError> {
        let mut conn = self.pool.acquire().await?;
        repository::find(&mut conn, id).await
    }

    pub async fn list(&self) -> Result<Vec<Subscription>, SubscriptionError> {
        let mut conn = self.pool.acquire().await?;
        repository::list_all(&mut conn).await
    }

    /// Recompute and push the namespace's routing document from every
    /// subscription it currently contains, on the caller's transaction.
    async fn sync_namespace(
        &self,
        conn: &mut PgConnection,
        namespace_id: i64,
    ) -> Result<(), SubscriptionError> {
        let result = self.sync_namespace_inner(conn, namespace_id).await;
        let outcome = if result.is_ok() { "pushed" } else { "failed" };
        ROUTING_SYNCS_TOTAL.with_label_values(&[outcome]).inc();
        result
    }

    async fn sync_namespace_inner(
        &self,
        conn: &mut PgConnection,
        namespace_id: i64,
    ) -> Result<(), SubscriptionError> {
        let info = resolve_namespace_provider(&mut *conn, namespace_id)
            .await?
            .ok_or(SubscriptionError::ProviderNotFound)?;

        let subscriptions = repository::list_in_namespace(&mut *conn, namespace_id).await?;
        let receivers = receiver::list_all(&mut *conn).await?;
        let enriched = enrich_subscriptions(&subscriptions, &receivers)?;
        let routes = routes_for_namespace(&enriched);

        if info.provider_type != PROVIDER_TYPE_CORTEX {
            return Err(SubscriptionError::UnsupportedProviderType(
                info.provider_type,
            ));
        }

        let alertmanager = self.clients.alertmanager(&info.provider_host)?;
        let document = routing::generate(&routes)?;
        let template_files = HashMap::from([(
            HELPER_TEMPLATE_NAME.to_string(),
            HELPER_TEMPLATE.to_string(),
        )]);

        let pushed_at = Instant::now();
        let outcome = alertmanager
            .create_alertmanager_config(&info.namespace_urn, &document, &template_files)
            .await;
        let elapsed = pushed_at.elapsed().as_secs_f64();
        REMOTE_PUSH_DURATION
            .with_label_values(&["alertmanager"])
            .observe(elapsed);
        if elapsed > SLOW_PUSH_WARN_SECS {
            tracing::warn!(
                api = "alertmanager",
                elapsed_secs = elapsed,
                "slow remote push held the local transaction open"
            );
        }
        outcome?;

        tracing::info!(
            namespace_id,
            tenant = %info.namespace_urn,
            routes = routes.len(),
            "pushed namespace routing document"
        );
        Ok(())
    }
}
