//! Subscriptions: per-tenant alert routing rules and their synchronization
//! into the remote alert-router's configuration.
//!
//! The remote routing document is namespace-scoped: any change to one
//! subscription republishes the union of every subscription in that
//! namespace.

mod enrichment;
mod repository;
mod synchronizer;

pub use enrichment::enrich_subscriptions;
pub use synchronizer::SubscriptionService;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cortex::CortexError;
use crate::routing::{ReceiverRoute, RoutingError};

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("subscription doesn't exist")]
    NotFound,

    #[error("provider not found")]
    ProviderNotFound,

    #[error("receiver id {0} does not exist")]
    ReceiverNotFound(i64),

    #[error("configuration.channel_name missing from receiver with id {0}")]
    MissingChannelName(i64),

    #[error("subscriptions for receiver type {0} not supported via Siren inside Cortex")]
    UnsupportedReceiverType(String),

    #[error("subscriptions for provider type '{0}' not supported")]
    UnsupportedProviderType(String),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Cortex(#[from] CortexError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A subscription-side receiver reference: which receiver, plus
/// subscription-level configuration such as the slack channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverMetadata {
    pub id: i64,
    #[serde(default)]
    pub configuration: BTreeMap<String, String>,
}

/// A persisted subscription. Receivers are kept sorted by id so remote
/// receiver names and document diffs stay deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    pub namespace_id: i64,
    pub urn: String,
    pub receivers: Vec<ReceiverMetadata>,
    #[serde(rename = "match", default)]
    pub match_labels: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller input for create/update; the id is assigned by the store.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub namespace_id: i64,
    pub urn: String,
    pub receivers: Vec<ReceiverMetadata>,
    pub match_labels: BTreeMap<String, String>,
}

/// A receiver reference merged with the live receiver's type and secrets.
/// Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedReceiver {
    pub id: i64,
    pub receiver_type: String,
    pub configuration: BTreeMap<String, String>,
}

/// A subscription whose receiver references have been enriched.
#[derive(Debug, Clone)]
pub struct EnrichedSubscription {
    pub id: i64,
    pub namespace_id: i64,
    pub urn: String,
    pub receivers: Vec<EnrichedReceiver>,
    pub match_labels: BTreeMap<String, String>,
}

pub(crate) fn sort_receivers(receivers: &mut [ReceiverMetadata]) {
    receivers.sort_by_key(|r| r.id);
}

/// Deterministic remote receiver name for one (subscription, receiver)
/// pair; `index` is the pair's position in the sorted receiver list.
pub fn receiver_route_name(subscription_urn: &str, receiver_id: i64, index: usize) -> String {
    format!("{subscription_urn}_receiverId_{receiver_id}_idx_{index}")
}

/// The routes one subscription contributes to its namespace's document.
pub fn receiver_routes(subscription: &EnrichedSubscription) -> Vec<ReceiverRoute> {
    subscription
        .receivers
        .iter()
        .enumerate()
        .map(|(index, receiver)| ReceiverRoute {
            name: receiver_route_name(&subscription.urn, receiver.id, index),
            receiver_type: receiver.receiver_type.clone(),
            match_labels: subscription.match_labels.clone(),
            configuration: receiver.configuration.clone(),
        })
        .collect()
}

/// All routes for a namespace: one per (subscription, receiver) pair.
pub fn routes_for_namespace(subscriptions: &[EnrichedSubscription]) -> Vec<ReceiverRoute> {
    subscriptions.iter().flat_map(receiver_routes).collect()
}
