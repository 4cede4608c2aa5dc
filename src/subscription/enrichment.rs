//! Receiver enrichment: resolve every receiver reference to a live receiver
//! row and merge in the type-specific secret fields.

use crate::receiver::{
    Receiver, RECEIVER_TYPE_HTTP, RECEIVER_TYPE_PAGERDUTY, RECEIVER_TYPE_SLACK,
};

use super::{EnrichedReceiver, EnrichedSubscription, Subscription, SubscriptionError};

/// Enrich every subscription's receiver references against the full
/// receiver list.
///
/// Every referenced id must exist, and slack references must carry a
/// `channel_name` in their subscription-level configuration. Stored secrets
/// (`token`, `service_key`, `url`) are copied into the ephemeral view when
/// present; the result is render input, never persisted.
pub fn enrich_subscriptions(
    subscriptions: &[Subscription],
    all_receivers: &[Receiver],
) -> Result<Vec<EnrichedSubscription>, SubscriptionError> {
    subscriptions
        .iter()
        .map(|subscription| {
            let receivers = subscription
                .receivers
                .iter()
                .map(|reference| enrich_receiver(reference, all_receivers))
                .collect::<Result<Vec<_>, _>>()?;

            Ok(EnrichedSubscription {
                id: subscription.id,
                namespace_id: subscription.namespace_id,
                urn: subscription.urn.clone(),
                receivers,
                match_labels: subscription.match_labels.clone(),
            })
        })
        .collect()
}

fn enrich_receiver(
    reference: &super::ReceiverMetadata,
    all_receivers: &[Receiver],
) -> Result<EnrichedReceiver, SubscriptionError> {
    let receiver = all_receivers
        .iter()
        .find(|r| r.id == reference.id)
        .ok_or(SubscriptionError::ReceiverNotFound(reference.id))?;

    let mut configuration = reference.configuration.clone();

    match receiver.receiver_type.as_str() {
        RECEIVER_TYPE_SLACK => {
            if !configuration.contains_key("channel_name") {
                return Err(SubscriptionError::MissingChannelName(reference.id));
            }
            copy_secret(&mut configuration, receiver, "token");
        }
        RECEIVER_TYPE_PAGERDUTY => {
            copy_secret(&mut configuration, receiver, "service_key");
        }
        RECEIVER_TYPE_HTTP => {
            copy_secret(&mut configuration, receiver, "url");
        }
        other => {
            return Err(SubscriptionError::UnsupportedReceiverType(
                other.to_string(),
            ));
        }
    }

    Ok(EnrichedReceiver {
        id: reference.id,
        receiver_type: receiver.receiver_type.clone(),
        configuration,
    })
}

fn copy_secret(
    configuration: &mut std::collections::BTreeMap<String, String>,
    receiver: &Receiver,
    key: &str,
) {
    if let Some(value) = receiver.configurations.get(key).and_then(|v| v.as_str()) {
        configuration.insert(key.to_string(), value.to_string());
    }
}
