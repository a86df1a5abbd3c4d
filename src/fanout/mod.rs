//! Concurrent delivery of one payload to many endpoints.

mod endpoint;

use std::{collections::HashMap, sync::Arc};

use futures_util::future::join_all;
use parking_lot::RwLock;

pub use endpoint::{ensure_endpoint, heal_endpoints, HealReport};

use crate::{
    platform::{Endpoint, Identity, Payload, Platform, PlatformError, RemoteHandle, Webhook, WebhookMessage},
    registry::Target,
};

/// Result of delivering to one target. Every target gets exactly one.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Delivered { target: Target, handle: RemoteHandle },
    Failed { target: Target, reason: String },
}

impl Delivery {
    pub fn target(&self) -> &Target {
        match self {
            Delivery::Delivered { target, .. } | Delivery::Failed { target, .. } => target,
        }
    }

    pub fn handle(&self) -> Option<&str> {
        match self {
            Delivery::Delivered { handle, .. } => Some(handle),
            Delivery::Failed { .. } => None,
        }
    }
}

/// Successful deliveries only, as (target, remote handle).
pub fn delivered(deliveries: &[Delivery]) -> impl Iterator<Item = (&Target, &str)> {
    deliveries.iter().filter_map(|d| Some((d.target(), d.handle()?)))
}

pub struct Fanout {
    platform: Arc<dyn Platform>,
    system: Identity,
    webhooks: RwLock<HashMap<Endpoint, Arc<dyn Webhook>>>,
}

impl Fanout {
    pub fn new(platform: Arc<dyn Platform>, system: Identity) -> Fanout {
        Fanout {
            platform,
            system,
            webhooks: RwLock::new(HashMap::new()),
        }
    }

    /// Cached client for `endpoint`. Two callers racing on a cold entry may
    /// both build one; the last insert wins.
    pub fn webhook(&self, endpoint: &Endpoint) -> Arc<dyn Webhook> {
        if let Some(hook) = self.webhooks.read().get(endpoint) {
            return hook.clone();
        }
        let hook = self.platform.webhook(endpoint);
        self.webhooks.write().insert(endpoint.clone(), hook.clone());
        hook
    }

    pub fn forget(&self, endpoint: &Endpoint) {
        self.webhooks.write().remove(endpoint);
    }

    /// Relays a user's message, rendered under the user's name and avatar.
    pub async fn relay_as_user(&self, payload: &Payload, targets: &[Target], identity: &Identity) -> Vec<Delivery> {
        self.dispatch(payload, targets, &identity.name, identity.avatar_url.as_deref()).await
    }

    /// Same fan-out, authored by the bridge itself.
    pub async fn broadcast_as_system(&self, payload: &Payload, targets: &[Target], sender_label: &str) -> Vec<Delivery> {
        self.dispatch(payload, targets, sender_label, self.system.avatar_url.as_deref()).await
    }

    async fn dispatch(&self, payload: &Payload, targets: &[Target], username: &str, avatar_url: Option<&str>) -> Vec<Delivery> {
        let payload = payload.for_relay();
        let sends = targets.iter().map(|target| {
            let message = WebhookMessage::new(payload.clone())
                .authored_by(username, avatar_url)
                .notifying(target.notify_role.as_deref());
            let hook = self.webhook(&target.endpoint);
            async move {
                match hook.execute(&message).await {
                    Ok(handle) => Delivery::Delivered { target: target.clone(), handle },
                    Err(err) => {
                        tracing::warn!(
                            community = %target.community_id,
                            channel = %target.channel_id,
                            error = %err,
                            "delivery failed"
                        );
                        Delivery::Failed { target: target.clone(), reason: err.to_string() }
                    }
                }
            }
        });
        let deliveries = join_all(sends).await;

        tracing::debug!(
            targets = targets.len(),
            delivered = delivered(&deliveries).count(),
            "fan-out finished"
        );
        deliveries
    }

    /// Replaces the content of an already delivered copy.
    pub async fn edit_copy(&self, endpoint: &Endpoint, handle: &str, payload: &Payload) -> Result<(), PlatformError> {
        let message = WebhookMessage::new(payload.for_relay());
        self.webhook(endpoint).edit(handle, &message).await
    }

    /// Deletes a delivered copy. A copy that is already gone counts as deleted.
    pub async fn delete_copy(&self, endpoint: &Endpoint, handle: &str) -> Result<(), PlatformError> {
        match self.webhook(endpoint).delete(handle).await {
            Err(PlatformError::NotFound) => Ok(()),
            other => other,
        }
    }
}
