//! Making sure every bound channel has a delivery endpoint we own.

use crate::{
    platform::{Endpoint, Platform},
    registry::Registry,
    AppResult,
};

use super::Fanout;

/// Returns the endpoint `owner_id` already has on `channel_id`, creating one
/// if there is none. Any failure is logged and yields `None`.
pub async fn ensure_endpoint(platform: &dyn Platform, channel_id: &str, owner_id: &str, name: &str) -> Option<Endpoint> {
    let hooks = match platform.channel_webhooks(channel_id).await {
        Ok(hooks) => hooks,
        Err(err) => {
            tracing::warn!(channel = channel_id, error = %err, "could not list endpoints");
            return None;
        }
    };

    if let Some(existing) = hooks.iter()
        .filter(|h| h.owner_id.as_deref() == Some(owner_id))
        .find_map(|h| h.endpoint())
    {
        return Some(existing);
    }

    match platform.create_webhook(channel_id, name).await {
        Ok(created) => {
            let endpoint = created.endpoint();
            if endpoint.is_none() {
                tracing::warn!(channel = channel_id, webhook = %created.id, "created endpoint came back without a token");
            } else {
                tracing::info!(channel = channel_id, webhook = %created.id, "created endpoint");
            }
            endpoint
        }
        Err(err) => {
            tracing::warn!(channel = channel_id, error = %err, "could not create endpoint");
            None
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HealReport {
    pub checked: usize,
    pub repaired: usize,
    pub failed: usize,
}

/// One health-check pass over every binding that has a channel. Endpoints
/// that changed are written back to the registry and evicted from the
/// fan-out cache; failures leave the binding as it was for the next pass.
pub async fn heal_endpoints(
    registry: &Registry,
    fanout: &Fanout,
    platform: &dyn Platform,
    owner_id: &str,
    name: &str,
) -> AppResult<HealReport> {
    let mut report = HealReport::default();

    for binding in registry.bindings().await? {
        let Some(channel_id) = &binding.channel_id else {
            continue;
        };
        report.checked += 1;

        let Some(endpoint) = ensure_endpoint(platform, channel_id, owner_id, name).await else {
            tracing::warn!(
                community = %binding.community_id,
                purpose = %binding.purpose,
                channel = %channel_id,
                "endpoint still missing, leaving binding for the next pass"
            );
            report.failed += 1;
            continue;
        };

        if binding.endpoint.as_ref() == Some(&endpoint) {
            continue;
        }

        registry.set_endpoint(&binding.community_id, binding.purpose, &endpoint).await?;
        if let Some(stale) = &binding.endpoint {
            fanout.forget(stale);
        }
        tracing::info!(
            community = %binding.community_id,
            purpose = %binding.purpose,
            webhook = %endpoint.id,
            "repaired endpoint"
        );
        report.repaired += 1;
    }

    Ok(report)
}
