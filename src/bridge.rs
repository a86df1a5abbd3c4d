use std::sync::Arc;

use serde::Deserialize;

use crate::{
    fanout::{Delivery, Fanout},
    platform::{Identity, Payload},
    registry::{Purpose, Registry},
    AppResult,
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayOptions {
    /// Community the payload came from. Skipped unless `include_origin`.
    #[serde(default)]
    pub origin_community: Option<String>,
    #[serde(default)]
    pub include_origin: bool,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl RelayOptions {
    fn excluded(&self) -> Vec<String> {
        let mut excluded = self.exclude.clone();
        if let Some(origin) = &self.origin_community {
            if !self.include_origin && !excluded.contains(origin) {
                excluded.push(origin.clone());
            }
        }
        excluded
    }
}

/// Federation-wide relay and broadcast.
#[derive(Clone)]
pub struct Bridge {
    registry: Registry,
    fanout: Arc<Fanout>,
    sender_label: String,
}

impl Bridge {
    pub fn new(registry: Registry, fanout: Arc<Fanout>, sender_label: &str) -> Bridge {
        Bridge {
            registry,
            fanout,
            sender_label: sender_label.to_owned(),
        }
    }

    pub async fn relay(&self, payload: &Payload, purpose: Purpose, identity: &Identity, options: &RelayOptions) -> AppResult<Vec<Delivery>> {
        let targets = self.registry.resolve_targets(purpose, &options.excluded()).await?;
        tracing::debug!(%purpose, author = %identity.name, targets = targets.len(), "relaying");
        Ok(self.fanout.relay_as_user(payload, &targets, identity).await)
    }

    pub async fn broadcast(&self, payload: &Payload, purpose: Purpose, options: &RelayOptions) -> AppResult<Vec<Delivery>> {
        let targets = self.registry.resolve_targets(purpose, &options.excluded()).await?;
        tracing::debug!(%purpose, targets = targets.len(), "broadcasting");
        Ok(self.fanout.broadcast_as_system(payload, &targets, &self.sender_label).await)
    }
}
