use std::sync::Arc;

use axum::{debug_handler, extract::{Path, State}, http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::{Deserialize, Serialize};

use crate::{
    bridge::{Bridge, RelayOptions},
    config::Config,
    fanout::Delivery,
    platform::{Identity, Payload, Platform},
    registry::Purpose,
    AppResult, AppState,
};

#[derive(Debug, Deserialize)]
pub(crate) struct RelayBody {
    author_id: String,
    /// Skips the identity lookup when the caller already has it.
    author: Option<Identity>,
    payload: Payload,
    #[serde(flatten)]
    options: RelayOptions,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BroadcastBody {
    requester_id: String,
    payload: Payload,
    #[serde(flatten)]
    options: RelayOptions,
}

#[derive(Debug, Serialize)]
struct Delivered {
    community_id: String,
    channel_id: String,
    message_id: String,
}

#[derive(Debug, Serialize)]
struct Failed {
    community_id: String,
    reason: String,
}

#[derive(Debug, Default, Serialize)]
pub(crate) struct DeliverySummary {
    delivered: Vec<Delivered>,
    failed: Vec<Failed>,
}

impl From<Vec<Delivery>> for DeliverySummary {
    fn from(deliveries: Vec<Delivery>) -> Self {
        let mut summary = DeliverySummary::default();
        for delivery in deliveries {
            match delivery {
                Delivery::Delivered { target, handle } => summary.delivered.push(Delivered {
                    community_id: target.community_id,
                    channel_id: target.channel_id,
                    message_id: handle,
                }),
                Delivery::Failed { target, reason } => summary.failed.push(Failed {
                    community_id: target.community_id,
                    reason,
                }),
            }
        }
        summary
    }
}

#[debug_handler(state = AppState)]
pub(crate) async fn relay(
    State(bridge): State<Bridge>,
    State(platform): State<Arc<dyn Platform>>,
    Path(purpose): Path<Purpose>,
    Json(RelayBody { author_id, author, payload, options }): Json<RelayBody>,
) -> AppResult<Json<DeliverySummary>> {
    let identity = match author {
        Some(identity) => identity,
        None => platform.user_identity(&author_id).await.unwrap_or_else(|err| {
            tracing::debug!(user = %author_id, error = %err, "identity lookup failed, relaying under id");
            Identity { name: author_id.clone(), avatar_url: None }
        }),
    };

    Ok(Json(bridge.relay(&payload, purpose, &identity, &options).await?.into()))
}

#[debug_handler(state = AppState)]
pub(crate) async fn broadcast(
    State(bridge): State<Bridge>,
    State(config): State<Arc<Config>>,
    Path(purpose): Path<Purpose>,
    Json(BroadcastBody { requester_id, payload, options }): Json<BroadcastBody>,
) -> AppResult<Response> {
    if !config.admins.contains(&requester_id) {
        return Ok((StatusCode::FORBIDDEN, "admins only").into_response());
    }

    let summary: DeliverySummary = bridge.broadcast(&payload, purpose, &options).await?.into();
    Ok(Json(summary).into_response())
}
