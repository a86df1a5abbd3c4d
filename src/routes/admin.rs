use std::sync::Arc;

use axum::{debug_handler, extract::{Query, State}, http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Deserialize;
use serde_json::json;

use crate::{
    config::Config,
    fanout::{ensure_endpoint, heal_endpoints, Fanout},
    platform::{Platform, PlatformError},
    registry::{Purpose, Registry},
    AppResult, AppState,
};

#[derive(Debug, Deserialize)]
pub(crate) struct BindBody {
    requester_id: String,
    community_id: String,
    purpose: Purpose,
    channel_id: String,
    notify_role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RequesterQuery {
    requester_id: String,
}

fn forbidden() -> Response {
    (StatusCode::FORBIDDEN, "admins only").into_response()
}

#[debug_handler(state = AppState)]
pub(crate) async fn bind_channel(
    State(registry): State<Registry>,
    State(platform): State<Arc<dyn Platform>>,
    State(config): State<Arc<Config>>,
    Json(body): Json<BindBody>,
) -> AppResult<Response> {
    if !config.admins.contains(&body.requester_id) {
        return Ok(forbidden());
    }

    let channel = match platform.channel(&body.channel_id).await {
        Ok(channel) => channel,
        Err(PlatformError::NotFound) => {
            return Ok((StatusCode::BAD_REQUEST, "channel not found").into_response());
        }
        Err(err) => return Err(err.into()),
    };
    if channel.community_id.as_deref() != Some(body.community_id.as_str()) {
        return Ok((StatusCode::BAD_REQUEST, "channel belongs to another community").into_response());
    }

    if let Some(role_id) = &body.notify_role {
        match platform.role(&body.community_id, role_id).await {
            Ok(_) => {}
            Err(PlatformError::NotFound) => {
                return Ok((StatusCode::BAD_REQUEST, "role not found").into_response());
            }
            Err(err) => return Err(err.into()),
        }
    }

    registry.bind(&body.community_id, body.purpose, &body.channel_id, body.notify_role.as_deref()).await?;

    let endpoint = ensure_endpoint(&*platform, &body.channel_id, &config.application_id, &config.webhook_name).await;
    let has_endpoint = match &endpoint {
        Some(endpoint) => registry.set_endpoint(&body.community_id, body.purpose, endpoint).await?,
        None => {
            tracing::warn!(
                community = %body.community_id,
                channel = %body.channel_id,
                "bound without an endpoint, the health check will retry"
            );
            false
        }
    };

    Ok(Json(json!({ "bound": true, "endpoint": has_endpoint })).into_response())
}

#[debug_handler(state = AppState)]
pub(crate) async fn list_bindings(
    State(registry): State<Registry>,
    State(config): State<Arc<Config>>,
    Query(RequesterQuery { requester_id }): Query<RequesterQuery>,
) -> AppResult<Response> {
    if !config.admins.contains(&requester_id) {
        return Ok(forbidden());
    }

    let bindings: Vec<_> = registry.bindings().await?
        .into_iter()
        .map(|b| json!({
            "community_id": b.community_id,
            "purpose": b.purpose,
            "channel_id": b.channel_id,
            "endpoint": b.endpoint.map(|e| e.id),
            "notify_role": b.notify_role,
        }))
        .collect();
    Ok(Json(bindings).into_response())
}

#[debug_handler(state = AppState)]
pub(crate) async fn heal(
    State(registry): State<Registry>,
    State(fanout): State<Arc<Fanout>>,
    State(platform): State<Arc<dyn Platform>>,
    State(config): State<Arc<Config>>,
    Query(RequesterQuery { requester_id }): Query<RequesterQuery>,
) -> AppResult<Response> {
    if !config.admins.contains(&requester_id) {
        return Ok(forbidden());
    }

    let report = heal_endpoints(&registry, &fanout, &*platform, &config.application_id, &config.webhook_name).await?;
    Ok(Json(json!({
        "checked": report.checked,
        "repaired": report.repaired,
        "failed": report.failed,
    })).into_response())
}
