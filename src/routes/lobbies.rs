use std::sync::Arc;

use axum::{debug_handler, extract::{Path, State}, http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    config::Config,
    lobby::{parse_custom_id, Action, Lobbies, LobbyPost, NewLobby, Outcome},
    AppResult, AppState,
};

#[derive(Debug, Deserialize)]
pub(crate) struct CreateLobbyBody {
    creator_id: String,
    creator_name: String,
    category: String,
    #[serde(default)]
    note: String,
    /// minutes; falls back to the configured lobby lifetime
    ttl_mins: Option<i64>,
    origin_community: Option<String>,
    origin_channel: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserBody {
    user_id: String,
    #[serde(default)]
    user_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InteractionBody {
    custom_id: String,
    user_id: String,
    user_name: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct OutcomeBody {
    outcome: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    seats: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<i64>,
}

impl From<Outcome> for OutcomeBody {
    fn from(outcome: Outcome) -> Self {
        let seats = outcome.seats();
        OutcomeBody {
            outcome: outcome.code(),
            message: outcome.message(),
            seats: seats.map(|(seats, _)| seats),
            limit: seats.map(|(_, limit)| limit),
        }
    }
}

#[debug_handler(state = AppState)]
pub(crate) async fn create_lobby(
    State(lobbies): State<Lobbies>,
    State(config): State<Arc<Config>>,
    Json(body): Json<CreateLobbyBody>,
) -> AppResult<Json<Value>> {
    let ttl = body.ttl_mins
        .filter(|mins| *mins > 0)
        .map(time::Duration::minutes)
        .unwrap_or(config.lobby_ttl);

    let id = lobbies.create(NewLobby {
        creator_id: body.creator_id,
        creator_name: body.creator_name,
        category: body.category,
        note: body.note,
        expires_at: OffsetDateTime::now_utc() + ttl,
        origin_community: body.origin_community,
        origin_channel: body.origin_channel,
    }).await?;

    Ok(Json(json!({ "id": id })))
}

#[debug_handler(state = AppState)]
pub(crate) async fn list_lobbies(State(lobbies): State<Lobbies>) -> AppResult<Json<Vec<LobbyPost>>> {
    Ok(Json(lobbies.list_open().await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn join_lobby(
    State(lobbies): State<Lobbies>,
    Path(post_id): Path<Uuid>,
    Json(UserBody { user_id, user_name }): Json<UserBody>,
) -> AppResult<Json<OutcomeBody>> {
    let user_name = user_name.unwrap_or_else(|| user_id.clone());
    Ok(Json(lobbies.join(post_id, &user_id, &user_name).await?.into()))
}

#[debug_handler(state = AppState)]
pub(crate) async fn leave_lobby(
    State(lobbies): State<Lobbies>,
    Path(post_id): Path<Uuid>,
    Json(UserBody { user_id, .. }): Json<UserBody>,
) -> AppResult<Json<OutcomeBody>> {
    Ok(Json(lobbies.leave(post_id, &user_id).await?.into()))
}

#[debug_handler(state = AppState)]
pub(crate) async fn cancel_lobby(
    State(lobbies): State<Lobbies>,
    Path(post_id): Path<Uuid>,
    Json(UserBody { user_id, .. }): Json<UserBody>,
) -> AppResult<Json<OutcomeBody>> {
    Ok(Json(lobbies.cancel(post_id, &user_id).await?.into()))
}

/// Button presses on a lobby card.
#[debug_handler(state = AppState)]
pub(crate) async fn interaction(
    State(lobbies): State<Lobbies>,
    Json(InteractionBody { custom_id, user_id, user_name }): Json<InteractionBody>,
) -> AppResult<Response> {
    let Some((action, post_id)) = parse_custom_id(&custom_id) else {
        return Ok((StatusCode::BAD_REQUEST, format!("unknown component {custom_id}")).into_response());
    };

    let outcome = match action {
        Action::Join => lobbies.join(post_id, &user_id, &user_name).await?,
        Action::Leave => lobbies.leave(post_id, &user_id).await?,
        Action::Cancel => lobbies.cancel(post_id, &user_id).await?,
    };
    Ok(Json(OutcomeBody::from(outcome)).into_response())
}
