//! External matchmaking-room provider.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::{AppResult, GetField};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomPlayer {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomRequest {
    pub game_id: String,
    pub community_id: String,
    pub channel_id: String,
    pub players: Vec<RoomPlayer>,
}

/// Decoded provider reply. Only `url` is required.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomResponse {
    pub url: String,
    pub room_id: Option<String>,
}

impl RoomResponse {
    pub fn decode(body: &Value) -> AppResult<RoomResponse> {
        Ok(RoomResponse {
            url: body.get_str_field("url")?,
            room_id: body.get_opt_str_field("id"),
        })
    }
}

#[async_trait]
pub trait RoomProvider: Send + Sync {
    /// Never fails loudly: any problem is logged and comes back as `None`.
    async fn create_room(&self, token: &str, request: &RoomRequest) -> Option<String>;
}

pub struct HttpRoomProvider {
    http: reqwest::Client,
    url: String,
}

impl HttpRoomProvider {
    pub fn new(url: &str) -> HttpRoomProvider {
        HttpRoomProvider {
            http: reqwest::Client::new(),
            url: url.to_owned(),
        }
    }
}

#[async_trait]
impl RoomProvider for HttpRoomProvider {
    async fn create_room(&self, token: &str, request: &RoomRequest) -> Option<String> {
        let response = match self.http.post(&self.url).bearer_auth(token).json(request).send().await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(game = %request.game_id, error = %err, "room provider unreachable");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(game = %request.game_id, %status, "room provider refused");
            return None;
        }

        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!(game = %request.game_id, error = %err, "room provider sent garbage");
                return None;
            }
        };

        match RoomResponse::decode(&body) {
            Ok(room) => {
                tracing::info!(game = %request.game_id, room = ?room.room_id, "room created");
                Some(room.url)
            }
            Err(err) => {
                tracing::warn!(game = %request.game_id, error = %err, "room provider reply missing url");
                None
            }
        }
    }
}
