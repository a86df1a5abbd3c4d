//! The chat platform as seen by the bridge.
//!
//! Everything the bridge needs from the platform goes through [`Platform`]
//! (bot-level calls) and [`Webhook`] (calls made through one delivery
//! endpoint). [`RestPlatform`] talks to a Discord-style REST API; tests plug
//! in their own doubles.

mod rest;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

pub use rest::RestPlatform;

use crate::AppError;

/// Remote message id returned by a successful delivery.
pub type RemoteHandle = String;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("remote object not found")]
    NotFound,
    #[error("missing permission")]
    Forbidden,
    #[error("platform returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("unexpected platform response: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for PlatformError {
    fn from(err: serde_json::Error) -> Self {
        PlatformError::Decode(err.to_string())
    }
}

impl From<AppError> for PlatformError {
    fn from(err: AppError) -> Self {
        PlatformError::Decode(err.to_string())
    }
}

/// A delivery endpoint: a webhook id plus the secret token that lets us
/// post into its channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: String,
    pub token: String,
}

/// A webhook as listed on a channel.
#[derive(Debug, Clone)]
pub struct WebhookInfo {
    pub id: String,
    pub token: Option<String>,
    pub channel_id: String,
    pub owner_id: Option<String>,
}

impl WebhookInfo {
    /// Only webhooks that expose their token can be driven by us.
    pub fn endpoint(&self) -> Option<Endpoint> {
        self.token.as_ref().map(|token| Endpoint {
            id: self.id.clone(),
            token: token.clone(),
        })
    }
}

/// Display identity a relayed message is rendered under.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    #[serde(default)]
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Role {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Channel {
    pub id: String,
    pub community_id: Option<String>,
    pub name: Option<String>,
}

/// Message body: text, embeds kept as raw JSON so they travel verbatim,
/// binary attachments and interactive components.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub embeds: Vec<Value>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub components: Vec<Value>,
}

impl Payload {
    pub fn text(content: impl Into<String>) -> Payload {
        Payload {
            content: content.into(),
            ..Payload::default()
        }
    }

    /// Copy fit for relaying: link-preview embeds (anything not "rich") are
    /// dropped, the platform regenerates those at the destination.
    pub fn for_relay(&self) -> Payload {
        let mut payload = self.clone();
        payload.embeds.retain(is_rich_embed);
        payload
    }
}

fn is_rich_embed(embed: &Value) -> bool {
    match embed.get("type").and_then(Value::as_str) {
        None | Some("rich") => true,
        Some(_) => false,
    }
}

/// Mentions the platform is allowed to expand. The default expands nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AllowedMentions {
    pub parse: Vec<String>,
    pub roles: Vec<String>,
    pub users: Vec<String>,
}

/// What actually goes out through a webhook.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookMessage {
    pub payload: Payload,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
    pub allowed_mentions: AllowedMentions,
}

impl WebhookMessage {
    pub fn new(payload: Payload) -> WebhookMessage {
        WebhookMessage {
            payload,
            username: None,
            avatar_url: None,
            allowed_mentions: AllowedMentions::default(),
        }
    }

    pub fn authored_by(mut self, username: &str, avatar_url: Option<&str>) -> WebhookMessage {
        self.username = Some(username.to_owned());
        self.avatar_url = avatar_url.map(str::to_owned);
        self
    }

    /// Prefixes a role mention and allows exactly that role to ping.
    pub fn notifying(mut self, role_id: Option<&str>) -> WebhookMessage {
        if let Some(role_id) = role_id {
            self.payload.content = if self.payload.content.is_empty() {
                format!("<@&{role_id}>")
            } else {
                format!("<@&{role_id}> {}", self.payload.content)
            };
            self.allowed_mentions.roles = vec![role_id.to_owned()];
        }
        self
    }

    /// JSON body in the platform's webhook format.
    pub fn body(&self) -> Value {
        let mut body = json!({
            "content": self.payload.content,
            "embeds": self.payload.embeds,
            "components": self.payload.components,
            "allowed_mentions": self.allowed_mentions,
        });
        if let Some(username) = &self.username {
            body["username"] = json!(username);
        }
        if let Some(avatar_url) = &self.avatar_url {
            body["avatar_url"] = json!(avatar_url);
        }
        if !self.payload.attachments.is_empty() {
            body["attachments"] = self.payload.attachments
                .iter()
                .enumerate()
                .map(|(i, a)| json!({ "id": i, "filename": a.filename }))
                .collect();
        }
        body
    }
}

/// Calls made through a single delivery endpoint.
#[async_trait]
pub trait Webhook: Send + Sync {
    async fn execute(&self, message: &WebhookMessage) -> Result<RemoteHandle, PlatformError>;
    async fn edit(&self, handle: &str, message: &WebhookMessage) -> Result<(), PlatformError>;
    async fn delete(&self, handle: &str) -> Result<(), PlatformError>;
}

#[async_trait]
pub trait Platform: Send + Sync {
    /// Client wrapper for one endpoint. Cheap; callers cache the result.
    fn webhook(&self, endpoint: &Endpoint) -> Arc<dyn Webhook>;

    async fn channel_webhooks(&self, channel_id: &str) -> Result<Vec<WebhookInfo>, PlatformError>;
    async fn create_webhook(&self, channel_id: &str, name: &str) -> Result<WebhookInfo, PlatformError>;
    async fn user_identity(&self, user_id: &str) -> Result<Identity, PlatformError>;
    async fn send_direct(&self, user_id: &str, payload: &Payload) -> Result<(), PlatformError>;
    async fn role(&self, community_id: &str, role_id: &str) -> Result<Role, PlatformError>;
    async fn channel(&self, channel_id: &str) -> Result<Channel, PlatformError>;
}
