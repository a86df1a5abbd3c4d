use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{multipart::{Form, Part}, Response, StatusCode};
use serde_json::{json, Value};

use crate::GetField;

use super::{Attachment, Channel, Endpoint, Identity, Payload, Platform, PlatformError, RemoteHandle, Role, Webhook, WebhookInfo, WebhookMessage};

const AVATAR_CDN: &str = "https://cdn.discordapp.com/avatars";

#[derive(Clone)]
pub struct RestPlatform {
    http: reqwest::Client,
    api: String,
    bot_token: String,
}

impl RestPlatform {
    pub fn new(api: &str, bot_token: &str) -> RestPlatform {
        RestPlatform {
            http: reqwest::Client::new(),
            api: api.trim_end_matches('/').to_owned(),
            bot_token: bot_token.to_owned(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http.get(self.url(path))
            .header("Authorization", format!("Bot {}", self.bot_token))
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http.post(self.url(path))
            .header("Authorization", format!("Bot {}", self.bot_token))
    }
}

struct RestWebhook {
    http: reqwest::Client,
    url: String,
}

async fn check(response: Response) -> Result<Response, PlatformError> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::NOT_FOUND => Err(PlatformError::NotFound),
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => Err(PlatformError::Forbidden),
        status => Err(PlatformError::Status {
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        }),
    }
}

fn attachment_form(body: &Value, attachments: &[Attachment]) -> Result<Form, PlatformError> {
    let mut form = Form::new().text("payload_json", serde_json::to_string(body)?);
    for (i, attachment) in attachments.iter().enumerate() {
        let mut part = Part::bytes(attachment.data.clone()).file_name(attachment.filename.clone());
        if let Some(content_type) = &attachment.content_type {
            part = part.mime_str(content_type)?;
        }
        form = form.part(format!("files[{i}]"), part);
    }
    Ok(form)
}

fn webhook_info(value: &Value) -> Result<WebhookInfo, PlatformError> {
    let owner_id = value.get_opt_str_field("application_id")
        .or_else(|| value.get("user").and_then(|u| u.get_opt_str_field("id")));
    Ok(WebhookInfo {
        id: value.get_str_field("id")?,
        token: value.get_opt_str_field("token"),
        channel_id: value.get_str_field("channel_id")?,
        owner_id,
    })
}

#[async_trait]
impl Webhook for RestWebhook {
    async fn execute(&self, message: &WebhookMessage) -> Result<RemoteHandle, PlatformError> {
        let body = message.body();
        let request = self.http.post(format!("{}?wait=true", self.url));
        let request = if message.payload.attachments.is_empty() {
            request.json(&body)
        } else {
            request.multipart(attachment_form(&body, &message.payload.attachments)?)
        };

        let reply: Value = check(request.send().await?).await?.json().await?;
        Ok(reply.get_str_field("id")?)
    }

    async fn edit(&self, handle: &str, message: &WebhookMessage) -> Result<(), PlatformError> {
        let mut body = message.body();
        if let Some(body) = body.as_object_mut() {
            // identity and attachments are fixed once a message exists
            body.remove("username");
            body.remove("avatar_url");
            body.remove("attachments");
        }
        check(
            self.http.patch(format!("{}/messages/{handle}", self.url))
                .json(&body)
                .send()
                .await?
        ).await?;
        Ok(())
    }

    async fn delete(&self, handle: &str) -> Result<(), PlatformError> {
        check(
            self.http.delete(format!("{}/messages/{handle}", self.url))
                .send()
                .await?
        ).await?;
        Ok(())
    }
}

#[async_trait]
impl Platform for RestPlatform {
    fn webhook(&self, endpoint: &Endpoint) -> Arc<dyn Webhook> {
        Arc::new(RestWebhook {
            http: self.http.clone(),
            url: self.url(&format!("/webhooks/{}/{}", endpoint.id, endpoint.token)),
        })
    }

    async fn channel_webhooks(&self, channel_id: &str) -> Result<Vec<WebhookInfo>, PlatformError> {
        let hooks: Vec<Value> = check(self.get(&format!("/channels/{channel_id}/webhooks")).send().await?)
            .await?
            .json()
            .await?;
        hooks.iter().map(webhook_info).collect()
    }

    async fn create_webhook(&self, channel_id: &str, name: &str) -> Result<WebhookInfo, PlatformError> {
        let hook: Value = check(
            self.post(&format!("/channels/{channel_id}/webhooks"))
                .json(&json!({ "name": name }))
                .send()
                .await?
        ).await?.json().await?;
        webhook_info(&hook)
    }

    async fn user_identity(&self, user_id: &str) -> Result<Identity, PlatformError> {
        let user: Value = check(self.get(&format!("/users/{user_id}")).send().await?)
            .await?
            .json()
            .await?;
        let name = match user.get_opt_str_field("global_name") {
            Some(name) => name,
            None => user.get_str_field("username")?,
        };
        let avatar_url = user.get_opt_str_field("avatar")
            .map(|hash| format!("{AVATAR_CDN}/{user_id}/{hash}.png"));
        Ok(Identity { name, avatar_url })
    }

    async fn send_direct(&self, user_id: &str, payload: &Payload) -> Result<(), PlatformError> {
        let dm: Value = check(
            self.post("/users/@me/channels")
                .json(&json!({ "recipient_id": user_id }))
                .send()
                .await?
        ).await?.json().await?;
        let dm_id = dm.get_str_field("id")?;

        check(
            self.post(&format!("/channels/{dm_id}/messages"))
                .json(&json!({
                    "content": payload.content,
                    "embeds": payload.embeds,
                    "allowed_mentions": { "parse": [] },
                }))
                .send()
                .await?
        ).await?;
        Ok(())
    }

    async fn role(&self, community_id: &str, role_id: &str) -> Result<Role, PlatformError> {
        let roles: Vec<Value> = check(self.get(&format!("/guilds/{community_id}/roles")).send().await?)
            .await?
            .json()
            .await?;
        let role = roles.iter()
            .find(|r| r.get_opt_str_field("id").as_deref() == Some(role_id))
            .ok_or(PlatformError::NotFound)?;
        Ok(Role {
            id: role_id.to_owned(),
            name: role.get_str_field("name")?,
        })
    }

    async fn channel(&self, channel_id: &str) -> Result<Channel, PlatformError> {
        let channel: Value = check(self.get(&format!("/channels/{channel_id}")).send().await?)
            .await?
            .json()
            .await?;
        Ok(Channel {
            id: channel.get_str_field("id")?,
            community_id: channel.get_opt_str_field("guild_id"),
            name: channel.get_opt_str_field("name"),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn webhook_owner_comes_from_application_or_user() {
        let app_hook = json!({ "id": "1", "token": "t", "channel_id": "c", "application_id": "app" });
        let user_hook = json!({ "id": "2", "channel_id": "c", "user": { "id": "u" } });

        let app = webhook_info(&app_hook).unwrap();
        assert_eq!(app.owner_id.as_deref(), Some("app"));
        assert_eq!(app.endpoint(), Some(Endpoint { id: "1".into(), token: "t".into() }));

        let user = webhook_info(&user_hook).unwrap();
        assert_eq!(user.owner_id.as_deref(), Some("u"));
        assert_eq!(user.endpoint(), None);

        assert!(webhook_info(&json!({ "token": "t" })).is_err());
    }

    #[test]
    fn endpoint_urls_are_rooted_at_the_api() {
        let platform = RestPlatform::new("https://api.test/v10/", "secret");
        assert_eq!(platform.url("/channels/9/webhooks"), "https://api.test/v10/channels/9/webhooks");
    }
}
