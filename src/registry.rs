//! Destination registry: which channel, endpoint and notify role each
//! federated community has bound for each purpose.

use std::{fmt, str::FromStr};

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{platform::Endpoint, AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    Chat,
    Lfg,
    Announcements,
}

impl Purpose {
    pub fn id(&self) -> &'static str {
        use Purpose::*;
        match self {
            Chat => "chat",
            Lfg => "lfg",
            Announcements => "announcements",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Purpose {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Purpose> {
        use Purpose::*;
        match s {
            "chat" => Ok(Chat),
            "lfg" => Ok(Lfg),
            "announcements" => Ok(Announcements),
            other => Err(anyhow!("unknown purpose {other}"))?,
        }
    }
}

/// Stored binding of one community for one purpose.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub community_id: String,
    pub purpose: Purpose,
    pub channel_id: Option<String>,
    pub endpoint: Option<Endpoint>,
    pub notify_role: Option<String>,
}

/// Where one copy of a fan-out goes. Derived from a [`Binding`] on every call.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub community_id: String,
    pub channel_id: String,
    pub endpoint: Endpoint,
    pub notify_role: Option<String>,
}

type BindingRow = (String, String, Option<String>, Option<String>, Option<String>, Option<String>);

fn endpoint_of(id: Option<String>, token: Option<String>) -> Option<Endpoint> {
    Some(Endpoint { id: id?, token: token? })
}

impl TryFrom<BindingRow> for Binding {
    type Error = AppError;

    fn try_from((community_id, purpose, channel_id, webhook_id, webhook_token, notify_role): BindingRow) -> AppResult<Binding> {
        Ok(Binding {
            community_id,
            purpose: purpose.parse()?,
            channel_id,
            endpoint: endpoint_of(webhook_id, webhook_token),
            notify_role,
        })
    }
}

impl Binding {
    /// Usable only when both the channel and its endpoint are known.
    pub fn target(&self) -> Option<Target> {
        Some(Target {
            community_id: self.community_id.clone(),
            channel_id: self.channel_id.clone()?,
            endpoint: self.endpoint.clone()?,
            notify_role: self.notify_role.clone(),
        })
    }
}

#[derive(Clone)]
pub struct Registry {
    db_pool: SqlitePool,
}

impl Registry {
    pub fn new(db_pool: SqlitePool) -> Registry {
        Registry { db_pool }
    }

    /// Every usable target for `purpose`, in binding order, minus `exclude`.
    pub async fn resolve_targets(&self, purpose: Purpose, exclude: &[String]) -> AppResult<Vec<Target>> {
        Ok(
            self.bindings_for(purpose)
                .await?
                .iter()
                .filter(|b| !exclude.contains(&b.community_id))
                .filter_map(Binding::target)
                .collect()
        )
    }

    pub async fn bindings_for(&self, purpose: Purpose) -> AppResult<Vec<Binding>> {
        let rows: Vec<BindingRow> = sqlx::query_as(
            "SELECT community_id,purpose,channel_id,webhook_id,webhook_token,notify_role_id
             FROM community_bindings WHERE purpose=? ORDER BY rowid",
        )
            .bind(purpose.id())
            .fetch_all(&self.db_pool)
            .await?;
        rows.into_iter().map(Binding::try_from).collect()
    }

    pub async fn bindings(&self) -> AppResult<Vec<Binding>> {
        let rows: Vec<BindingRow> = sqlx::query_as(
            "SELECT community_id,purpose,channel_id,webhook_id,webhook_token,notify_role_id
             FROM community_bindings ORDER BY rowid",
        )
            .fetch_all(&self.db_pool)
            .await?;
        rows.into_iter().map(Binding::try_from).collect()
    }

    /// Binds (or rebinds) a community's channel for a purpose. Moving to a
    /// different channel forgets the old endpoint; keeping the channel keeps it.
    pub async fn bind(
        &self,
        community_id: &str,
        purpose: Purpose,
        channel_id: &str,
        notify_role: Option<&str>,
    ) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO community_bindings (community_id,purpose,channel_id,notify_role_id) VALUES (?,?,?,?)
             ON CONFLICT (community_id,purpose) DO UPDATE SET
                webhook_id = CASE WHEN channel_id IS excluded.channel_id THEN webhook_id ELSE NULL END,
                webhook_token = CASE WHEN channel_id IS excluded.channel_id THEN webhook_token ELSE NULL END,
                channel_id = excluded.channel_id,
                notify_role_id = excluded.notify_role_id",
        )
            .bind(community_id)
            .bind(purpose.id())
            .bind(channel_id)
            .bind(notify_role)
            .execute(&self.db_pool)
            .await?;

        tracing::info!(community = community_id, %purpose, channel = channel_id, "bound channel");
        Ok(())
    }

    /// Stores a (new) endpoint for an existing binding.
    pub async fn set_endpoint(&self, community_id: &str, purpose: Purpose, endpoint: &Endpoint) -> AppResult<bool> {
        let updated = sqlx::query(
            "UPDATE community_bindings SET webhook_id=?,webhook_token=? WHERE community_id=? AND purpose=?",
        )
            .bind(&endpoint.id)
            .bind(&endpoint.token)
            .bind(community_id)
            .bind(purpose.id())
            .execute(&self.db_pool)
            .await?
            .rows_affected();
        Ok(updated == 1)
    }

    /// The endpoint currently bound to `channel_id` in `community_id`, whatever
    /// the purpose.
    pub async fn endpoint_for_channel(&self, community_id: &str, channel_id: &str) -> AppResult<Option<Endpoint>> {
        let row: Option<(Option<String>, Option<String>)> = sqlx::query_as(
            "SELECT webhook_id,webhook_token FROM community_bindings
             WHERE community_id=? AND channel_id=? AND webhook_id IS NOT NULL AND webhook_token IS NOT NULL
             ORDER BY rowid LIMIT 1",
        )
            .bind(community_id)
            .bind(channel_id)
            .fetch_optional(&self.db_pool)
            .await?;
        Ok(row.and_then(|(id, token)| endpoint_of(id, token)))
    }
}
