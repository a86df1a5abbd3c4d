//! Where every fanned-out copy of a lobby post ended up.

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::AppResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayedCopy {
    pub community_id: String,
    pub channel_id: String,
    pub message_id: String,
}

#[derive(Clone)]
pub struct Ledger {
    db_pool: SqlitePool,
}

impl Ledger {
    pub fn new(db_pool: SqlitePool) -> Ledger {
        Ledger { db_pool }
    }

    /// Append-only; a second record for the same (post, community, channel)
    /// is ignored.
    pub async fn record(&self, post_id: Uuid, community_id: &str, channel_id: &str, message_id: &str) -> AppResult<()> {
        sqlx::query("INSERT OR IGNORE INTO relayed_copies (post_id,community_id,channel_id,message_id) VALUES (?,?,?,?)")
            .bind(post_id.to_string())
            .bind(community_id)
            .bind(channel_id)
            .bind(message_id)
            .execute(&self.db_pool)
            .await?;
        Ok(())
    }

    pub async fn list_for(&self, post_id: Uuid) -> AppResult<Vec<RelayedCopy>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT community_id,channel_id,message_id FROM relayed_copies WHERE post_id=? ORDER BY rowid",
        )
            .bind(post_id.to_string())
            .fetch_all(&self.db_pool)
            .await?;

        Ok(
            rows.into_iter()
                .map(|(community_id, channel_id, message_id)| RelayedCopy { community_id, channel_id, message_id })
                .collect()
        )
    }
}
