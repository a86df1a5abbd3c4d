use std::time::Duration;

use time::OffsetDateTime;
use tokio::task::JoinHandle;

use crate::AppResult;

use super::{store, Lobbies, LobbyState};

impl Lobbies {
    /// Expires every live post whose expiry is at or before `now`.
    /// Returns how many posts this sweep closed.
    pub async fn sweep_expired(&self, now: OffsetDateTime) -> AppResult<usize> {
        let mut closed = 0;
        for post_id in store::expired_ids(&self.inner.db_pool, now).await? {
            match self.teardown(post_id, LobbyState::Expired).await {
                Ok(true) => closed += 1,
                Ok(false) => {}
                Err(err) => tracing::warn!(post = %post_id, error = %err, "could not expire lobby"),
            }
        }
        Ok(closed)
    }
}

/// Sweeps every `every`. The next wait only starts once a sweep is done, so
/// a slow sweep delays the next one instead of overlapping it.
pub fn spawn_sweeper(lobbies: Lobbies, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(every).await;
            match lobbies.sweep_expired(OffsetDateTime::now_utc()).await {
                Ok(0) => {}
                Ok(closed) => tracing::info!(closed, "expired lobbies"),
                Err(err) => tracing::warn!(error = %err, "lobby sweep failed"),
            }
        }
    })
}
