//! Seat admission, leaving, and what happens when the last seat goes.

use futures_util::future::join_all;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AppResult;

use super::{
    card,
    post::{LobbyPost, LobbyState, Outcome, Participant},
    room::{RoomPlayer, RoomRequest},
    store, Lobbies,
};

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error().is_some_and(|e| e.is_unique_violation())
}

/// Recount after a committed insert. If the post still ended up over its
/// limit, the seat just taken is given back and `None` is returned.
async fn settle_seat(db_pool: &SqlitePool, post_id: Uuid, user_id: &str, seat_limit: i64) -> AppResult<Option<i64>> {
    let seats = store::count_seats(db_pool, post_id).await?;
    if seats > seat_limit {
        tracing::warn!(post = %post_id, user = user_id, seats, limit = seat_limit, "over-admitted, rolling back");
        store::remove_participant(db_pool, post_id, user_id).await?;
        store::sync_seats(db_pool, post_id).await?;
        return Ok(None);
    }
    Ok(Some(store::sync_seats(db_pool, post_id).await?))
}

impl Lobbies {
    /// Takes a seat for `user_id`.
    ///
    /// Check, insert, re-count: the insert itself only succeeds while the
    /// post is open with a free seat, and the re-count undoes the insert if
    /// the post still ended up over its limit. Either way no more than
    /// `seat_limit` joins ever commit.
    pub async fn join(&self, post_id: Uuid, user_id: &str, user_name: &str) -> AppResult<Outcome> {
        let db_pool = &self.inner.db_pool;

        let Some(post) = store::post(db_pool, post_id).await? else {
            return Ok(Outcome::NotFound);
        };
        if post.state.is_terminal() {
            return Ok(Outcome::Closed);
        }

        if store::count_seats(db_pool, post_id).await? >= post.seat_limit {
            return Ok(Outcome::LobbyFull);
        }

        match store::insert_participant(db_pool, post_id, user_id, user_name, OffsetDateTime::now_utc()).await {
            Ok(true) => {}
            Ok(false) => {
                // lost a race between the check above and the insert
                let closed = store::post(db_pool, post_id).await?
                    .is_none_or(|p| p.state.is_terminal());
                return Ok(if closed { Outcome::Closed } else { Outcome::LobbyFull });
            }
            Err(err) if is_unique_violation(&err) => return Ok(Outcome::AlreadyJoined),
            Err(err) => return Err(err.into()),
        }

        let Some(mut seats) = settle_seat(db_pool, post_id, user_id, post.seat_limit).await? else {
            return Ok(Outcome::LobbyFull);
        };
        tracing::info!(post = %post_id, user = user_id, seats, limit = post.seat_limit, "joined lobby");

        if seats >= post.seat_limit {
            if store::mark_full(db_pool, post_id).await? {
                // the seat is committed whatever the side effects do
                self.schedule_teardown(post_id);
                if let Err(err) = self.fill(post_id).await {
                    tracing::warn!(post = %post_id, error = %err, "fill side effects failed");
                }
                let seats = store::sync_seats(db_pool, post_id).await?;
                return Ok(Outcome::Filled { seats, limit: post.seat_limit });
            }
            // someone left in between
            seats = store::sync_seats(db_pool, post_id).await?;
        }

        self.refresh_cards(post_id).await?;
        Ok(Outcome::Joined { seats, limit: post.seat_limit })
    }

    /// Gives up a seat. The creator has to cancel instead, and a group that
    /// already filled is past leaving.
    pub async fn leave(&self, post_id: Uuid, user_id: &str) -> AppResult<Outcome> {
        let db_pool = &self.inner.db_pool;

        let Some(post) = store::post(db_pool, post_id).await? else {
            return Ok(Outcome::NotFound);
        };
        if post.state != LobbyState::Open {
            return Ok(Outcome::Closed);
        }
        if post.creator_id == user_id {
            return Ok(Outcome::CreatorCannotLeave);
        }

        if !store::release_seat(db_pool, post_id, user_id).await? {
            // either never seated, or the post filled or closed meanwhile
            let open = store::post(db_pool, post_id).await?
                .is_some_and(|p| p.state == LobbyState::Open);
            return Ok(if open { Outcome::NotInGame } else { Outcome::Closed });
        }

        let seats = store::sync_seats(db_pool, post_id).await?;
        tracing::info!(post = %post_id, user = user_id, seats, limit = post.seat_limit, "left lobby");

        self.refresh_cards(post_id).await?;
        Ok(Outcome::Left { seats, limit: post.seat_limit })
    }

    /// Arms the delayed teardown of a filled post.
    fn schedule_teardown(&self, post_id: Uuid) {
        let lobbies = self.clone();
        self.inner.timers.arm(post_id, self.inner.settings.fill_grace, async move {
            lobbies.inner.timers.disarm(post_id);
            if let Err(err) = lobbies.close(post_id, LobbyState::Cancelled).await {
                tracing::warn!(post = %post_id, error = %err, "delayed teardown failed");
            }
        });
    }

    /// Room request, direct notices, then the final card.
    async fn fill(&self, post_id: Uuid) -> AppResult<()> {
        let Some(post) = store::post(&self.inner.db_pool, post_id).await? else {
            return Ok(());
        };
        let roster = store::participants(&self.inner.db_pool, post_id).await?;

        let room_url = self.request_room(&post, &roster).await?;
        let notice = card::fill_notice(&post, &roster, room_url.as_deref());
        let sends = roster.iter().map(|p| {
            let notice = &notice;
            async move { (p, self.inner.platform.send_direct(&p.user_id, notice).await) }
        });
        for (participant, result) in join_all(sends).await {
            if let Err(err) = result {
                tracing::warn!(post = %post_id, user = %participant.user_id, error = %err, "could not notify player");
            }
        }

        self.refresh_cards(post_id).await?;

        tracing::info!(post = %post_id, room = room_url.is_some(), "lobby filled");
        Ok(())
    }

    async fn request_room(&self, post: &LobbyPost, roster: &[Participant]) -> AppResult<Option<String>> {
        let Some(rooms) = &self.inner.rooms else {
            return Ok(None);
        };
        let Some(game_id) = self.inner.settings.room_games.get(&post.category.to_lowercase()) else {
            tracing::debug!(post = %post.id, category = %post.category, "no room game for category");
            return Ok(None);
        };

        let (community_id, channel_id) = match (&post.origin_community, &post.origin_channel) {
            (Some(community), Some(channel)) => (community.clone(), channel.clone()),
            _ => self.inner.ledger.list_for(post.id).await?
                .into_iter()
                .next()
                .map(|copy| (copy.community_id, copy.channel_id))
                .unwrap_or_default(),
        };

        let request = RoomRequest {
            game_id: game_id.clone(),
            community_id,
            channel_id,
            players: roster.iter()
                .map(|p| RoomPlayer { id: p.user_id.clone(), name: p.user_name.clone() })
                .collect(),
        };
        Ok(rooms.create_room(&self.inner.settings.room_token, &request).await)
    }
}
