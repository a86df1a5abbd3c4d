//! Lobby coordinator: matchmaking posts with a fixed number of seats,
//! mirrored as a card in every community bound for `lfg`.
//!
//! A post is `Open` until the last seat is taken, then `Full` until the
//! delayed teardown (or a cancel, or expiry) moves it into `Cancelled` or
//! `Expired`. Those two are final: nothing but reads touches such a post.

mod card;
mod join;
mod post;
mod room;
mod store;
mod sweep;
mod timers;

use std::{collections::{HashMap, HashSet}, sync::Arc, time::Duration};

use futures_util::future::join_all;
use parking_lot::Mutex;
use time::OffsetDateTime;
use uuid::Uuid;

pub use card::{actions_for, fill_notice, parse_custom_id, render, Action};
pub use post::{LobbyPost, LobbyState, Outcome, Participant, SEAT_LIMIT};
pub use room::{HttpRoomProvider, RoomPlayer, RoomProvider, RoomRequest, RoomResponse};
pub use sweep::spawn_sweeper;

use timers::TeardownTimers;

use crate::{
    fanout::{delivered, Fanout},
    ledger::{Ledger, RelayedCopy},
    platform::{Endpoint, Platform},
    registry::{Purpose, Registry},
    AppResult,
};

#[derive(Debug, Clone, Default)]
pub struct LobbySettings {
    /// How long a filled card stays up before it is torn down.
    pub fill_grace: Duration,
    pub sender_label: String,
    /// May cancel any post.
    pub admins: HashSet<String>,
    pub room_token: String,
    /// lowercase category -> external game id
    pub room_games: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct NewLobby {
    pub creator_id: String,
    pub creator_name: String,
    pub category: String,
    pub note: String,
    pub expires_at: OffsetDateTime,
    pub origin_community: Option<String>,
    pub origin_channel: Option<String>,
}

#[derive(Clone)]
pub struct Lobbies {
    inner: Arc<Inner>,
}

struct Inner {
    db_pool: sqlx::SqlitePool,
    registry: Registry,
    ledger: Ledger,
    fanout: Arc<Fanout>,
    platform: Arc<dyn Platform>,
    rooms: Option<Arc<dyn RoomProvider>>,
    settings: LobbySettings,
    timers: TeardownTimers,
    /// One card refresh at a time per post.
    refreshing: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl Lobbies {
    pub fn new(
        db_pool: sqlx::SqlitePool,
        registry: Registry,
        ledger: Ledger,
        fanout: Arc<Fanout>,
        platform: Arc<dyn Platform>,
        rooms: Option<Arc<dyn RoomProvider>>,
        settings: LobbySettings,
    ) -> Lobbies {
        Lobbies {
            inner: Arc::new(Inner {
                db_pool,
                registry,
                ledger,
                fanout,
                platform,
                rooms,
                settings,
                timers: TeardownTimers::default(),
                refreshing: Mutex::default(),
            }),
        }
    }

    pub async fn post(&self, post_id: Uuid) -> AppResult<Option<LobbyPost>> {
        store::post(&self.inner.db_pool, post_id).await
    }

    pub async fn roster(&self, post_id: Uuid) -> AppResult<Vec<Participant>> {
        store::participants(&self.inner.db_pool, post_id).await
    }

    pub async fn list_open(&self) -> AppResult<Vec<LobbyPost>> {
        store::open_posts(&self.inner.db_pool).await
    }

    pub async fn copies(&self, post_id: Uuid) -> AppResult<Vec<RelayedCopy>> {
        self.inner.ledger.list_for(post_id).await
    }

    pub fn teardown_pending(&self, post_id: Uuid) -> bool {
        self.inner.timers.is_armed(post_id)
    }

    /// Creates a post with its creator in seat 1 and fans its card out to
    /// every `lfg` destination.
    pub async fn create(&self, new: NewLobby) -> AppResult<Uuid> {
        let now = OffsetDateTime::now_utc();
        let post = LobbyPost {
            id: Uuid::now_v7(),
            creator_id: new.creator_id,
            creator_name: new.creator_name,
            category: new.category,
            note: new.note,
            seat_limit: SEAT_LIMIT,
            seats: 1,
            created_at: now,
            expires_at: new.expires_at,
            state: LobbyState::Open,
            origin_community: new.origin_community,
            origin_channel: new.origin_channel,
        };
        store::insert_post(&self.inner.db_pool, &post).await?;
        store::seat_creator(&self.inner.db_pool, &post).await?;

        let roster = store::participants(&self.inner.db_pool, post.id).await?;
        let targets = self.inner.registry.resolve_targets(Purpose::Lfg, &[]).await?;
        let deliveries = self.inner.fanout
            .broadcast_as_system(&card::render(&post, &roster), &targets, &self.inner.settings.sender_label)
            .await;

        for (target, handle) in delivered(&deliveries) {
            self.inner.ledger.record(post.id, &target.community_id, &target.channel_id, handle).await?;
        }

        tracing::info!(
            post = %post.id,
            creator = %post.creator_id,
            category = %post.category,
            copies = delivered(&deliveries).count(),
            targets = targets.len(),
            "lobby created"
        );
        Ok(post.id)
    }

    /// Creator (or an admin) ends the post and takes down every copy.
    pub async fn cancel(&self, post_id: Uuid, requester_id: &str) -> AppResult<Outcome> {
        let Some(post) = store::post(&self.inner.db_pool, post_id).await? else {
            return Ok(Outcome::NotFound);
        };
        if post.state.is_terminal() {
            return Ok(Outcome::Closed);
        }
        if post.creator_id != requester_id && !self.inner.settings.admins.contains(requester_id) {
            return Ok(Outcome::NotCreator);
        }

        if self.teardown(post_id, LobbyState::Cancelled).await? {
            Ok(Outcome::Cancelled)
        } else {
            Ok(Outcome::Closed)
        }
    }

    /// Moves the post into `end` and deletes its remote copies. Returns
    /// `false` without touching anything if the post was already finished.
    pub async fn teardown(&self, post_id: Uuid, end: LobbyState) -> AppResult<bool> {
        self.inner.timers.cancel(post_id);
        self.close(post_id, end).await
    }

    async fn close(&self, post_id: Uuid, end: LobbyState) -> AppResult<bool> {
        if !store::finish(&self.inner.db_pool, post_id, end).await? {
            tracing::debug!(post = %post_id, "lobby already closed");
            return Ok(false);
        }
        self.inner.refreshing.lock().remove(&post_id);

        let copies = self.located_copies(post_id).await?;
        let deletes = copies.iter().map(|(copy, endpoint)| async move {
            (copy, self.inner.fanout.delete_copy(endpoint, &copy.message_id).await)
        });

        let mut failed = 0;
        for (copy, result) in join_all(deletes).await {
            if let Err(err) = result {
                failed += 1;
                tracing::warn!(
                    post = %post_id,
                    community = %copy.community_id,
                    message = %copy.message_id,
                    error = %err,
                    "could not delete lobby copy"
                );
            }
        }

        tracing::info!(post = %post_id, state = %end, copies = copies.len(), failed, "lobby closed");
        Ok(true)
    }

    /// Ledger entries paired with the endpoint currently bound to their
    /// channel. Copies whose channel lost its endpoint are skipped.
    async fn located_copies(&self, post_id: Uuid) -> AppResult<Vec<(RelayedCopy, Endpoint)>> {
        let mut located = vec![];
        for copy in self.inner.ledger.list_for(post_id).await? {
            match self.inner.registry.endpoint_for_channel(&copy.community_id, &copy.channel_id).await? {
                Some(endpoint) => located.push((copy, endpoint)),
                None => tracing::warn!(
                    post = %post_id,
                    community = %copy.community_id,
                    channel = %copy.channel_id,
                    "no endpoint left for lobby copy"
                ),
            }
        }
        Ok(located)
    }

    /// Re-renders the card of a live post on every copy. Refreshes of one
    /// post run one after another and read the post inside their turn, so
    /// the last edit to land always shows the latest roster.
    async fn refresh_cards(&self, post_id: Uuid) -> AppResult<()> {
        let gate = self.inner.refreshing.lock().entry(post_id).or_default().clone();
        let _turn = gate.lock().await;

        let Some(post) = store::post(&self.inner.db_pool, post_id).await? else {
            return Ok(());
        };
        if post.state.is_terminal() {
            // a refresh that started after close would otherwise leave its gate behind
            self.inner.refreshing.lock().remove(&post_id);
            return Ok(());
        }

        let roster = store::participants(&self.inner.db_pool, post_id).await?;
        let card = card::render(&post, &roster);
        let copies = self.located_copies(post_id).await?;
        let edits = copies.iter().map(|(copy, endpoint)| {
            let card = &card;
            async move { (copy, self.inner.fanout.edit_copy(endpoint, &copy.message_id, card).await) }
        });

        for (copy, result) in join_all(edits).await {
            if let Err(err) = result {
                tracing::warn!(
                    post = %post_id,
                    community = %copy.community_id,
                    message = %copy.message_id,
                    error = %err,
                    "could not update lobby copy"
                );
            }
        }
        Ok(())
    }
}
