#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::SqlitePool;
use tempfile::TempDir;

use lfgbridge::{
    db,
    fanout::Fanout,
    ledger::Ledger,
    lobby::{Lobbies, LobbySettings, RoomProvider, RoomRequest},
    platform::{
        Channel, Endpoint, Identity, Payload, Platform, PlatformError, RemoteHandle, Role, Webhook, WebhookInfo,
        WebhookMessage,
    },
    registry::{Purpose, Registry},
};

pub const OWNER: &str = "app-1";

#[derive(Default)]
pub struct MockWebhook {
    pub id: String,
    pub fail_sends: AtomicBool,
    pub fail_edits: AtomicBool,
    pub fail_deletes: AtomicBool,
    pub gone: AtomicBool,
    pub delay: Mutex<Option<Duration>>,
    /// Per-call delays for edits, used before falling back to `delay`.
    pub edit_delays: Mutex<VecDeque<Duration>>,
    pub sent: Mutex<Vec<WebhookMessage>>,
    pub edits: Mutex<Vec<(String, WebhookMessage)>>,
    pub deletes: Mutex<Vec<String>>,
    counter: AtomicUsize,
}

impl MockWebhook {
    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn edit_count(&self) -> usize {
        self.edits.lock().len()
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.lock().len()
    }

    async fn pause(&self) {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

fn refused() -> PlatformError {
    PlatformError::Status { status: 500, body: "refused".into() }
}

#[async_trait]
impl Webhook for MockWebhook {
    async fn execute(&self, message: &WebhookMessage) -> Result<RemoteHandle, PlatformError> {
        self.pause().await;
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(refused());
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().push(message.clone());
        Ok(format!("{}-m{n}", self.id))
    }

    async fn edit(&self, handle: &str, message: &WebhookMessage) -> Result<(), PlatformError> {
        let queued = self.edit_delays.lock().pop_front();
        match queued {
            Some(delay) => tokio::time::sleep(delay).await,
            None => self.pause().await,
        }
        if self.fail_edits.load(Ordering::SeqCst) {
            return Err(refused());
        }
        self.edits.lock().push((handle.to_owned(), message.clone()));
        Ok(())
    }

    async fn delete(&self, handle: &str) -> Result<(), PlatformError> {
        self.pause().await;
        self.deletes.lock().push(handle.to_owned());
        if self.gone.load(Ordering::SeqCst) {
            return Err(PlatformError::NotFound);
        }
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(refused());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MockPlatform {
    hooks: Mutex<HashMap<String, Arc<MockWebhook>>>,
    pub webhook_builds: AtomicUsize,
    pub channel_hooks: Mutex<HashMap<String, Vec<WebhookInfo>>>,
    pub locked_channels: Mutex<HashSet<String>>,
    pub created: AtomicUsize,
    pub dms: Mutex<Vec<(String, Payload)>>,
    pub failing_dms: Mutex<HashSet<String>>,
}

impl MockPlatform {
    pub fn new() -> Arc<MockPlatform> {
        Arc::new(MockPlatform::default())
    }

    /// The double behind endpoint `id`, created on first use.
    pub fn hook(&self, id: &str) -> Arc<MockWebhook> {
        self.hooks
            .lock()
            .entry(id.to_owned())
            .or_insert_with(|| Arc::new(MockWebhook { id: id.to_owned(), ..MockWebhook::default() }))
            .clone()
    }

    pub fn dms_to(&self, user_id: &str) -> Vec<Payload> {
        self.dms.lock().iter().filter(|(u, _)| u == user_id).map(|(_, p)| p.clone()).collect()
    }
}

#[async_trait]
impl Platform for MockPlatform {
    fn webhook(&self, endpoint: &Endpoint) -> Arc<dyn Webhook> {
        self.webhook_builds.fetch_add(1, Ordering::SeqCst);
        self.hook(&endpoint.id)
    }

    async fn channel_webhooks(&self, channel_id: &str) -> Result<Vec<WebhookInfo>, PlatformError> {
        if self.locked_channels.lock().contains(channel_id) {
            return Err(PlatformError::Forbidden);
        }
        Ok(self.channel_hooks.lock().get(channel_id).cloned().unwrap_or_default())
    }

    async fn create_webhook(&self, channel_id: &str, _name: &str) -> Result<WebhookInfo, PlatformError> {
        if self.locked_channels.lock().contains(channel_id) {
            return Err(PlatformError::Forbidden);
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        let info = WebhookInfo {
            id: format!("created-{channel_id}-{n}"),
            token: Some(format!("secret-{n}")),
            channel_id: channel_id.to_owned(),
            owner_id: Some(OWNER.to_owned()),
        };
        self.channel_hooks.lock().entry(channel_id.to_owned()).or_default().push(info.clone());
        Ok(info)
    }

    async fn user_identity(&self, user_id: &str) -> Result<Identity, PlatformError> {
        Ok(Identity {
            name: format!("user {user_id}"),
            avatar_url: None,
        })
    }

    async fn send_direct(&self, user_id: &str, payload: &Payload) -> Result<(), PlatformError> {
        if self.failing_dms.lock().contains(user_id) {
            return Err(PlatformError::Forbidden);
        }
        self.dms.lock().push((user_id.to_owned(), payload.clone()));
        Ok(())
    }

    async fn role(&self, _community_id: &str, role_id: &str) -> Result<Role, PlatformError> {
        Ok(Role { id: role_id.to_owned(), name: "players".into() })
    }

    async fn channel(&self, channel_id: &str) -> Result<Channel, PlatformError> {
        Ok(Channel { id: channel_id.to_owned(), community_id: None, name: None })
    }
}

#[derive(Default)]
pub struct MockRooms {
    pub url: Option<String>,
    pub requests: Mutex<Vec<RoomRequest>>,
}

#[async_trait]
impl RoomProvider for MockRooms {
    async fn create_room(&self, _token: &str, request: &RoomRequest) -> Option<String> {
        self.requests.lock().push(request.clone());
        self.url.clone()
    }
}

pub fn endpoint(id: &str) -> Endpoint {
    Endpoint { id: id.to_owned(), token: format!("{id}-token") }
}

/// Binds communities g1..=gN for `purpose` with channel cN and endpoint wN.
pub async fn bind_communities(registry: &Registry, purpose: Purpose, n: usize) {
    for i in 1..=n {
        registry.bind(&format!("g{i}"), purpose, &format!("c{i}"), None).await.unwrap();
        registry.set_endpoint(&format!("g{i}"), purpose, &endpoint(&format!("w{i}"))).await.unwrap();
    }
}

pub struct Harness {
    pub db_pool: SqlitePool,
    pub platform: Arc<MockPlatform>,
    pub rooms: Arc<MockRooms>,
    pub registry: Registry,
    pub fanout: Arc<Fanout>,
    pub lobbies: Lobbies,
}

pub fn settings(fill_grace: Duration) -> LobbySettings {
    LobbySettings {
        fill_grace,
        sender_label: "LFG Bridge".into(),
        admins: HashSet::from(["admin".to_owned()]),
        room_token: "room-token".into(),
        room_games: HashMap::from([("ranked".to_owned(), "game-7".to_owned())]),
    }
}

/// File-backed store behind a full-size pool, so statements from
/// concurrent tasks really interleave. Keep the dir alive for the test.
pub async fn file_pool() -> (TempDir, SqlitePool) {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("lfgbridge.db").display());
    let db_pool = db::connect(&url).await.unwrap();
    (dir, db_pool)
}

/// Lobby coordinator over an in-memory store with `communities` lfg
/// destinations bound.
pub async fn harness(communities: usize, room_url: Option<&str>, fill_grace: Duration) -> Harness {
    harness_on(db::connect_memory().await.unwrap(), communities, room_url, fill_grace).await
}

pub async fn harness_on(db_pool: SqlitePool, communities: usize, room_url: Option<&str>, fill_grace: Duration) -> Harness {
    let platform = MockPlatform::new();
    let rooms = Arc::new(MockRooms {
        url: room_url.map(str::to_owned),
        ..MockRooms::default()
    });
    let registry = Registry::new(db_pool.clone());
    bind_communities(&registry, Purpose::Lfg, communities).await;

    let fanout = Arc::new(Fanout::new(
        platform.clone(),
        Identity { name: "LFG Bridge".into(), avatar_url: None },
    ));
    let lobbies = Lobbies::new(
        db_pool.clone(),
        registry.clone(),
        Ledger::new(db_pool.clone()),
        fanout.clone(),
        platform.clone(),
        Some(rooms.clone()),
        settings(fill_grace),
    );

    Harness { db_pool, platform, rooms, registry, fanout, lobbies }
}
