use std::{sync::Arc, time::Duration};

use lfgbridge::{
    bridge::Bridge,
    config::Config,
    db,
    fanout::{heal_endpoints, Fanout},
    ledger::Ledger,
    lobby::{spawn_sweeper, HttpRoomProvider, Lobbies, RoomProvider},
    platform::{Identity, Platform, RestPlatform},
    registry::Registry,
    routes, AppResult, AppState,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> AppResult<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Arc::new(Config::from_env()?);
    let db_pool = db::connect(&config.database_url).await?;

    let platform: Arc<dyn Platform> = Arc::new(RestPlatform::new(&config.platform_api, &config.bot_token));
    let registry = Registry::new(db_pool.clone());
    let fanout = Arc::new(Fanout::new(
        platform.clone(),
        Identity {
            name: config.system_name.clone(),
            avatar_url: config.system_avatar.clone(),
        },
    ));
    let rooms = config.room_provider
        .as_ref()
        .map(|room| Arc::new(HttpRoomProvider::new(&room.url)) as Arc<dyn RoomProvider>);

    let lobbies = Lobbies::new(
        db_pool.clone(),
        registry.clone(),
        Ledger::new(db_pool),
        fanout.clone(),
        platform.clone(),
        rooms,
        config.lobby_settings(),
    );
    let bridge = Bridge::new(registry.clone(), fanout.clone(), &config.system_name);

    spawn_sweeper(lobbies.clone(), config.sweep_every);
    spawn_healer(registry.clone(), fanout.clone(), platform.clone(), config.clone(), config.heal_every);

    let app_state = AppState {
        config: config.clone(),
        platform,
        registry,
        fanout,
        bridge,
        lobbies,
    };

    let app = routes::router().with_state(app_state);
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Endpoint health check, first pass right away, then every `every`.
fn spawn_healer(
    registry: Registry,
    fanout: Arc<Fanout>,
    platform: Arc<dyn Platform>,
    config: Arc<Config>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match heal_endpoints(&registry, &fanout, &*platform, &config.application_id, &config.webhook_name).await {
                Ok(report) => tracing::info!(
                    checked = report.checked,
                    repaired = report.repaired,
                    failed = report.failed,
                    "endpoint health check"
                ),
                Err(err) => tracing::warn!(error = %err, "endpoint health check failed"),
            }
            tokio::time::sleep(every).await;
        }
    })
}
