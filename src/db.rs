use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::AppResult;

// community_bindings
//   unique: community_id, purpose
//   rowid order is binding insertion order
//
// lobby_posts
//   unique: id
//   seat_limit never changes after insert
//
// lobby_participants
//   unique: post_id, user_id
//
// relayed_copies
//   unique: post_id, community_id, channel_id
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS community_bindings (
        community_id TEXT NOT NULL,
        purpose TEXT NOT NULL,
        channel_id TEXT,
        webhook_id TEXT,
        webhook_token TEXT,
        notify_role_id TEXT,
        PRIMARY KEY (community_id, purpose)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS lobby_posts (
        id TEXT PRIMARY KEY,
        creator_id TEXT NOT NULL,
        creator_name TEXT NOT NULL,
        category TEXT NOT NULL,
        note TEXT NOT NULL,
        seat_limit INTEGER NOT NULL,
        seats INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        expires_at INTEGER NOT NULL,
        state TEXT NOT NULL,
        origin_community TEXT,
        origin_channel TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS lobby_participants (
        post_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        user_name TEXT NOT NULL,
        joined_at INTEGER NOT NULL,
        PRIMARY KEY (post_id, user_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS relayed_copies (
        post_id TEXT NOT NULL,
        community_id TEXT NOT NULL,
        channel_id TEXT NOT NULL,
        message_id TEXT NOT NULL,
        PRIMARY KEY (post_id, community_id, channel_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS lobby_posts_expiry ON lobby_posts (state, expires_at)",
];

pub async fn migrate(db_pool: &SqlitePool) -> AppResult<()> {
    for statement in SCHEMA {
        sqlx::query(*statement).execute(db_pool).await?;
    }
    Ok(())
}

pub async fn connect(database_url: &str) -> AppResult<SqlitePool> {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect(database_url)
        .await?;
    migrate(&db_pool).await?;
    Ok(db_pool)
}

/// Single-connection in-memory database with the schema applied.
///
/// One connection keeps every query on the same memory database.
pub async fn connect_memory() -> AppResult<SqlitePool> {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    migrate(&db_pool).await?;
    Ok(db_pool)
}
