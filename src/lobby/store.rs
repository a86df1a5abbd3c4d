//! SQL for lobby posts and their participants.

use anyhow::anyhow;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AppResult;

use super::post::{LobbyPost, LobbyState, Participant};

type PostRow = (String, String, String, String, String, i64, i64, i64, i64, String, Option<String>, Option<String>);

fn timestamp(secs: i64) -> AppResult<OffsetDateTime> {
    Ok(OffsetDateTime::from_unix_timestamp(secs).map_err(|e| anyhow!("bad timestamp {secs}: {e}"))?)
}

fn post_from_row(
    (id, creator_id, creator_name, category, note, seat_limit, seats, created_at, expires_at, state, origin_community, origin_channel): PostRow,
) -> AppResult<LobbyPost> {
    Ok(LobbyPost {
        id: Uuid::parse_str(&id)?,
        creator_id,
        creator_name,
        category,
        note,
        seat_limit,
        seats,
        created_at: timestamp(created_at)?,
        expires_at: timestamp(expires_at)?,
        state: state.parse()?,
        origin_community,
        origin_channel,
    })
}

const POST_COLUMNS: &str =
    "id,creator_id,creator_name,category,note,seat_limit,seats,created_at,expires_at,state,origin_community,origin_channel";

pub(crate) async fn insert_post(db_pool: &SqlitePool, post: &LobbyPost) -> AppResult<()> {
    sqlx::query(&format!("INSERT INTO lobby_posts ({POST_COLUMNS}) VALUES (?,?,?,?,?,?,?,?,?,?,?,?)"))
        .bind(post.id.to_string())
        .bind(&post.creator_id)
        .bind(&post.creator_name)
        .bind(&post.category)
        .bind(&post.note)
        .bind(post.seat_limit)
        .bind(post.seats)
        .bind(post.created_at.unix_timestamp())
        .bind(post.expires_at.unix_timestamp())
        .bind(post.state.id())
        .bind(&post.origin_community)
        .bind(&post.origin_channel)
        .execute(db_pool)
        .await?;
    Ok(())
}

pub(crate) async fn post(db_pool: &SqlitePool, post_id: Uuid) -> AppResult<Option<LobbyPost>> {
    let row: Option<PostRow> = sqlx::query_as(&format!("SELECT {POST_COLUMNS} FROM lobby_posts WHERE id=?"))
        .bind(post_id.to_string())
        .fetch_optional(db_pool)
        .await?;
    row.map(post_from_row).transpose()
}

pub(crate) async fn open_posts(db_pool: &SqlitePool) -> AppResult<Vec<LobbyPost>> {
    let rows: Vec<PostRow> = sqlx::query_as(&format!(
        "SELECT {POST_COLUMNS} FROM lobby_posts WHERE state IN ('open','full') ORDER BY created_at"
    ))
        .fetch_all(db_pool)
        .await?;
    rows.into_iter().map(post_from_row).collect()
}

/// Non-terminal posts whose expiry is at or before `now`.
pub(crate) async fn expired_ids(db_pool: &SqlitePool, now: OffsetDateTime) -> AppResult<Vec<Uuid>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT id FROM lobby_posts WHERE state IN ('open','full') AND expires_at<=? ORDER BY expires_at",
    )
        .bind(now.unix_timestamp())
        .fetch_all(db_pool)
        .await?;
    rows.into_iter()
        .map(|(id,)| -> AppResult<Uuid> { Ok(Uuid::parse_str(&id)?) })
        .collect()
}

pub(crate) async fn participants(db_pool: &SqlitePool, post_id: Uuid) -> AppResult<Vec<Participant>> {
    let rows: Vec<(String, String, i64)> = sqlx::query_as(
        "SELECT user_id,user_name,joined_at FROM lobby_participants WHERE post_id=? ORDER BY joined_at,rowid",
    )
        .bind(post_id.to_string())
        .fetch_all(db_pool)
        .await?;
    rows.into_iter()
        .map(|(user_id, user_name, joined_at)| -> AppResult<Participant> {
            Ok(Participant {
                user_id,
                user_name,
                joined_at: timestamp(joined_at)?,
            })
        })
        .collect()
}

pub(crate) async fn count_seats(db_pool: &SqlitePool, post_id: Uuid) -> AppResult<i64> {
    let (seats,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM lobby_participants WHERE post_id=?")
        .bind(post_id.to_string())
        .fetch_one(db_pool)
        .await?;
    Ok(seats)
}

/// Seats the creator; no capacity check, the post was just created.
pub(crate) async fn seat_creator(db_pool: &SqlitePool, post: &LobbyPost) -> AppResult<()> {
    sqlx::query("INSERT INTO lobby_participants (post_id,user_id,user_name,joined_at) VALUES (?,?,?,?)")
        .bind(post.id.to_string())
        .bind(&post.creator_id)
        .bind(&post.creator_name)
        .bind(post.created_at.unix_timestamp())
        .execute(db_pool)
        .await?;
    Ok(())
}

/// Inserts the participant only while the post is open and has a free seat,
/// all in one statement. `Ok(false)` means the guard refused; an existing
/// (post, user) row surfaces as a unique violation.
pub(crate) async fn insert_participant(
    db_pool: &SqlitePool,
    post_id: Uuid,
    user_id: &str,
    user_name: &str,
    joined_at: OffsetDateTime,
) -> Result<bool, sqlx::Error> {
    let post_id = post_id.to_string();
    let inserted = sqlx::query(
        "INSERT INTO lobby_participants (post_id,user_id,user_name,joined_at)
         SELECT ?,?,?,? FROM lobby_posts p
         WHERE p.id=? AND p.state='open'
           AND (SELECT COUNT(*) FROM lobby_participants WHERE post_id=?) < p.seat_limit",
    )
        .bind(&post_id)
        .bind(user_id)
        .bind(user_name)
        .bind(joined_at.unix_timestamp())
        .bind(&post_id)
        .bind(&post_id)
        .execute(db_pool)
        .await?
        .rows_affected();
    Ok(inserted == 1)
}

/// Undoes a seat unconditionally. Only for rolling back an over-admission.
pub(crate) async fn remove_participant(db_pool: &SqlitePool, post_id: Uuid, user_id: &str) -> AppResult<bool> {
    let removed = sqlx::query("DELETE FROM lobby_participants WHERE post_id=? AND user_id=?")
        .bind(post_id.to_string())
        .bind(user_id)
        .execute(db_pool)
        .await?
        .rows_affected();
    Ok(removed == 1)
}

/// Gives up a seat, in one statement and only while the post is open.
/// `false` if the user had no seat or the post is no longer open.
pub(crate) async fn release_seat(db_pool: &SqlitePool, post_id: Uuid, user_id: &str) -> AppResult<bool> {
    let post_id = post_id.to_string();
    let removed = sqlx::query(
        "DELETE FROM lobby_participants WHERE post_id=? AND user_id=?
           AND EXISTS (SELECT 1 FROM lobby_posts WHERE id=? AND state='open')",
    )
        .bind(&post_id)
        .bind(user_id)
        .bind(&post_id)
        .execute(db_pool)
        .await?
        .rows_affected();
    Ok(removed == 1)
}

/// Writes the recounted seat total back to a live post and returns it.
pub(crate) async fn sync_seats(db_pool: &SqlitePool, post_id: Uuid) -> AppResult<i64> {
    let post_id = post_id.to_string();
    sqlx::query(
        "UPDATE lobby_posts SET seats=(SELECT COUNT(*) FROM lobby_participants WHERE post_id=?)
         WHERE id=? AND state IN ('open','full')",
    )
        .bind(&post_id)
        .bind(&post_id)
        .execute(db_pool)
        .await?;

    let (seats,): (i64,) = sqlx::query_as("SELECT seats FROM lobby_posts WHERE id=?")
        .bind(&post_id)
        .fetch_one(db_pool)
        .await?;
    Ok(seats)
}

/// Open -> Full, judged on the live participant count rather than the
/// stored `seats`. Only one caller ever sees `true` for a given post, and
/// from then on neither joins nor leaves can change the roster.
pub(crate) async fn mark_full(db_pool: &SqlitePool, post_id: Uuid) -> AppResult<bool> {
    let post_id = post_id.to_string();
    let updated = sqlx::query(
        "UPDATE lobby_posts SET state='full' WHERE id=? AND state='open'
           AND (SELECT COUNT(*) FROM lobby_participants WHERE post_id=?)>=seat_limit",
    )
        .bind(&post_id)
        .bind(&post_id)
        .execute(db_pool)
        .await?
        .rows_affected();
    Ok(updated == 1)
}

/// Moves a live post into a terminal state. `false` if it already was terminal.
pub(crate) async fn finish(db_pool: &SqlitePool, post_id: Uuid, end: LobbyState) -> AppResult<bool> {
    if !end.is_terminal() {
        return Err(anyhow!("{end} is not a terminal state"))?;
    }
    let updated = sqlx::query("UPDATE lobby_posts SET state=? WHERE id=? AND state IN ('open','full')")
        .bind(end.id())
        .bind(post_id.to_string())
        .execute(db_pool)
        .await?
        .rows_affected();
    Ok(updated == 1)
}
