use std::{fmt, str::FromStr};

use anyhow::anyhow;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{AppError, AppResult};

/// Seats per lobby, creator included.
pub const SEAT_LIMIT: i64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LobbyState {
    Open,
    Full,
    Cancelled,
    Expired,
}

impl LobbyState {
    pub fn id(&self) -> &'static str {
        use LobbyState::*;
        match self {
            Open => "open",
            Full => "full",
            Cancelled => "cancelled",
            Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LobbyState::Cancelled | LobbyState::Expired)
    }
}

impl fmt::Display for LobbyState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for LobbyState {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<LobbyState> {
        use LobbyState::*;
        match s {
            "open" => Ok(Open),
            "full" => Ok(Full),
            "cancelled" => Ok(Cancelled),
            "expired" => Ok(Expired),
            other => Err(anyhow!("unknown lobby state {other}"))?,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LobbyPost {
    pub id: Uuid,
    pub creator_id: String,
    pub creator_name: String,
    pub category: String,
    pub note: String,
    pub seat_limit: i64,
    pub seats: i64,
    #[serde(with = "time::serde::timestamp")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::timestamp")]
    pub expires_at: OffsetDateTime,
    pub state: LobbyState,
    pub origin_community: Option<String>,
    pub origin_channel: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Participant {
    pub user_id: String,
    pub user_name: String,
    #[serde(with = "time::serde::timestamp")]
    pub joined_at: OffsetDateTime,
}

/// What a lobby action did. Rejections are ordinary values, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Joined { seats: i64, limit: i64 },
    /// The join took the last seat.
    Filled { seats: i64, limit: i64 },
    Left { seats: i64, limit: i64 },
    Cancelled,
    AlreadyJoined,
    LobbyFull,
    NotInGame,
    CreatorCannotLeave,
    NotCreator,
    Closed,
    NotFound,
}

impl Outcome {
    pub fn code(&self) -> &'static str {
        use Outcome::*;
        match self {
            Joined { .. } => "joined",
            Filled { .. } => "filled",
            Left { .. } => "left",
            Cancelled => "cancelled",
            AlreadyJoined => "already_joined",
            LobbyFull => "lobby_full",
            NotInGame => "not_in_game",
            CreatorCannotLeave => "creator_cannot_leave",
            NotCreator => "not_creator",
            Closed => "lobby_closed",
            NotFound => "not_found",
        }
    }

    pub fn message(&self) -> String {
        use Outcome::*;
        match self {
            Joined { seats, limit } => format!("You joined the group ({seats}/{limit})."),
            Filled { seats, limit } => format!("You took the last seat ({seats}/{limit}), check your DMs."),
            Left { seats, limit } => format!("You left the group ({seats}/{limit})."),
            Cancelled => "The group was cancelled.".to_owned(),
            AlreadyJoined => "You're already in this group.".to_owned(),
            LobbyFull => "This group is full.".to_owned(),
            NotInGame => "You're not in this group.".to_owned(),
            CreatorCannotLeave => "You created this group, cancel it instead.".to_owned(),
            NotCreator => "Only the creator can cancel this group.".to_owned(),
            Closed => "This group is no longer open.".to_owned(),
            NotFound => "That group doesn't exist.".to_owned(),
        }
    }

    pub fn seats(&self) -> Option<(i64, i64)> {
        use Outcome::*;
        match *self {
            Joined { seats, limit } | Filled { seats, limit } | Left { seats, limit } => Some((seats, limit)),
            _ => None,
        }
    }
}
