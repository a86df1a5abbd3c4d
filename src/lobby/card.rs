//! What a lobby looks like on the platform: the public card, its buttons,
//! and the direct notice sent when the group fills.

use std::fmt::Write;

use serde_json::{json, Value};
use uuid::Uuid;

use crate::platform::Payload;

use super::post::{LobbyPost, LobbyState, Participant};

const COLOR_OPEN: u32 = 0x57f287;
const COLOR_FULL: u32 = 0xfee75c;
const COLOR_CLOSED: u32 = 0x99aab5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Join,
    Leave,
    Cancel,
}

impl Action {
    pub fn id(&self) -> &'static str {
        match self {
            Action::Join => "join",
            Action::Leave => "leave",
            Action::Cancel => "cancel",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Action::Join => "Join",
            Action::Leave => "Leave",
            Action::Cancel => "Cancel",
        }
    }

    fn style(&self) -> u8 {
        match self {
            Action::Join => 3,
            Action::Leave => 2,
            Action::Cancel => 4,
        }
    }

    pub fn custom_id(&self, post_id: Uuid) -> String {
        format!("lfg:{}:{post_id}", self.id())
    }
}

/// Parses a button id produced by [`Action::custom_id`].
pub fn parse_custom_id(custom_id: &str) -> Option<(Action, Uuid)> {
    let mut parts = custom_id.splitn(3, ':');
    if parts.next()? != "lfg" {
        return None;
    }
    let action = match parts.next()? {
        "join" => Action::Join,
        "leave" => Action::Leave,
        "cancel" => Action::Cancel,
        _ => return None,
    };
    let post_id = Uuid::parse_str(parts.next()?).ok()?;
    Some((action, post_id))
}

/// Buttons offered for a post. Once the group is assembled only the creator's
/// cancel remains; finished posts offer nothing.
pub fn actions_for(state: LobbyState) -> &'static [Action] {
    match state {
        LobbyState::Open => &[Action::Join, Action::Leave, Action::Cancel],
        LobbyState::Full => &[Action::Cancel],
        LobbyState::Cancelled | LobbyState::Expired => &[],
    }
}

fn roster_lines(roster: &[Participant], seat_limit: i64) -> String {
    let mut lines = String::new();
    for (i, p) in roster.iter().enumerate() {
        let _ = writeln!(lines, "{}. <@{}>", i + 1, p.user_id);
    }
    for seat in roster.len() as i64..seat_limit {
        let _ = writeln!(lines, "{}. *open*", seat + 1);
    }
    lines
}

pub fn render(post: &LobbyPost, roster: &[Participant]) -> Payload {
    let (status, color) = match post.state {
        LobbyState::Open => ("Looking for players", COLOR_OPEN),
        LobbyState::Full => ("Group assembled", COLOR_FULL),
        LobbyState::Cancelled => ("Cancelled", COLOR_CLOSED),
        LobbyState::Expired => ("Expired", COLOR_CLOSED),
    };

    let description = if post.note.trim().is_empty() {
        format!("**{}** is {}", post.creator_name, status.to_lowercase())
    } else {
        post.note.clone()
    };

    let embed = json!({
        "type": "rich",
        "title": format!("{} · {status}", post.category),
        "description": description,
        "color": color,
        "fields": [
            {
                "name": format!("Players {}/{}", roster.len(), post.seat_limit),
                "value": roster_lines(roster, post.seat_limit),
                "inline": false,
            },
            {
                "name": "Expires",
                "value": format!("<t:{}:R>", post.expires_at.unix_timestamp()),
                "inline": true,
            },
        ],
        "footer": { "text": format!("Lobby {}", post.id) },
    });

    let buttons: Vec<Value> = actions_for(post.state)
        .iter()
        .map(|action| json!({
            "type": 2,
            "style": action.style(),
            "label": action.label(),
            "custom_id": action.custom_id(post.id),
        }))
        .collect();

    let components = if buttons.is_empty() {
        vec![]
    } else {
        vec![json!({ "type": 1, "components": buttons })]
    };

    Payload {
        content: String::new(),
        embeds: vec![embed],
        attachments: vec![],
        components,
    }
}

/// Direct notice for every member of a filled group: the roster plus either
/// the room link or how to set the game up by hand.
pub fn fill_notice(post: &LobbyPost, roster: &[Participant], room_url: Option<&str>) -> Payload {
    let mut content = format!("Your **{}** group is ready!\n\n", post.category);
    for p in roster {
        let _ = writeln!(content, "• {} (<@{}>)", p.user_name, p.user_id);
    }
    content.push('\n');

    match room_url {
        Some(url) => {
            let _ = write!(content, "Your room is waiting: {url}");
        }
        None => {
            let _ = write!(
                content,
                "We couldn't open a room automatically. {} hosts: create a private game, \
                 then invite everyone above by name.",
                post.creator_name,
            );
        }
    }

    Payload::text(content)
}
