//! Process configuration, read once from the environment (and `.env`).

use std::{collections::{HashMap, HashSet}, str::FromStr, time::Duration};

use anyhow::anyhow;

use crate::{lobby::LobbySettings, AppResult};

#[derive(Debug, Clone)]
pub struct RoomProviderConfig {
    pub url: String,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub listen_addr: String,
    pub platform_api: String,
    pub bot_token: String,
    /// Identity that owns every delivery endpoint this bridge creates.
    pub application_id: String,
    pub webhook_name: String,
    pub system_name: String,
    pub system_avatar: Option<String>,
    pub admins: HashSet<String>,
    pub room_provider: Option<RoomProviderConfig>,
    /// lobby category -> external game id
    pub room_games: HashMap<String, String>,
    pub fill_grace: Duration,
    pub lobby_ttl: time::Duration,
    pub sweep_every: Duration,
    pub heal_every: Duration,
}

impl Config {
    pub fn from_env() -> AppResult<Config> {
        let room_provider = match (optional("ROOM_PROVIDER_URL"), optional("ROOM_PROVIDER_TOKEN")) {
            (Some(url), Some(token)) => Some(RoomProviderConfig { url, token }),
            (None, None) => None,
            _ => return Err(anyhow!("ROOM_PROVIDER_URL and ROOM_PROVIDER_TOKEN must be set together"))?,
        };

        Ok(Config {
            database_url: or_default("DATABASE_URL", "sqlite://lfgbridge.db?mode=rwc"),
            listen_addr: or_default("LISTEN_ADDR", "0.0.0.0:8080"),
            platform_api: or_default("PLATFORM_API", "https://discord.com/api/v10"),
            bot_token: required("BOT_TOKEN")?,
            application_id: required("APPLICATION_ID")?,
            webhook_name: or_default("WEBHOOK_NAME", "LFG Bridge"),
            system_name: or_default("SYSTEM_NAME", "LFG Bridge"),
            system_avatar: optional("SYSTEM_AVATAR"),
            admins: parse_list(&or_default("ADMIN_IDS", "")),
            room_provider,
            room_games: parse_pairs(&or_default("ROOM_GAMES", ""))?,
            fill_grace: Duration::from_secs(parsed("LOBBY_FILL_GRACE_SECS", 120)?),
            lobby_ttl: time::Duration::minutes(parsed("LOBBY_TTL_MINS", 60)?),
            sweep_every: Duration::from_secs(parsed("LOBBY_SWEEP_SECS", 60)?),
            heal_every: Duration::from_secs(parsed("ENDPOINT_HEAL_SECS", 900)?),
        })
    }

    pub fn lobby_settings(&self) -> LobbySettings {
        LobbySettings {
            fill_grace: self.fill_grace,
            sender_label: self.system_name.clone(),
            admins: self.admins.clone(),
            room_token: self.room_provider.as_ref().map(|r| r.token.clone()).unwrap_or_default(),
            room_games: self.room_games.clone(),
        }
    }
}

fn optional(key: &str) -> Option<String> {
    dotenv::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn or_default(key: &str, default: &str) -> String {
    optional(key).unwrap_or_else(|| default.to_owned())
}

fn required(key: &str) -> AppResult<String> {
    Ok(optional(key).ok_or_else(|| anyhow!("{key} must be set"))?)
}

fn parsed<T: FromStr>(key: &str, default: T) -> AppResult<T> {
    match optional(key) {
        Some(raw) => Ok(raw.trim().parse().map_err(|_| anyhow!("{key}={raw} is not a valid number"))?),
        None => Ok(default),
    }
}

fn parse_list(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

fn parse_pairs(raw: &str) -> AppResult<HashMap<String, String>> {
    let mut pairs = HashMap::new();
    for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let Some((category, game)) = item.split_once('=') else {
            return Err(anyhow!("expected category=gameId in ROOM_GAMES, got {item}"))?;
        };
        pairs.insert(category.trim().to_lowercase(), game.trim().to_owned());
    }
    Ok(pairs)
}
