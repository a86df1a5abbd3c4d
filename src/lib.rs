pub mod appresult;
pub mod bridge;
pub mod config;
pub mod db;
pub mod fanout;
pub mod ledger;
pub mod lobby;
pub mod platform;
pub mod registry;
pub mod routes;

use std::sync::Arc;

use anyhow::anyhow;
use axum::extract::FromRef;
use serde_json::Value;

pub use appresult::{AppError, AppResult};

use crate::{bridge::Bridge, config::Config, fanout::Fanout, lobby::Lobbies, platform::Platform, registry::Registry};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub config: Arc<Config>,
    pub platform: Arc<dyn Platform>,
    pub registry: Registry,
    pub fanout: Arc<Fanout>,
    pub bridge: Bridge,
    pub lobbies: Lobbies,
}

pub trait GetField {
    fn get_str_field(&self, field: &str) -> AppResult<String>;
    fn get_opt_str_field(&self, field: &str) -> Option<String>;
}

impl GetField for serde_json::Value {
    fn get_str_field(&self, field: &str) -> AppResult<String> {
        Ok(
            self.get(field)
            .ok_or_else(|| anyhow!("expected {field} in {self}"))?
            .as_str()
            .ok_or_else(|| anyhow!("expected {field} in {self} to be string"))?
            .to_owned()
        )
    }

    fn get_opt_str_field(&self, field: &str) -> Option<String> {
        self.get(field)
            .and_then(Value::as_str)
            .map(str::to_owned)
    }
}
