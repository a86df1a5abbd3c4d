mod admin;
mod lobbies;
mod relay;

use axum::{routing::{get, post}, Router};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/lobbies", get(lobbies::list_lobbies).post(lobbies::create_lobby))
        .route("/lobbies/{id}/join", post(lobbies::join_lobby))
        .route("/lobbies/{id}/leave", post(lobbies::leave_lobby))
        .route("/lobbies/{id}/cancel", post(lobbies::cancel_lobby))
        .route("/interactions", post(lobbies::interaction))
        .route("/relay/{purpose}", post(relay::relay))
        .route("/broadcast/{purpose}", post(relay::broadcast))
        .route("/admin/bindings", get(admin::list_bindings).post(admin::bind_channel))
        .route("/admin/heal", post(admin::heal))
}
