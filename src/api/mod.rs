// API module - HTTP endpoints

use axum::Router;

use crate::api::middleware::session::AppState;

pub mod account;
pub mod admin;
pub mod health;
pub mod hooks;
pub mod middleware;
pub mod stream;

/// All HTTP surfaces. Session and trace layers are added by the caller.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(stream::router())
        .merge(account::router())
        .merge(admin::router())
        .merge(hooks::router())
}
