//! Product catalog service.
//!
//! Products live in SQLite; their cover and gallery images live in an object
//! store. The [`images`] module keeps the two consistent across create, edit
//! and delete while treating remote cleanup as best-effort.

pub mod config;
pub mod database;
pub mod errors;
pub mod handlers;
pub mod images;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

use axum::Router;
use state::AppState;

/// Build the full application router for `state`.
pub fn app(state: AppState) -> Router {
    let max_upload_bytes = state.assets.max_bytes();
    routes::routes::routes(max_upload_bytes).with_state(state)
}
