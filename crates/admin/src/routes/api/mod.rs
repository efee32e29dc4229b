//! JSON API route handlers.
//!
//! List endpoints refetch their projection before answering, so every
//! response reflects the backend at request time.

pub mod admin_users;
pub mod dashboard;
pub mod me;
pub mod records;
pub mod requests;

use axum::Router;

use crate::state::AppState;

/// Build the complete API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(me::router())
        .merge(requests::router())
        .merge(records::router())
        .merge(dashboard::router())
        .merge(admin_users::router())
}
