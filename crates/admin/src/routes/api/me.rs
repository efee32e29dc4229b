//! Current staff member.

use axum::{Json, Router, routing::get};

use crate::{middleware::RequireSession, models::CurrentAdmin, state::AppState};

/// Build the identity router.
pub fn router() -> Router<AppState> {
    Router::new().route("/api/me", get(me))
}

/// The signed-in staff member and their resolved role.
pub async fn me(RequireSession(session): RequireSession) -> Json<CurrentAdmin> {
    Json(session.current_admin().clone())
}
