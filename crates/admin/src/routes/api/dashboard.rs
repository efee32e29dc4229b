//! Dashboard figures.

use axum::{Json, Router, routing::get};

use crate::{
    error::AppError, middleware::RequireSession, services::DashboardSummary, state::AppState,
};

/// Build the dashboard router.
pub fn router() -> Router<AppState> {
    Router::new().route("/api/dashboard", get(dashboard))
}

/// Refresh every projection and summarize them.
///
/// # Errors
///
/// Returns an error if any refetch fails.
pub async fn dashboard(
    RequireSession(session): RequireSession,
) -> Result<Json<DashboardSummary>, AppError> {
    session.refresh_all().await?;
    Ok(Json(session.dashboard().await))
}
