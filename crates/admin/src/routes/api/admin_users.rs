//! Staff role listing (admin only).

use axum::{Json, Router, routing::get};

use crate::{error::AppError, middleware::RequireAdmin, models::AdminUser, state::AppState};

/// Build the admin users router.
pub fn router() -> Router<AppState> {
    Router::new().route("/api/admin-users", get(list_admin_users))
}

/// All role records, newest first.
///
/// # Errors
///
/// Returns an error if the backend query fails.
pub async fn list_admin_users(
    RequireAdmin(session): RequireAdmin,
) -> Result<Json<Vec<AdminUser>>, AppError> {
    Ok(Json(session.admin_users().await?))
}
