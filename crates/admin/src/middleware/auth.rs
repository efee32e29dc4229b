//! Authentication extractors for the back-office API.

use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;
use crate::session::DeskSession;
use crate::state::AppState;

/// Extractor that requires a signed-in desk session.
///
/// Rejects with 401 Unauthorized if the server has no authenticated session.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(RequireSession(session): RequireSession) -> impl IntoResponse {
///     Json(session.current_admin().clone())
/// }
/// ```
pub struct RequireSession(pub Arc<DeskSession>);

/// Extractor that requires the `admin` role.
///
/// Rejects with 401 if nobody is signed in, 403 if the staff member is an
/// editor.
pub struct RequireAdmin(pub Arc<DeskSession>);

fn signed_in(state: &AppState) -> Result<Arc<DeskSession>, AppError> {
    state
        .session()
        .ok_or_else(|| AppError::Unauthorized("no staff member is signed in".to_string()))
}

impl FromRequestParts<AppState> for RequireSession {
    type Rejection = AppError;

    async fn from_request_parts(
        _parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        signed_in(state).map(Self)
    }
}

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        _parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = signed_in(state)?;
        if !session.current_admin().is_admin() {
            return Err(AppError::Forbidden(
                "Only admins can access this resource".to_string(),
            ));
        }
        Ok(Self(session))
    }
}
