//! Subscription request listing and approval.

use axum::{
    Json, Router,
    extract::{Path, Query},
    routing::{get, post},
};
use serde::Deserialize;
use tracing::instrument;

use billing_desk_core::{RequestId, RequestStatus};

use crate::{
    error::AppError, middleware::RequireSession, models::SubscriptionRequest,
    services::Approval, state::AppState,
};

/// Build the requests router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/requests", get(list_requests))
        .route("/api/requests/{id}/approve", post(approve_request))
}

/// Optional status filter for the request list.
#[derive(Debug, Default, Deserialize)]
pub struct RequestListQuery {
    pub status: Option<RequestStatus>,
}

/// List subscription requests, newest first.
///
/// # Errors
///
/// Returns an error if the refetch fails.
#[instrument(skip(session))]
pub async fn list_requests(
    RequireSession(session): RequireSession,
    Query(query): Query<RequestListQuery>,
) -> Result<Json<Vec<SubscriptionRequest>>, AppError> {
    session.requests().fetch().await?;
    let requests = match query.status {
        Some(status) => session.requests().filtered(|r| r.status == status).await,
        None => session.requests().snapshot().await,
    };
    Ok(Json(requests))
}

/// Approve a pending request, creating its customer.
///
/// # Errors
///
/// 404 for an unknown request, 409 if it is already resolved, 500 if the
/// approval stopped half-way (safe to retry).
#[instrument(skip(session))]
pub async fn approve_request(
    RequireSession(session): RequireSession,
    Path(id): Path<RequestId>,
) -> Result<Json<Approval>, AppError> {
    Ok(Json(session.approve(&id).await?))
}
