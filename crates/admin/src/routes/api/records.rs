//! Read-only customer and invoice listings.

use axum::{Json, Router, routing::get};

use crate::{
    error::AppError,
    middleware::RequireSession,
    models::{Customer, Invoice},
    state::AppState,
};

/// Build the customer and invoice router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/customers", get(list_customers))
        .route("/api/invoices", get(list_invoices))
}

/// List customers, newest first.
///
/// # Errors
///
/// Returns an error if the refetch fails.
pub async fn list_customers(
    RequireSession(session): RequireSession,
) -> Result<Json<Vec<Customer>>, AppError> {
    session.customers().fetch().await?;
    Ok(Json(session.customers().snapshot().await))
}

/// List invoices with billed-customer contact, latest due date first.
///
/// # Errors
///
/// Returns an error if the refetch fails.
pub async fn list_invoices(
    RequireSession(session): RequireSession,
) -> Result<Json<Vec<Invoice>>, AppError> {
    session.invoices().fetch().await?;
    Ok(Json(session.invoices().snapshot().await))
}
