//! HTTP route handlers for the back-office.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                      - Liveness check
//! GET  /health/ready                - Backend reachability check
//!
//! GET  /api/me                      - Signed-in staff member and role
//! GET  /api/requests[?status=]      - Subscription requests
//! POST /api/requests/{id}/approve   - Approve a pending request
//! GET  /api/customers               - Customers
//! GET  /api/invoices                - Invoices with customer contact
//! GET  /api/dashboard               - Headline figures
//! GET  /api/admin-users             - Role records (admin only)
//! ```

pub mod api;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the application router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(api::router())
}
