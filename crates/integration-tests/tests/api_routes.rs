//! Integration tests for the back-office JSON API.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use billing_desk_admin::backend::{BackendError, MemoryBackend, Operation, Table};
use billing_desk_admin::routes;
use billing_desk_admin::state::AppState;
use billing_desk_core::AdminRole;
use billing_desk_integration_tests::{
    add_staff, customer_row, invoice_row, request_row, session_for,
};
use serde_json::Value;
use tower::ServiceExt;

fn seeded(role: Option<AdminRole>) -> Arc<MemoryBackend> {
    let backend = Arc::new(MemoryBackend::new());
    add_staff(&backend, "ops@example.com", role);
    backend.seed(
        Table::SubscriptionRequests,
        [
            request_row("r1", "Ann Lee", "pending", "2024-03-01T09:00:00Z"),
            request_row("r2", "Bo Chen", "approved", "2024-03-02T09:00:00Z"),
        ],
    );
    backend.seed(
        Table::Customers,
        [customer_row("c2", "r2", "Bo Chen", "active", "2024-03-02T10:00:00Z")],
    );
    backend.seed(
        Table::Invoices,
        [
            invoice_row("i1", "c2", "49.00", "2024-04-30", "pending"),
            invoice_row("i2", "c2", "49.00", "2024-03-31", "paid"),
        ],
    );
    backend
}

async fn app(backend: Arc<MemoryBackend>) -> Router {
    let session = session_for(backend.clone()).await;
    routes::routes().with_state(AppState::new(backend, Some(session)))
}

async fn send(app: Router, method: Method, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::GET, uri).await
}

#[tokio::test]
async fn test_health() {
    let app = app(seeded(None)).await;
    let (status, _) = get(app.clone(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = get(app, "/health/ready").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_without_session_is_unauthorized() {
    let backend = seeded(None);
    let app = routes::routes().with_state(AppState::new(backend, None));

    let (status, body) = get(app.clone(), "/api/requests").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().contains("signed in"));

    let (status, _) = get(app, "/health/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_me_reports_defaulted_role() {
    let (status, body) = get(app(seeded(None)).await, "/api/me").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "editor");
    assert_eq!(body["principal"]["email"], "ops@example.com");
}

#[tokio::test]
async fn test_request_listing_and_status_filter() {
    let app = app(seeded(None)).await;

    let (status, body) = get(app.clone(), "/api/requests").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["id"], "r2");
    assert_eq!(body[1]["id"], "r1");

    let (_, body) = get(app.clone(), "/api/requests?status=pending").await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["id"], "r1");

    let (status, _) = get(app, "/api/requests?status=bogus").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_approve_status_codes() {
    let backend = seeded(None);
    let app = app(backend.clone()).await;

    let (status, body) = send(app.clone(), Method::POST, "/api/requests/r1/approve").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["customer"]["request_id"], "r1");
    assert_eq!(body["customer"]["status"], "active");
    assert_eq!(backend.rows(Table::Customers).len(), 2);

    let (status, _) = send(app.clone(), Method::POST, "/api/requests/r1/approve").await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(app, Method::POST, "/api/requests/nope/approve").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_backend_outage_is_bad_gateway() {
    let backend = seeded(None);
    let app = app(backend.clone()).await;
    backend.fail_next(
        Table::Customers,
        Operation::Select,
        BackendError::Transient("timeout".to_string()),
    );

    let (status, body) = get(app, "/api/customers").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "External service error");
}

#[tokio::test]
async fn test_invoices_embed_customer() {
    let (status, body) = get(app(seeded(None)).await, "/api/invoices").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["id"], "i1");
    assert_eq!(body[0]["customers"]["name"], "Bo Chen");
}

#[tokio::test]
async fn test_dashboard_figures() {
    let (status, body) = get(app(seeded(None)).await, "/api/dashboard").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_revenue"], "98.00");
    assert_eq!(body["pending_invoices"], 1);
    assert_eq!(body["active_customers"], 1);
    assert_eq!(body["pending_requests"], 1);
    assert_eq!(body["upcoming_dues"][0]["id"], "i1");
}

#[tokio::test]
async fn test_admin_users_requires_admin_role() {
    let (status, _) = get(app(seeded(Some(AdminRole::Editor))).await, "/api/admin-users").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = get(app(seeded(Some(AdminRole::Admin))).await, "/api/admin-users").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["role"], "admin");
    assert_eq!(body[0]["users"]["email"], "ops@example.com");
}
