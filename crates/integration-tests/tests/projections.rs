//! Integration tests for sequenced projections.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;

use billing_desk_admin::backend::{MemoryBackend, Table};
use billing_desk_admin::store::{CustomerStore, FetchOutcome, InvoiceStore, RequestStore};
use billing_desk_integration_tests::{GatedBackend, customer_row, invoice_row, request_row};

#[tokio::test]
async fn test_fetch_is_full_replace_newest_first() {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed(
        Table::Customers,
        [
            customer_row("c1", "r1", "Old", "active", "2024-01-01T00:00:00Z"),
            customer_row("c2", "r2", "Newer", "inactive", "2024-02-01T00:00:00Z"),
        ],
    );
    let store = CustomerStore::customers(backend.clone());
    store.fetch().await.unwrap();
    assert_eq!(store.len().await, 2);

    backend.seed(
        Table::Customers,
        [customer_row("c3", "r3", "Newest", "active", "2024-03-01T00:00:00Z")],
    );
    store.fetch().await.unwrap();

    let names: Vec<_> = store.snapshot().await.into_iter().map(|c| c.name).collect();
    assert_eq!(names, ["Newest", "Newer", "Old"]);
}

#[tokio::test]
async fn test_invoices_by_due_date_with_customer_contact() {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed(
        Table::Customers,
        [customer_row("c1", "r1", "Jane Doe", "active", "2024-01-01T00:00:00Z")],
    );
    backend.seed(
        Table::Invoices,
        [
            invoice_row("i1", "c1", "49.00", "2024-04-30", "paid"),
            invoice_row("i2", "c1", "49.00", "2024-05-31", "pending"),
            invoice_row("i3", "gone", "49.00", "2024-03-31", "pending"),
        ],
    );
    let store = InvoiceStore::invoices(backend);
    store.fetch().await.unwrap();

    let invoices = store.snapshot().await;
    let ids: Vec<_> = invoices.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, ["i2", "i1", "i3"]);
    assert_eq!(invoices[0].customer.as_ref().unwrap().name, "Jane Doe");
    assert!(invoices[2].customer.is_none());
}

#[tokio::test]
async fn test_out_of_order_responses_keep_latest_issued_fetch() {
    let memory = Arc::new(MemoryBackend::new());
    memory.seed(
        Table::SubscriptionRequests,
        [request_row("r1", "Ann Lee", "pending", "2024-03-01T09:00:00Z")],
    );
    let gated = Arc::new(GatedBackend::new(memory.clone()));
    let store = Arc::new(RequestStore::requests(gated.clone()));

    // First fetch reads one row, then stalls
    let mut gate = gated.hold_next_select();
    let slow = tokio::spawn({
        let store = store.clone();
        async move { store.fetch().await }
    });
    gate.started().await;
    assert!(store.is_loading().await);

    // A second row arrives and a later fetch completes first
    memory.seed(
        Table::SubscriptionRequests,
        [request_row("r2", "Bo Chen", "pending", "2024-03-02T09:00:00Z")],
    );
    assert_eq!(store.fetch().await.unwrap(), FetchOutcome::Applied);
    assert_eq!(store.len().await, 2);
    assert!(!store.is_loading().await);

    // The stale response is discarded when it finally lands
    gate.release();
    assert_eq!(slow.await.unwrap().unwrap(), FetchOutcome::Stale);
    assert_eq!(store.len().await, 2);
    assert!(!store.is_loading().await);
}

#[tokio::test]
async fn test_in_order_responses_are_both_applied() {
    let memory = Arc::new(MemoryBackend::new());
    memory.seed(
        Table::SubscriptionRequests,
        [request_row("r1", "Ann Lee", "pending", "2024-03-01T09:00:00Z")],
    );
    let gated = Arc::new(GatedBackend::new(memory.clone()));
    let store = Arc::new(RequestStore::requests(gated.clone()));

    let mut gate = gated.hold_next_select();
    let first = tokio::spawn({
        let store = store.clone();
        async move { store.fetch().await }
    });
    gate.started().await;
    gate.release();
    assert_eq!(first.await.unwrap().unwrap(), FetchOutcome::Applied);

    memory.seed(
        Table::SubscriptionRequests,
        [request_row("r2", "Bo Chen", "approved", "2024-03-02T09:00:00Z")],
    );
    assert_eq!(store.fetch().await.unwrap(), FetchOutcome::Applied);

    let requests = store.snapshot().await;
    assert_eq!(requests[0].id.as_str(), "r2");
    let pending = store.pending().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id.as_str(), "r1");
}
