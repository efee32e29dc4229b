//! In-memory projections of backend record sets.
//!
//! A projection holds the last snapshot fetched from the backend. Every
//! [`Projection::fetch`] replaces the whole collection; there is no delta
//! sync and no pagination.
//!
//! Fetches may run concurrently. Each one is tagged with a ticket when it is
//! issued, and a response is applied only if it is newer than the data
//! already held, so the projection always ends up reflecting the most
//! recently *issued* fetch regardless of the order responses arrive in.

mod projection;

pub use projection::{FetchOutcome, Projection};

use std::sync::Arc;

use crate::backend::{Backend, Order, Query};
use crate::models::{Customer, Invoice, SubscriptionRequest};

/// Subscription requests, newest first.
pub type RequestStore = Projection<SubscriptionRequest>;

/// Customers, newest first.
pub type CustomerStore = Projection<Customer>;

/// Invoices with billed-customer contact, latest due date first.
pub type InvoiceStore = Projection<Invoice>;

impl Projection<SubscriptionRequest> {
    /// Projection of all subscription requests ordered by `created_at` desc.
    #[must_use]
    pub fn requests(backend: Arc<dyn Backend>) -> Self {
        Self::new(backend, Query::new().order(Order::desc("created_at")))
    }

    /// Requests still awaiting review, in projection order.
    pub async fn pending(&self) -> Vec<SubscriptionRequest> {
        self.filtered(|request| request.status.is_pending()).await
    }
}

impl Projection<Customer> {
    /// Projection of all customers ordered by `created_at` desc.
    #[must_use]
    pub fn customers(backend: Arc<dyn Backend>) -> Self {
        Self::new(backend, Query::new().order(Order::desc("created_at")))
    }
}

impl Projection<Invoice> {
    /// Projection of all invoices ordered by `due_date` desc, each with the
    /// billed customer's contact details embedded.
    #[must_use]
    pub fn invoices(backend: Arc<dyn Backend>) -> Self {
        Self::new(
            backend,
            Query::new()
                .order(Order::desc("due_date"))
                .embed(Invoice::CUSTOMER_EMBED),
        )
    }
}
