//! Integration test fixtures for Billing Desk.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p billing-desk-integration-tests
//! ```
//!
//! Everything runs against [`MemoryBackend`]; no external services needed.
//!
//! # Test Categories
//!
//! - `approval_workflow` - request to customer saga, idempotence, retries
//! - `projections` - full replace, ordering, out-of-order responses
//! - `identity` - role resolution and staff registration
//! - `api_routes` - JSON API status codes and bodies

#![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::missing_panics_doc)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::sync::oneshot;

use billing_desk_admin::backend::{
    BackendError, Filter, IdentityProvider, MemoryBackend, Query, RecordStore, Table,
};
use billing_desk_admin::models::Principal;
use billing_desk_admin::session::DeskSession;
use billing_desk_core::{AdminRole, Email};

/// Password used for every fixture staff member.
pub const STAFF_PASSWORD: &str = "correct horse battery staple";

/// A subscription request row.
#[must_use]
pub fn request_row(id: &str, name: &str, status: &str, created_at: &str) -> Value {
    let first = name.split_whitespace().next().unwrap_or(name).to_lowercase();
    json!({
        "id": id,
        "name": name,
        "email": format!("{first}@example.com"),
        "phone": "555-0100",
        "address": "1 Main St",
        "status": status,
        "created_at": created_at,
    })
}

/// A customer row.
#[must_use]
pub fn customer_row(id: &str, request_id: &str, name: &str, status: &str, created_at: &str) -> Value {
    json!({
        "id": id,
        "request_id": request_id,
        "name": name,
        "email": format!("{id}@example.com"),
        "phone": "555-0101",
        "address": "2 Main St",
        "status": status,
        "created_at": created_at,
    })
}

/// An invoice row.
#[must_use]
pub fn invoice_row(id: &str, customer_id: &str, amount: &str, due_date: &str, status: &str) -> Value {
    json!({
        "id": id,
        "customer_id": customer_id,
        "amount": amount,
        "due_date": due_date,
        "status": status,
        "created_at": "2024-01-01T00:00:00Z",
    })
}

/// Register a staff member, optionally with a role record, and sign them in.
pub fn add_staff(backend: &MemoryBackend, email: &str, role: Option<AdminRole>) -> Principal {
    let principal = backend.register_user(Email::parse(email).unwrap(), STAFF_PASSWORD);
    if let Some(role) = role {
        backend.seed(
            Table::AdminUsers,
            [json!({
                "id": format!("au-{}", principal.id),
                "user_id": principal.id,
                "role": role,
                "created_at": "2024-01-01T00:00:00Z",
            })],
        );
    }
    backend.set_signed_in(Some(principal.id.clone()));
    principal
}

/// Start a session for whoever is signed in to `backend`.
pub async fn session_for(backend: Arc<MemoryBackend>) -> DeskSession {
    DeskSession::start(backend).await.unwrap().unwrap()
}

/// Sign in with the fixture password.
pub async fn sign_in(backend: Arc<MemoryBackend>, email: &str) -> DeskSession {
    DeskSession::sign_in(
        backend,
        &Email::parse(email).unwrap(),
        &SecretString::from(STAFF_PASSWORD),
    )
    .await
    .unwrap()
}

/// Status of a request row as stored in the backend.
#[must_use]
pub fn stored_request_status(backend: &MemoryBackend, id: &str) -> Option<String> {
    backend
        .rows(Table::SubscriptionRequests)
        .into_iter()
        .find(|row| row["id"] == id)
        .and_then(|row| row["status"].as_str().map(str::to_owned))
}

struct HeldSelect {
    table: Option<Table>,
    started: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
}

/// Handle for a select held by [`GatedBackend`].
pub struct Gate {
    started: oneshot::Receiver<()>,
    release: oneshot::Sender<()>,
}

impl Gate {
    /// Wait until the held select has read its snapshot.
    pub async fn started(&mut self) {
        (&mut self.started).await.unwrap();
    }

    /// Let the held select return.
    pub fn release(self) {
        let _ = self.release.send(());
    }
}

/// A [`MemoryBackend`] wrapper that can hold select responses.
///
/// A held select reads its rows immediately and then waits for its gate to
/// be released, so responses can be delivered in any order. Inserts are
/// counted so tests can tell a conflicting write from one never attempted.
pub struct GatedBackend {
    inner: Arc<MemoryBackend>,
    held: Mutex<VecDeque<HeldSelect>>,
    inserts: AtomicUsize,
}

impl GatedBackend {
    #[must_use]
    pub fn new(inner: Arc<MemoryBackend>) -> Self {
        Self {
            inner,
            held: Mutex::new(VecDeque::new()),
            inserts: AtomicUsize::new(0),
        }
    }

    /// Hold the next select on any table until the returned gate is released.
    pub fn hold_next_select(&self) -> Gate {
        self.hold(None)
    }

    /// Hold the next select on `table` until the returned gate is released.
    pub fn hold_next_select_from(&self, table: Table) -> Gate {
        self.hold(Some(table))
    }

    /// Inserts attempted so far, including rejected ones.
    #[must_use]
    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    fn hold(&self, table: Option<Table>) -> Gate {
        let (started_tx, started_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        self.held.lock().unwrap().push_back(HeldSelect {
            table,
            started: started_tx,
            release: release_rx,
        });
        Gate {
            started: started_rx,
            release: release_tx,
        }
    }

    fn take_hold(&self, table: Table) -> Option<HeldSelect> {
        let mut held = self.held.lock().unwrap();
        let index = held
            .iter()
            .position(|h| h.table.is_none_or(|t| t == table))?;
        held.remove(index)
    }
}

#[async_trait]
impl RecordStore for GatedBackend {
    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Value>, BackendError> {
        let held = self.take_hold(table);
        let rows = self.inner.select(table, query).await;
        if let Some(held) = held {
            let _ = held.started.send(());
            let _ = held.release.await;
        }
        rows
    }

    async fn insert(&self, table: Table, record: Value) -> Result<Value, BackendError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(table, record).await
    }

    async fn update(
        &self,
        table: Table,
        filters: &[Filter],
        patch: Value,
    ) -> Result<u64, BackendError> {
        self.inner.update(table, filters, patch).await
    }
}

#[async_trait]
impl IdentityProvider for GatedBackend {
    async fn current_user(&self) -> Result<Option<Principal>, BackendError> {
        self.inner.current_user().await
    }

    async fn sign_in(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<Principal, BackendError> {
        self.inner.sign_in(email, password).await
    }

    async fn sign_up(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<Principal, BackendError> {
        self.inner.sign_up(email, password).await
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.inner.sign_out().await
    }
}
