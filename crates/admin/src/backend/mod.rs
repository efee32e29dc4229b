//! External backend capability.
//!
//! All persistence, authentication and query execution live in a managed
//! backend (a PostgREST-style record API plus a GoTrue-style identity API).
//! This module defines the narrow capability the rest of the crate consumes:
//!
//! - [`RecordStore`] - `select` / `insert` / `update` over named tables
//! - [`IdentityProvider`] - current principal, sign in/up/out
//! - [`Records`] - typed facade over a [`RecordStore`] for a [`Record`] type
//!
//! # Implementations
//!
//! - [`RestBackend`] - HTTP client for the hosted backend (reqwest)
//! - [`MemoryBackend`] - in-process store used by tests and local demos

mod memory;
mod query;
mod rest;

pub use memory::{MemoryBackend, Operation};
pub use query::{Embed, Filter, Order, Query, Table};
pub use rest::RestBackend;

use std::marker::PhantomData;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use billing_desk_core::Email;

use crate::models::Principal;

/// Errors surfaced by the backend capability.
///
/// Every failure of an external call lands in one of these buckets; callers
/// decide what a bucket means for their operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// The referenced record or endpoint does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The store rejected a write (unique key, foreign key, check constraint).
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// Credentials are missing, expired or insufficient.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Network failure, timeout, or backend temporarily unavailable.
    #[error("backend unavailable: {0}")]
    Transient(String),

    /// Any other error response from the backend.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// A response could not be decoded into the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
}

impl BackendError {
    /// Whether repeating the same call may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Record CRUD over named tables.
///
/// Records travel as JSON objects; use [`Records`] for typed access.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Return all records of `table` matching `query`, in the query's order.
    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Value>, BackendError>;

    /// Insert one record and return it as created (with generated fields).
    async fn insert(&self, table: Table, record: Value) -> Result<Value, BackendError>;

    /// Apply `patch` to every record matching all `filters`.
    ///
    /// Returns the number of records matched.
    async fn update(
        &self,
        table: Table,
        filters: &[Filter],
        patch: Value,
    ) -> Result<u64, BackendError>;
}

/// Authentication delegated to the external identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The currently authenticated principal, if any.
    async fn current_user(&self) -> Result<Option<Principal>, BackendError>;

    /// Authenticate with email and password.
    async fn sign_in(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<Principal, BackendError>;

    /// Register a new identity.
    async fn sign_up(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<Principal, BackendError>;

    /// End the current authenticated session.
    async fn sign_out(&self) -> Result<(), BackendError>;
}

/// The full backend capability: records plus identity.
pub trait Backend: RecordStore + IdentityProvider {}

impl<T: RecordStore + IdentityProvider> Backend for T {}

/// A typed record stored in a backend table.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Table holding records of this type.
    const TABLE: Table;
}

/// Typed facade over a [`RecordStore`] for one record type.
pub struct Records<'a, R> {
    store: &'a dyn Backend,
    _record: PhantomData<fn() -> R>,
}

impl<'a, R: Record> Records<'a, R> {
    /// Wrap a backend for typed access to `R::TABLE`.
    #[must_use]
    pub fn new(store: &'a dyn Backend) -> Self {
        Self {
            store,
            _record: PhantomData,
        }
    }

    /// Select and decode all matching records.
    ///
    /// # Errors
    ///
    /// Propagates backend failures; returns `BackendError::Decode` if a row
    /// does not match `R`.
    pub async fn select(&self, query: &Query) -> Result<Vec<R>, BackendError> {
        self.store
            .select(R::TABLE, query)
            .await?
            .into_iter()
            .map(decode::<R>)
            .collect()
    }

    /// Select the first matching record, if any.
    ///
    /// # Errors
    ///
    /// Same as [`Records::select`].
    pub async fn first(&self, query: Query) -> Result<Option<R>, BackendError> {
        let rows = self.store.select(R::TABLE, &query.limit(1)).await?;
        rows.into_iter().next().map(decode::<R>).transpose()
    }

    /// Insert a new record and decode the created row.
    ///
    /// # Errors
    ///
    /// Propagates backend failures; returns `BackendError::Decode` if the
    /// new record cannot be serialized or the created row cannot be decoded.
    pub async fn insert<N: Serialize + Sync>(&self, new: &N) -> Result<R, BackendError> {
        let record = encode(R::TABLE, new)?;
        decode(self.store.insert(R::TABLE, record).await?)
    }

    /// Patch all records matching `filters`, returning how many matched.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn update<P: Serialize + Sync>(
        &self,
        filters: &[Filter],
        patch: &P,
    ) -> Result<u64, BackendError> {
        let patch = encode(R::TABLE, patch)?;
        self.store.update(R::TABLE, filters, patch).await
    }
}

fn encode<T: Serialize>(table: Table, value: &T) -> Result<Value, BackendError> {
    serde_json::to_value(value)
        .map_err(|e| BackendError::Decode(format!("cannot encode {table} record: {e}")))
}

fn decode<R: Record>(value: Value) -> Result<R, BackendError> {
    serde_json::from_value(value)
        .map_err(|e| BackendError::Decode(format!("invalid {} record: {e}", R::TABLE)))
}
