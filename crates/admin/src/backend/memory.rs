//! In-process backend.
//!
//! Behaves like the hosted backend for the operations this crate uses:
//! generated `id` / `created_at`, unique constraints (`customers.request_id`
//! by default), equality filters, ordering, limits and foreign-key embeds.
//! Registered identities double as the read-only [`Table::Users`] directory.
//! Failures can be injected per table and operation to exercise partial
//! failure paths.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use billing_desk_core::{Email, UserId};

use super::{BackendError, Embed, Filter, IdentityProvider, Query, RecordStore, Table};
use crate::models::Principal;

/// Backend operations that can have failures injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Select,
    Insert,
    Update,
}

struct InjectedFailure {
    table: Table,
    operation: Operation,
    error: BackendError,
}

struct StoredUser {
    principal: Principal,
    password: SecretString,
}

impl StoredUser {
    fn as_row(&self) -> Map<String, Value> {
        let last_sign_in_at = self
            .principal
            .last_sign_in_at
            .map_or(Value::Null, |at| Value::String(at.to_rfc3339()));
        Map::from_iter([
            ("id".to_owned(), Value::String(self.principal.id.to_string())),
            (
                "email".to_owned(),
                Value::String(self.principal.email.as_str().to_owned()),
            ),
            ("last_sign_in_at".to_owned(), last_sign_in_at),
        ])
    }
}

#[derive(Default)]
struct MemoryState {
    tables: HashMap<Table, Vec<Map<String, Value>>>,
    unique: HashSet<(Table, &'static str)>,
    users: Vec<StoredUser>,
    signed_in: Option<UserId>,
    failures: VecDeque<InjectedFailure>,
}

impl MemoryState {
    fn table_rows(&self, table: Table) -> Vec<Map<String, Value>> {
        match table {
            Table::Users => self.users.iter().map(StoredUser::as_row).collect(),
            table => self.tables.get(&table).cloned().unwrap_or_default(),
        }
    }
}

/// In-memory [`RecordStore`] and [`IdentityProvider`].
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create an empty backend with the back-office's unique constraints.
    #[must_use]
    pub fn new() -> Self {
        let mut state = MemoryState::default();
        state.unique.insert((Table::Customers, "request_id"));
        state.unique.insert((Table::AdminUsers, "user_id"));
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store records as-is (no generated fields, no constraint checks).
    ///
    /// Non-object values are ignored.
    pub fn seed(&self, table: Table, records: impl IntoIterator<Item = Value>) {
        let mut state = self.lock();
        let rows = state.tables.entry(table).or_default();
        rows.extend(records.into_iter().filter_map(|record| match record {
            Value::Object(map) => Some(map),
            _ => None,
        }));
    }

    /// Snapshot of every record in `table`, in insertion order.
    #[must_use]
    pub fn rows(&self, table: Table) -> Vec<Value> {
        self.lock()
            .tables
            .get(&table)
            .map(|rows| rows.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }

    /// Make the next `operation` on `table` fail with `error`.
    ///
    /// Injected failures are consumed in the order they were added.
    pub fn fail_next(&self, table: Table, operation: Operation, error: BackendError) {
        self.lock().failures.push_back(InjectedFailure {
            table,
            operation,
            error,
        });
    }

    /// Register an identity that can later sign in.
    pub fn register_user(&self, email: Email, password: &str) -> Principal {
        let principal = Principal {
            id: UserId::generate(),
            email,
            last_sign_in_at: None,
        };
        self.lock().users.push(StoredUser {
            principal: principal.clone(),
            password: SecretString::from(password.to_owned()),
        });
        principal
    }

    /// Mark an already registered principal as signed in.
    pub fn set_signed_in(&self, user_id: Option<UserId>) {
        self.lock().signed_in = user_id;
    }

    fn take_failure(state: &mut MemoryState, table: Table, operation: Operation) -> Option<BackendError> {
        let index = state
            .failures
            .iter()
            .position(|f| f.table == table && f.operation == operation)?;
        state.failures.remove(index).map(|f| f.error)
    }
}

#[async_trait]
impl RecordStore for MemoryBackend {
    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Value>, BackendError> {
        let mut state = self.lock();
        if let Some(error) = Self::take_failure(&mut state, table, Operation::Select) {
            return Err(error);
        }

        let rows = state.table_rows(table);
        let mut selected: Vec<Map<String, Value>> = rows
            .into_iter()
            .filter(|row| {
                query
                    .filters
                    .iter()
                    .all(|f| row.get(f.column) == Some(&f.value))
            })
            .collect();

        if let Some(order) = query.order {
            selected.sort_by(|a, b| {
                let ordering = compare_values(a.get(order.column), b.get(order.column));
                if order.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }
        if let Some(limit) = query.limit {
            selected.truncate(limit);
        }
        if let Some(embed) = query.embed {
            let related = state.table_rows(embed.table);
            for row in &mut selected {
                let embedded = embed_related(row, &embed, &related);
                row.insert(embed.table.name().to_owned(), embedded);
            }
        }

        debug!(%table, rows = selected.len(), "memory select");
        Ok(selected.into_iter().map(Value::Object).collect())
    }

    async fn insert(&self, table: Table, record: Value) -> Result<Value, BackendError> {
        let mut state = self.lock();
        if let Some(error) = Self::take_failure(&mut state, table, Operation::Insert) {
            return Err(error);
        }

        let Value::Object(mut record) = record else {
            return Err(BackendError::Api {
                status: 400,
                message: format!("{table} insert expects a JSON object"),
            });
        };
        record
            .entry("id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        record
            .entry("created_at")
            .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));

        let rows = state.tables.get(&table).map(Vec::as_slice).unwrap_or_default();
        for &(unique_table, column) in &state.unique {
            if unique_table != table {
                continue;
            }
            let Some(value) = record.get(column).filter(|v| !v.is_null()) else {
                continue;
            };
            if rows.iter().any(|row| row.get(column) == Some(value)) {
                return Err(BackendError::Constraint(format!(
                    "duplicate key value violates unique constraint \"{table}_{column}_key\""
                )));
            }
        }
        if rows.iter().any(|row| row.get("id") == record.get("id")) {
            return Err(BackendError::Constraint(format!(
                "duplicate key value violates unique constraint \"{table}_pkey\""
            )));
        }

        state.tables.entry(table).or_default().push(record.clone());
        debug!(%table, "memory insert");
        Ok(Value::Object(record))
    }

    async fn update(
        &self,
        table: Table,
        filters: &[Filter],
        patch: Value,
    ) -> Result<u64, BackendError> {
        let mut state = self.lock();
        if let Some(error) = Self::take_failure(&mut state, table, Operation::Update) {
            return Err(error);
        }

        let Value::Object(patch) = patch else {
            return Err(BackendError::Api {
                status: 400,
                message: format!("{table} update expects a JSON object"),
            });
        };

        let mut matched = 0;
        for row in state.tables.entry(table).or_default().iter_mut() {
            if filters.iter().all(|f| row.get(f.column) == Some(&f.value)) {
                for (key, value) in &patch {
                    row.insert(key.clone(), value.clone());
                }
                matched += 1;
            }
        }
        debug!(%table, matched, "memory update");
        Ok(matched)
    }
}

#[async_trait]
impl IdentityProvider for MemoryBackend {
    async fn current_user(&self) -> Result<Option<Principal>, BackendError> {
        let state = self.lock();
        Ok(state.signed_in.as_ref().and_then(|id| {
            state
                .users
                .iter()
                .find(|u| &u.principal.id == id)
                .map(|u| u.principal.clone())
        }))
    }

    async fn sign_in(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<Principal, BackendError> {
        let mut state = self.lock();
        let user = state
            .users
            .iter_mut()
            .find(|u| &u.principal.email == email)
            .filter(|u| u.password.expose_secret() == password.expose_secret())
            .ok_or_else(|| BackendError::Unauthorized("invalid login credentials".to_owned()))?;

        user.principal.last_sign_in_at = Some(Utc::now());
        let principal = user.principal.clone();
        state.signed_in = Some(principal.id.clone());
        Ok(principal)
    }

    async fn sign_up(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<Principal, BackendError> {
        if self.lock().users.iter().any(|u| &u.principal.email == email) {
            return Err(BackendError::Constraint("user already registered".to_owned()));
        }
        let principal = self.register_user(email.clone(), password.expose_secret());
        self.set_signed_in(Some(principal.id.clone()));
        Ok(principal)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.set_signed_in(None);
        Ok(())
    }
}

/// Order JSON scalars: numbers numerically, strings lexically (RFC 3339
/// timestamps and ISO dates sort correctly), nulls first.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        (Some(a), Some(b)) => a.to_string().cmp(&b.to_string()),
    }
}

fn embed_related(row: &Map<String, Value>, embed: &Embed, related: &[Map<String, Value>]) -> Value {
    let Some(key) = row.get(embed.foreign_key) else {
        return Value::Null;
    };
    related
        .iter()
        .find(|candidate| candidate.get("id") == Some(key))
        .map_or(Value::Null, |candidate| {
            Value::Object(
                embed
                    .columns
                    .iter()
                    .map(|&column| {
                        (
                            column.to_owned(),
                            candidate.get(column).cloned().unwrap_or(Value::Null),
                        )
                    })
                    .collect(),
            )
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::backend::Order;

    #[tokio::test]
    async fn test_insert_generates_id_and_created_at() {
        let backend = MemoryBackend::new();
        let created = backend
            .insert(Table::Customers, json!({"name": "Jane"}))
            .await
            .unwrap();
        assert!(created["id"].is_string());
        assert!(created["created_at"].is_string());
        assert_eq!(backend.rows(Table::Customers).len(), 1);
    }

    #[tokio::test]
    async fn test_unique_request_id() {
        let backend = MemoryBackend::new();
        backend
            .insert(Table::Customers, json!({"request_id": "r1"}))
            .await
            .unwrap();
        let err = backend
            .insert(Table::Customers, json!({"request_id": "r1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Constraint(_)));
    }

    #[tokio::test]
    async fn test_select_filters_orders_and_limits() {
        let backend = MemoryBackend::new();
        backend.seed(
            Table::SubscriptionRequests,
            [
                json!({"id": "a", "status": "pending", "created_at": "2024-01-01T00:00:00Z"}),
                json!({"id": "b", "status": "approved", "created_at": "2024-01-02T00:00:00Z"}),
                json!({"id": "c", "status": "pending", "created_at": "2024-01-03T00:00:00Z"}),
            ],
        );

        let query = Query::new()
            .filter(Filter::eq("status", "pending"))
            .order(Order::desc("created_at"));
        let rows = backend
            .select(Table::SubscriptionRequests, &query)
            .await
            .unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, ["c", "a"]);

        let rows = backend
            .select(Table::SubscriptionRequests, &query.limit(1))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_update_counts_matches() {
        let backend = MemoryBackend::new();
        backend.seed(
            Table::SubscriptionRequests,
            [json!({"id": "r1", "status": "pending"})],
        );
        let filters = [Filter::eq("id", "r1"), Filter::eq("status", "pending")];

        let matched = backend
            .update(Table::SubscriptionRequests, &filters, json!({"status": "approved"}))
            .await
            .unwrap();
        assert_eq!(matched, 1);

        let matched = backend
            .update(Table::SubscriptionRequests, &filters, json!({"status": "approved"}))
            .await
            .unwrap();
        assert_eq!(matched, 0);
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed_once() {
        let backend = MemoryBackend::new();
        backend.fail_next(
            Table::Customers,
            Operation::Select,
            BackendError::Transient("connection reset".into()),
        );
        assert!(backend.select(Table::Customers, &Query::new()).await.is_err());
        assert!(backend.select(Table::Customers, &Query::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_embed_related_columns() {
        let backend = MemoryBackend::new();
        backend.seed(
            Table::Customers,
            [json!({"id": "c1", "name": "Jane", "email": "jane@x.com", "phone": "555"})],
        );
        backend.seed(Table::Invoices, [json!({"id": "i1", "customer_id": "c1"})]);

        let query = Query::new().embed(Embed {
            table: Table::Customers,
            foreign_key: "customer_id",
            columns: &["name", "email"],
        });
        let rows = backend.select(Table::Invoices, &query).await.unwrap();
        assert_eq!(rows[0]["customers"], json!({"name": "Jane", "email": "jane@x.com"}));
    }

    #[tokio::test]
    async fn test_embed_user_directory() {
        let backend = MemoryBackend::new();
        let principal = backend.register_user(Email::parse("ops@desk.io").unwrap(), "pw");
        backend.seed(
            Table::AdminUsers,
            [json!({"id": "a1", "user_id": principal.id.to_string(), "role": "admin"})],
        );

        let query = Query::new().embed(Embed {
            table: Table::Users,
            foreign_key: "user_id",
            columns: &["email", "last_sign_in_at"],
        });
        let rows = backend.select(Table::AdminUsers, &query).await.unwrap();
        assert_eq!(
            rows[0]["users"],
            json!({"email": "ops@desk.io", "last_sign_in_at": null})
        );
    }

    #[tokio::test]
    async fn test_sign_in_checks_password() {
        let backend = MemoryBackend::new();
        let email = Email::parse("ops@desk.io").unwrap();
        backend.register_user(email.clone(), "correct horse");

        let wrong = SecretString::from("battery".to_owned());
        assert!(matches!(
            backend.sign_in(&email, &wrong).await,
            Err(BackendError::Unauthorized(_))
        ));
        assert!(backend.current_user().await.unwrap().is_none());

        let right = SecretString::from("correct horse".to_owned());
        let principal = backend.sign_in(&email, &right).await.unwrap();
        assert!(principal.last_sign_in_at.is_some());
        assert_eq!(backend.current_user().await.unwrap().unwrap().id, principal.id);

        backend.sign_out().await.unwrap();
        assert!(backend.current_user().await.unwrap().is_none());
    }
}
