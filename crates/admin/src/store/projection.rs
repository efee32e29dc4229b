use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::backend::{Backend, BackendError, Query, Record, Records};

/// What happened to a completed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The response replaced the projection.
    Applied,
    /// A fetch issued later had already been applied; the response was
    /// discarded.
    Stale,
}

struct ProjectionState<R> {
    records: Vec<R>,
    /// Ticket of the fetch whose result (records or error) is currently held.
    settled: u64,
    last_error: Option<String>,
}

/// A sequenced, full-replace snapshot of one backend query.
pub struct Projection<R> {
    backend: Arc<dyn Backend>,
    query: Query,
    issued: AtomicU64,
    state: RwLock<ProjectionState<R>>,
}

impl<R: Record + Clone> Projection<R> {
    /// Create an empty projection of `query` over `R::TABLE`.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, query: Query) -> Self {
        Self {
            backend,
            query,
            issued: AtomicU64::new(0),
            state: RwLock::new(ProjectionState {
                records: Vec::new(),
                settled: 0,
                last_error: None,
            }),
        }
    }

    /// Fetch the current server snapshot and replace the projection with it.
    ///
    /// A failed fetch keeps the previous records and records the error
    /// message. Responses older than the data already held are discarded
    /// without touching state (their errors are still returned).
    ///
    /// # Errors
    ///
    /// Returns the backend error of this fetch.
    #[instrument(skip(self), fields(table = %R::TABLE))]
    pub async fn fetch(&self) -> Result<FetchOutcome, BackendError> {
        let ticket = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let result = Records::<R>::new(self.backend.as_ref())
            .select(&self.query)
            .await;

        let mut state = self.state.write().await;
        if ticket < state.settled {
            debug!(ticket, settled = state.settled, "discarding stale response");
            return result.map(|_| FetchOutcome::Stale);
        }
        state.settled = ticket;

        match result {
            Ok(records) => {
                debug!(ticket, rows = records.len(), "projection replaced");
                state.records = records;
                state.last_error = None;
                Ok(FetchOutcome::Applied)
            }
            Err(e) => {
                warn!(ticket, error = %e, "projection fetch failed");
                state.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Clone of the current records, in query order.
    pub async fn snapshot(&self) -> Vec<R> {
        self.state.read().await.records.clone()
    }

    /// Records matching `predicate`, in query order.
    pub async fn filtered(&self, predicate: impl Fn(&R) -> bool) -> Vec<R> {
        self.state
            .read()
            .await
            .records
            .iter()
            .filter(|record| predicate(record))
            .cloned()
            .collect()
    }

    /// Number of records currently held.
    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    /// Whether the projection currently holds no records.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.records.is_empty()
    }

    /// Whether the most recently issued fetch has not completed yet.
    pub async fn is_loading(&self) -> bool {
        let settled = self.state.read().await.settled;
        self.issued.load(Ordering::SeqCst) > settled
    }

    /// Error message of the most recent applied fetch, if it failed.
    pub async fn last_error(&self) -> Option<String> {
        self.state.read().await.last_error.clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::backend::{MemoryBackend, Operation, Table};
    use crate::models::SubscriptionRequest;

    fn seeded() -> Arc<MemoryBackend> {
        let backend = Arc::new(MemoryBackend::new());
        backend.seed(
            Table::SubscriptionRequests,
            [
                json!({"id": "old", "name": "A", "email": "a@x.com", "status": "pending",
                       "created_at": "2024-01-01T00:00:00Z"}),
                json!({"id": "new", "name": "B", "email": "b@x.com", "status": "approved",
                       "created_at": "2024-02-01T00:00:00Z"}),
            ],
        );
        backend
    }

    #[tokio::test]
    async fn test_fetch_replaces_in_order() {
        let backend = seeded();
        let store = Projection::<SubscriptionRequest>::requests(backend.clone());
        assert!(store.is_empty().await);

        assert_eq!(store.fetch().await.unwrap(), FetchOutcome::Applied);
        let ids: Vec<_> = store
            .snapshot()
            .await
            .into_iter()
            .map(|r| r.id.into_inner())
            .collect();
        assert_eq!(ids, ["new", "old"]);
        assert!(!store.is_loading().await);

        let pending = store.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending.first().unwrap().id.as_str(), "old");
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_records_and_sets_error() {
        let backend = seeded();
        let store = Projection::<SubscriptionRequest>::requests(backend.clone());
        store.fetch().await.unwrap();

        backend.fail_next(
            Table::SubscriptionRequests,
            Operation::Select,
            BackendError::Transient("timeout".into()),
        );
        assert!(store.fetch().await.is_err());
        assert_eq!(store.len().await, 2);
        assert_eq!(
            store.last_error().await.as_deref(),
            Some("backend unavailable: timeout")
        );

        store.fetch().await.unwrap();
        assert!(store.last_error().await.is_none());
    }
}
