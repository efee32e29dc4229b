//! Subscription request approval.
//!
//! Approving a request creates a customer from it and marks the request
//! `approved`. The two writes are sequential and not atomic, so the workflow
//! is keyed on `customers.request_id`: a customer left behind by an earlier
//! interrupted attempt is found and reused, and the status transition only
//! applies while the request is still pending. Retrying any failed approval
//! is safe.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use billing_desk_core::{CustomerId, RequestId, RequestStatus};

use crate::backend::{Backend, BackendError, Filter, Query, Records};
use crate::models::{Customer, NewCustomer, RequestStatusPatch, SubscriptionRequest};

/// Errors from [`ApprovalWorkflow::approve`].
#[derive(Debug, Error)]
pub enum ApprovalError {
    /// No request with this id exists.
    #[error("subscription request {0} not found")]
    NotFound(RequestId),

    /// The request has already left `pending`.
    #[error("subscription request {id} is already {status}")]
    AlreadyResolved { id: RequestId, status: RequestStatus },

    /// The backend rejected the customer record.
    #[error("customer record rejected: {0}")]
    ConstraintViolation(#[source] BackendError),

    /// The customer exists but the request is still pending.
    ///
    /// Retrying the approval reuses `customer_id` and only repeats the
    /// status update.
    #[error(
        "customer {customer_id} created but request {request_id} was not marked approved: {source}"
    )]
    PartialFailure {
        request_id: RequestId,
        customer_id: CustomerId,
        #[source]
        source: BackendError,
    },

    /// Any other backend failure.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl ApprovalError {
    /// Whether calling `approve` again for the same request may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::PartialFailure { .. } => true,
            Self::Backend(source) => source.is_transient(),
            Self::NotFound(_) | Self::AlreadyResolved { .. } | Self::ConstraintViolation(_) => {
                false
            }
        }
    }
}

/// Result of a successful approval.
#[derive(Debug, Clone, Serialize)]
pub struct Approval {
    /// The request as read before the status transition.
    pub request: SubscriptionRequest,
    /// The customer created from (or previously created for) the request.
    pub customer: Customer,
    /// Whether the customer came from an earlier, interrupted attempt.
    pub resumed: bool,
}

/// Turns pending subscription requests into customers.
///
/// Stateless apart from the backend handle; never touches local projections.
#[derive(Clone)]
pub struct ApprovalWorkflow {
    backend: Arc<dyn Backend>,
}

impl ApprovalWorkflow {
    /// Create a workflow over `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    fn requests(&self) -> Records<'_, SubscriptionRequest> {
        Records::new(self.backend.as_ref())
    }

    fn customers(&self) -> Records<'_, Customer> {
        Records::new(self.backend.as_ref())
    }

    /// Approve a pending request.
    ///
    /// # Errors
    ///
    /// - [`ApprovalError::NotFound`] if no request has this id
    /// - [`ApprovalError::AlreadyResolved`] if it is not pending, or a
    ///   concurrent approval completed first
    /// - [`ApprovalError::ConstraintViolation`] if the customer insert is
    ///   rejected for a reason other than a duplicate approval
    /// - [`ApprovalError::PartialFailure`] if the status update fails after
    ///   the customer exists
    /// - [`ApprovalError::Backend`] for other backend failures
    #[instrument(skip(self), fields(request_id = %request_id))]
    pub async fn approve(&self, request_id: &RequestId) -> Result<Approval, ApprovalError> {
        let request = self
            .requests()
            .first(Query::new().filter(Filter::eq("id", request_id.as_str())))
            .await?
            .ok_or_else(|| ApprovalError::NotFound(request_id.clone()))?;

        if request.status == RequestStatus::Rejected {
            return Err(ApprovalError::AlreadyResolved {
                id: request.id,
                status: request.status,
            });
        }

        let existing = self.customer_for(request_id).await?;

        if !request.status.is_pending() {
            debug!(status = %request.status, "request already resolved");
            return Err(ApprovalError::AlreadyResolved {
                id: request.id,
                status: request.status,
            });
        }

        let (customer, resumed) = match existing {
            Some(customer) => {
                info!(customer_id = %customer.id, "resuming approval with existing customer");
                (customer, true)
            }
            None => (self.create_customer(&request).await?, false),
        };

        let matched = self
            .requests()
            .update(
                &[
                    Filter::eq("id", request_id.as_str()),
                    Filter::eq("status", RequestStatus::Pending.as_str()),
                ],
                &RequestStatusPatch {
                    status: RequestStatus::Approved,
                },
            )
            .await
            .map_err(|source| {
                warn!(customer_id = %customer.id, error = %source, "status update failed after customer creation");
                ApprovalError::PartialFailure {
                    request_id: request_id.clone(),
                    customer_id: customer.id.clone(),
                    source,
                }
            })?;

        if matched == 0 {
            debug!("request resolved concurrently");
            return Err(ApprovalError::AlreadyResolved {
                id: request.id,
                status: RequestStatus::Approved,
            });
        }

        info!(customer_id = %customer.id, resumed, "subscription request approved");
        Ok(Approval {
            request,
            customer,
            resumed,
        })
    }

    async fn customer_for(&self, request_id: &RequestId) -> Result<Option<Customer>, BackendError> {
        self.customers()
            .first(Query::new().filter(Filter::eq("request_id", request_id.as_str())))
            .await
    }

    /// Insert the customer for `request`, adopting the winner's record if a
    /// concurrent approval inserted one first.
    async fn create_customer(&self, request: &SubscriptionRequest) -> Result<Customer, ApprovalError> {
        match self
            .customers()
            .insert(&NewCustomer::from_request(request))
            .await
        {
            Ok(customer) => {
                debug!(customer_id = %customer.id, "customer created");
                Ok(customer)
            }
            Err(BackendError::Constraint(message)) => {
                match self.customer_for(&request.id).await? {
                    Some(customer) => {
                        info!(customer_id = %customer.id, "customer inserted concurrently; adopting it");
                        Ok(customer)
                    }
                    None => Err(ApprovalError::ConstraintViolation(BackendError::Constraint(
                        message,
                    ))),
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::backend::{MemoryBackend, Operation, Table};

    fn backend_with(requests: &[(&str, &str)]) -> Arc<MemoryBackend> {
        let backend = Arc::new(MemoryBackend::new());
        backend.seed(
            Table::SubscriptionRequests,
            requests.iter().map(|(id, status)| {
                json!({
                    "id": id,
                    "name": "Jane Doe",
                    "email": "jane@x.com",
                    "phone": "555-1000",
                    "address": "12 Oak St",
                    "status": status,
                    "created_at": "2024-03-01T09:00:00Z",
                })
            }),
        );
        backend
    }

    #[tokio::test]
    async fn test_approve_creates_active_customer() {
        let backend = backend_with(&[("r1", "pending")]);
        let workflow = ApprovalWorkflow::new(backend.clone());

        let approval = workflow.approve(&RequestId::new("r1")).await.unwrap();

        assert!(!approval.resumed);
        assert_eq!(approval.request.status, RequestStatus::Pending);
        assert_eq!(approval.customer.name, "Jane Doe");
        assert_eq!(approval.customer.request_id.as_str(), "r1");
        assert_eq!(backend.rows(Table::Customers).len(), 1);
        assert_eq!(backend.rows(Table::SubscriptionRequests)[0]["status"], "approved");
    }

    #[tokio::test]
    async fn test_unknown_request_is_not_found() {
        let backend = backend_with(&[]);
        let workflow = ApprovalWorkflow::new(backend.clone());

        let err = workflow.approve(&RequestId::new("r9")).await.unwrap_err();
        assert!(matches!(err, ApprovalError::NotFound(id) if id.as_str() == "r9"));
        assert!(backend.rows(Table::Customers).is_empty());
    }

    #[tokio::test]
    async fn test_rejected_request_is_left_alone() {
        let backend = backend_with(&[("r1", "rejected")]);
        let workflow = ApprovalWorkflow::new(backend.clone());

        let err = workflow.approve(&RequestId::new("r1")).await.unwrap_err();
        assert!(matches!(
            err,
            ApprovalError::AlreadyResolved {
                status: RequestStatus::Rejected,
                ..
            }
        ));
        assert!(!err.is_retryable());
        assert!(backend.rows(Table::Customers).is_empty());
    }

    #[tokio::test]
    async fn test_partial_failure_then_retry_reuses_customer() {
        let backend = backend_with(&[("r1", "pending")]);
        let workflow = ApprovalWorkflow::new(backend.clone());
        backend.fail_next(
            Table::SubscriptionRequests,
            Operation::Update,
            BackendError::Transient("connection reset".into()),
        );

        let err = workflow.approve(&RequestId::new("r1")).await.unwrap_err();
        let ApprovalError::PartialFailure { customer_id, .. } = &err else {
            panic!("expected partial failure, got {err:?}");
        };
        assert!(err.is_retryable());
        let first_customer = customer_id.clone();

        let approval = workflow.approve(&RequestId::new("r1")).await.unwrap();
        assert!(approval.resumed);
        assert_eq!(approval.customer.id, first_customer);
        assert_eq!(backend.rows(Table::Customers).len(), 1);
    }

    #[tokio::test]
    async fn test_non_duplicate_constraint_is_reported() {
        let backend = backend_with(&[("r1", "pending")]);
        let workflow = ApprovalWorkflow::new(backend.clone());
        backend.fail_next(
            Table::Customers,
            Operation::Insert,
            BackendError::Constraint("customers_email_check".into()),
        );

        let err = workflow.approve(&RequestId::new("r1")).await.unwrap_err();
        assert!(matches!(err, ApprovalError::ConstraintViolation(_)));
        assert_eq!(backend.rows(Table::SubscriptionRequests)[0]["status"], "pending");
    }
}
