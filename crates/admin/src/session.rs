//! Per-session back-office context.
//!
//! A [`DeskSession`] is created once a staff member is authenticated. It owns
//! the record projections, the approval workflow and the identity resolver,
//! all sharing one backend handle. Mutations go through the session so the
//! affected projections are refetched afterwards.

use std::sync::Arc;

use secrecy::SecretString;
use thiserror::Error;
use tracing::{info, instrument, warn};

use billing_desk_core::{Email, RequestId};

use crate::backend::{Backend, BackendError};
use crate::models::{AdminUser, CurrentAdmin};
use crate::services::{
    Approval, ApprovalError, ApprovalWorkflow, DashboardSummary, IdentityError, IdentityResolver,
};
use crate::store::{CustomerStore, InvoiceStore, RequestStore};

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No authenticated principal.
    #[error("no staff member is signed in")]
    NotSignedIn,

    /// The operation requires the `admin` role.
    #[error("admin role required")]
    Forbidden,

    #[error(transparent)]
    Approval(#[from] ApprovalError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// The signed-in staff member's working context.
pub struct DeskSession {
    admin: CurrentAdmin,
    identity: IdentityResolver,
    workflow: ApprovalWorkflow,
    requests: RequestStore,
    customers: CustomerStore,
    invoices: InvoiceStore,
}

impl DeskSession {
    /// Start a session for whoever is currently authenticated with `backend`.
    ///
    /// Returns `Ok(None)` if nobody is signed in. Projections start empty;
    /// call [`DeskSession::refresh_all`] to load them.
    ///
    /// # Errors
    ///
    /// Returns an error if identity resolution fails.
    pub async fn start(backend: Arc<dyn Backend>) -> Result<Option<Self>, SessionError> {
        let identity = IdentityResolver::new(backend.clone());
        Ok(identity
            .current_principal()
            .await?
            .map(|admin| Self::with_admin(backend, identity, admin)))
    }

    /// Authenticate with `backend` and start a session.
    ///
    /// # Errors
    ///
    /// Returns an error for bad credentials or a failed role lookup.
    pub async fn sign_in(
        backend: Arc<dyn Backend>,
        email: &Email,
        password: &SecretString,
    ) -> Result<Self, SessionError> {
        let identity = IdentityResolver::new(backend.clone());
        let admin = identity.sign_in(email, password).await?;
        Ok(Self::with_admin(backend, identity, admin))
    }

    fn with_admin(backend: Arc<dyn Backend>, identity: IdentityResolver, admin: CurrentAdmin) -> Self {
        info!(user_id = %admin.principal.id, role = %admin.role, "desk session started");
        Self {
            admin,
            identity,
            workflow: ApprovalWorkflow::new(backend.clone()),
            requests: RequestStore::requests(backend.clone()),
            customers: CustomerStore::customers(backend.clone()),
            invoices: InvoiceStore::invoices(backend),
        }
    }

    /// The signed-in staff member.
    #[must_use]
    pub const fn current_admin(&self) -> &CurrentAdmin {
        &self.admin
    }

    #[must_use]
    pub const fn requests(&self) -> &RequestStore {
        &self.requests
    }

    #[must_use]
    pub const fn customers(&self) -> &CustomerStore {
        &self.customers
    }

    #[must_use]
    pub const fn invoices(&self) -> &InvoiceStore {
        &self.invoices
    }

    /// Refetch every projection concurrently.
    ///
    /// # Errors
    ///
    /// Returns the first failure; the other projections are still refreshed.
    #[instrument(skip(self))]
    pub async fn refresh_all(&self) -> Result<(), SessionError> {
        let (requests, customers, invoices) = tokio::join!(
            self.requests.fetch(),
            self.customers.fetch(),
            self.invoices.fetch(),
        );
        requests?;
        customers?;
        invoices?;
        Ok(())
    }

    /// Approve a request, then refetch requests and customers.
    ///
    /// # Errors
    ///
    /// Returns the workflow error. A failed refetch after a successful
    /// approval is logged and recorded on the projection, not returned.
    #[instrument(skip(self), fields(request_id = %request_id))]
    pub async fn approve(&self, request_id: &RequestId) -> Result<Approval, SessionError> {
        let approval = self.workflow.approve(request_id).await?;

        let (requests, customers) = tokio::join!(self.requests.fetch(), self.customers.fetch());
        if let Err(e) = requests.and(customers) {
            warn!(error = %e, "refresh after approval failed");
        }

        Ok(approval)
    }

    /// Headline figures from the currently loaded projections.
    pub async fn dashboard(&self) -> DashboardSummary {
        let (invoices, customers, requests) = tokio::join!(
            self.invoices.snapshot(),
            self.customers.snapshot(),
            self.requests.snapshot(),
        );
        DashboardSummary::compute(&invoices, &customers, &requests)
    }

    /// All role records. Admin only.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Forbidden`] for non-admins, or a backend error.
    pub async fn admin_users(&self) -> Result<Vec<AdminUser>, SessionError> {
        if !self.admin.is_admin() {
            return Err(SessionError::Forbidden);
        }
        Ok(self.identity.list_admins().await?)
    }

    /// Sign out and discard the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity provider rejects the sign-out.
    pub async fn end(self) -> Result<(), SessionError> {
        self.identity.sign_out().await?;
        info!(user_id = %self.admin.principal.id, "desk session ended");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use billing_desk_core::AdminRole;

    use super::*;
    use crate::backend::MemoryBackend;

    #[tokio::test]
    async fn test_start_without_principal() {
        let backend = Arc::new(MemoryBackend::new());
        assert!(DeskSession::start(backend).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_editor_cannot_list_admins() {
        let backend = Arc::new(MemoryBackend::new());
        let email = Email::parse("ed@x.com").unwrap();
        backend.register_user(email.clone(), "pw");

        let session = DeskSession::sign_in(backend, &email, &SecretString::from("pw"))
            .await
            .unwrap();
        assert_eq!(session.current_admin().role, AdminRole::Editor);
        assert!(matches!(
            session.admin_users().await,
            Err(SessionError::Forbidden)
        ));
        session.end().await.unwrap();
    }
}
