//! Staff identity and role resolution.
//!
//! Authentication is delegated to the identity provider; the back-office
//! only maps an authenticated principal to a role through the `admin_users`
//! table. A principal without a role record is treated as an editor.

use std::sync::Arc;

use secrecy::SecretString;
use thiserror::Error;
use tracing::{info, instrument, warn};

use billing_desk_core::{AdminRole, Email, UserId};

use crate::backend::{Backend, BackendError, Filter, Order, Query, Records};
use crate::models::{AdminUser, CurrentAdmin, NewAdminUser, Principal};

/// Errors from identity operations.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The identity provider or role lookup failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The identity was registered but its role record could not be written.
    #[error("user {user_id} registered without a role record: {source}")]
    RoleAssignment {
        user_id: UserId,
        #[source]
        source: BackendError,
    },
}

/// Resolves the signed-in principal and their back-office role.
#[derive(Clone)]
pub struct IdentityResolver {
    backend: Arc<dyn Backend>,
}

impl IdentityResolver {
    /// Create a resolver over `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    fn admin_users(&self) -> Records<'_, AdminUser> {
        Records::new(self.backend.as_ref())
    }

    /// The signed-in staff member with their role, or `None` if nobody is
    /// signed in.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity provider or the role lookup fails.
    /// A missing role record is not an error.
    #[instrument(skip(self))]
    pub async fn current_principal(&self) -> Result<Option<CurrentAdmin>, IdentityError> {
        match self.backend.current_user().await? {
            Some(principal) => Ok(Some(self.resolve(principal).await?)),
            None => Ok(None),
        }
    }

    /// Attach the back-office role to an authenticated principal.
    ///
    /// # Errors
    ///
    /// Returns an error if the role lookup fails.
    #[instrument(skip(self, principal), fields(user_id = %principal.id))]
    pub async fn resolve(&self, principal: Principal) -> Result<CurrentAdmin, IdentityError> {
        let record = self
            .admin_users()
            .first(Query::new().filter(Filter::eq("user_id", principal.id.as_str())))
            .await?;

        Ok(match record {
            Some(record) => CurrentAdmin {
                principal,
                role: record.role,
                admin_user_id: Some(record.id),
            },
            None => {
                warn!("no admin_users record; defaulting role to editor");
                CurrentAdmin {
                    principal,
                    role: AdminRole::default(),
                    admin_user_id: None,
                }
            }
        })
    }

    /// Authenticate with email and password.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Unauthorized` for bad credentials, or any other
    /// backend failure.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn sign_in(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<CurrentAdmin, IdentityError> {
        let principal = self.backend.sign_in(email, password).await?;
        info!(user_id = %principal.id, "staff member signed in");
        self.resolve(principal).await
    }

    /// Register a new staff identity with the `editor` role.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::RoleAssignment`] if the identity was created
    /// but the role record was not.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn sign_up(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<CurrentAdmin, IdentityError> {
        let principal = self.backend.sign_up(email, password).await?;

        let record = self
            .admin_users()
            .insert(&NewAdminUser {
                user_id: principal.id.clone(),
                role: AdminRole::Editor,
            })
            .await
            .map_err(|source| IdentityError::RoleAssignment {
                user_id: principal.id.clone(),
                source,
            })?;

        info!(user_id = %principal.id, "staff member registered");
        Ok(CurrentAdmin {
            principal,
            role: record.role,
            admin_user_id: Some(record.id),
        })
    }

    /// End the authenticated session.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity provider rejects the call.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<(), IdentityError> {
        self.backend.sign_out().await?;
        Ok(())
    }

    /// All role records, newest first, each with the staff member's email
    /// and last sign-in.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend query fails.
    pub async fn list_admins(&self) -> Result<Vec<AdminUser>, IdentityError> {
        Ok(self
            .admin_users()
            .select(
                &Query::new()
                    .order(Order::desc("created_at"))
                    .embed(AdminUser::ACCOUNT_EMBED),
            )
            .await?)
    }
}
