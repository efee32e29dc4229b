//! Identity types for the signed-in staff member.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use billing_desk_core::{AdminRole, AdminUserId, Email, UserId};

/// An authenticated identity as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: UserId,
    pub email: Email,
    pub last_sign_in_at: Option<DateTime<Utc>>,
}

/// The signed-in staff member with their resolved back-office role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentAdmin {
    pub principal: Principal,
    pub role: AdminRole,
    /// The role record, or `None` when the role was defaulted.
    pub admin_user_id: Option<AdminUserId>,
}

impl CurrentAdmin {
    /// Whether this staff member may see admin-only views.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self.role, AdminRole::Admin)
    }
}
