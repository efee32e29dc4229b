//! Administrative role records.
//!
//! Each record links an identity-provider user to a back-office role.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use billing_desk_core::{AdminRole, AdminUserId, UserId};

use crate::backend::{Embed, Record, Table};

/// Account fields of the staff member, embedded from the user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffAccount {
    pub email: String,
    #[serde(default)]
    pub last_sign_in_at: Option<DateTime<Utc>>,
}

/// An `admin_users` row (domain type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminUser {
    pub id: AdminUserId,
    /// Identity provider user this role applies to.
    pub user_id: UserId,
    pub role: AdminRole,
    pub created_at: DateTime<Utc>,
    /// Present when selected with [`AdminUser::ACCOUNT_EMBED`].
    #[serde(default, rename = "users")]
    pub account: Option<StaffAccount>,
}

impl AdminUser {
    /// Embed that pulls the staff member's email and last sign-in into
    /// each role record.
    pub const ACCOUNT_EMBED: Embed = Embed {
        table: Table::Users,
        foreign_key: "user_id",
        columns: &["email", "last_sign_in_at"],
    };
}

impl Record for AdminUser {
    const TABLE: Table = Table::AdminUsers;
}

/// Insert body for a new role record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewAdminUser {
    pub user_id: UserId,
    pub role: AdminRole,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_decodes_embedded_account() {
        let admin: AdminUser = serde_json::from_value(json!({
            "id": "a1",
            "user_id": "u1",
            "role": "admin",
            "created_at": "2024-01-01T00:00:00Z",
            "users": {"email": "boss@example.com", "last_sign_in_at": null}
        }))
        .unwrap();

        let account = admin.account.unwrap();
        assert_eq!(account.email, "boss@example.com");
        assert!(account.last_sign_in_at.is_none());
    }
}
