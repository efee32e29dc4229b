//! Subscription requests submitted through the public sign-up form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use billing_desk_core::{RequestId, RequestStatus};

use crate::backend::{Record, Table};

/// A prospective customer's request to subscribe.
///
/// Created outside the back-office; only the approval workflow changes it,
/// and only its `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    pub id: RequestId,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

impl Record for SubscriptionRequest {
    const TABLE: Table = Table::SubscriptionRequests;
}

/// Patch body for a request status transition.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RequestStatusPatch {
    pub status: RequestStatus,
}
