//! Customers created from approved subscription requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use billing_desk_core::{CustomerId, CustomerStatus, RequestId};

use super::SubscriptionRequest;
use crate::backend::{Record, Table};

/// An active or former subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    /// The approved request this customer was created from.
    ///
    /// Unique per customer; the approval workflow uses it to detect an
    /// earlier (possibly interrupted) approval of the same request.
    pub request_id: RequestId,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    pub status: CustomerStatus,
    pub created_at: DateTime<Utc>,
}

impl Record for Customer {
    const TABLE: Table = Table::Customers;
}

/// Insert body for a new customer. `id` and `created_at` are generated by
/// the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewCustomer {
    pub request_id: RequestId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub status: CustomerStatus,
}

impl NewCustomer {
    /// Copy contact details from a request; new customers always start active.
    #[must_use]
    pub fn from_request(request: &SubscriptionRequest) -> Self {
        Self {
            request_id: request.id.clone(),
            name: request.name.clone(),
            email: request.email.clone(),
            phone: request.phone.clone(),
            address: request.address.clone(),
            status: CustomerStatus::Active,
        }
    }
}
