//! Invoices issued by the billing process. Read-only here.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use billing_desk_core::{Amount, CustomerId, InvoiceId, InvoiceStatus};

use crate::backend::{Embed, Record, Table};

/// Contact fields of the billed customer, embedded into invoice rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerContact {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

/// An invoice and (when embedded) who it bills.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub customer_id: CustomerId,
    pub amount: Amount,
    pub due_date: NaiveDate,
    pub status: InvoiceStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, rename = "customers")]
    pub customer: Option<CustomerContact>,
}

impl Invoice {
    /// Embed that pulls [`CustomerContact`] into each selected invoice.
    pub const CUSTOMER_EMBED: Embed = Embed {
        table: Table::Customers,
        foreign_key: "customer_id",
        columns: &["name", "email", "phone"],
    };

    /// Whether the invoice is still awaiting payment.
    #[must_use]
    pub const fn is_due(&self) -> bool {
        matches!(self.status, InvoiceStatus::Pending)
    }
}

impl Record for Invoice {
    const TABLE: Table = Table::Invoices;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_decodes_embedded_customer() {
        let invoice: Invoice = serde_json::from_value(json!({
            "id": "i1",
            "customer_id": "c1",
            "amount": 499.0,
            "due_date": "2024-04-30",
            "status": "pending",
            "created_at": "2024-04-01T10:00:00+00:00",
            "customers": {"name": "Jane Doe", "email": "jane@x.com", "phone": "555-1000"}
        }))
        .unwrap();

        assert!(invoice.is_due());
        assert_eq!(invoice.amount.to_string(), "499.00");
        assert_eq!(invoice.customer.unwrap().name, "Jane Doe");
    }

    #[test]
    fn test_embed_is_optional() {
        let invoice: Invoice = serde_json::from_value(json!({
            "id": "i2",
            "customer_id": "c1",
            "amount": "10.50",
            "due_date": "2024-05-31",
            "status": "paid",
            "created_at": "2024-05-01T10:00:00Z",
            "customers": null
        }))
        .unwrap();

        assert!(!invoice.is_due());
        assert!(invoice.customer.is_none());
    }
}
