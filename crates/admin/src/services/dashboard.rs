//! Dashboard figures computed from the loaded projections.

use serde::Serialize;

use billing_desk_core::{Amount, CustomerStatus};

use crate::models::{Customer, Invoice, SubscriptionRequest};

/// How many upcoming dues the dashboard lists.
pub const UPCOMING_DUES_LIMIT: usize = 5;

/// Headline numbers for the back-office landing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardSummary {
    /// Sum of every invoice amount, paid or not.
    pub total_revenue: Amount,
    pub pending_invoices: usize,
    pub active_customers: usize,
    pub pending_requests: usize,
    /// Unpaid invoices, earliest due date first.
    pub upcoming_dues: Vec<Invoice>,
}

impl DashboardSummary {
    /// Compute the summary from current snapshots.
    #[must_use]
    pub fn compute(
        invoices: &[Invoice],
        customers: &[Customer],
        requests: &[SubscriptionRequest],
    ) -> Self {
        let mut upcoming_dues: Vec<Invoice> =
            invoices.iter().filter(|i| i.is_due()).cloned().collect();
        upcoming_dues.sort_by_key(|i| i.due_date);
        let pending_invoices = upcoming_dues.len();
        upcoming_dues.truncate(UPCOMING_DUES_LIMIT);

        Self {
            total_revenue: invoices.iter().map(|i| i.amount).sum(),
            pending_invoices,
            active_customers: customers
                .iter()
                .filter(|c| c.status == CustomerStatus::Active)
                .count(),
            pending_requests: requests.iter().filter(|r| r.status.is_pending()).count(),
            upcoming_dues,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use billing_desk_core::{CustomerId, InvoiceId, InvoiceStatus};

    use super::*;

    fn invoice(id: &str, minor: i64, due: (i32, u32, u32), status: InvoiceStatus) -> Invoice {
        Invoice {
            id: InvoiceId::new(id),
            customer_id: CustomerId::new("c1"),
            amount: Amount::from_minor(minor),
            due_date: NaiveDate::from_ymd_opt(due.0, due.1, due.2).unwrap(),
            status,
            created_at: Utc::now(),
            customer: None,
        }
    }

    #[test]
    fn test_empty() {
        let summary = DashboardSummary::compute(&[], &[], &[]);
        assert_eq!(summary.total_revenue, Amount::ZERO);
        assert_eq!(summary.pending_invoices, 0);
        assert!(summary.upcoming_dues.is_empty());
    }

    #[test]
    fn test_revenue_and_upcoming_dues() {
        let mut invoices = vec![invoice("paid", 10_000, (2024, 1, 1), InvoiceStatus::Paid)];
        for day in (1..=7).rev() {
            invoices.push(invoice(
                &format!("i{day}"),
                1_050,
                (2024, 6, day),
                InvoiceStatus::Pending,
            ));
        }

        let summary = DashboardSummary::compute(&invoices, &[], &[]);
        assert_eq!(summary.total_revenue.to_string(), "173.50");
        assert_eq!(summary.pending_invoices, 7);

        let ids: Vec<_> = summary.upcoming_dues.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["i1", "i2", "i3", "i4", "i5"]);
    }
}
