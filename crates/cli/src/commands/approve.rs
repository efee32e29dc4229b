//! Request approval command.

use billing_desk_admin::session::{DeskSession, SessionError};
use billing_desk_core::RequestId;

use super::{CommandError, print_json};

/// Approve a pending request and print the resulting customer.
pub async fn approve(session: &DeskSession, id: String) -> Result<(), CommandError> {
    let id = RequestId::new(id);
    match session.approve(&id).await {
        Ok(approval) => {
            tracing::info!(customer_id = %approval.customer.id, "Request approved");
            print_json(&approval)
        }
        Err(SessionError::Approval(e)) if e.is_retryable() => {
            tracing::warn!("Approval of {id} did not complete; it is safe to run again");
            Err(SessionError::Approval(e).into())
        }
        Err(e) => Err(e.into()),
    }
}
