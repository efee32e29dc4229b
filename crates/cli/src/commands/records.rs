//! Listing and dashboard commands.

use billing_desk_admin::session::{DeskSession, SessionError};

use super::{CommandError, print_json};

/// Print subscription requests; pending only unless `all` is set.
pub async fn requests(session: &DeskSession, all: bool) -> Result<(), CommandError> {
    let store = session.requests();
    store.fetch().await.map_err(SessionError::from)?;
    if all {
        print_json(&store.snapshot().await)
    } else {
        print_json(&store.pending().await)
    }
}

/// Print customers, newest first.
pub async fn customers(session: &DeskSession) -> Result<(), CommandError> {
    session
        .customers()
        .fetch()
        .await
        .map_err(SessionError::from)?;
    print_json(&session.customers().snapshot().await)
}

/// Print invoices, latest due date first.
pub async fn invoices(session: &DeskSession) -> Result<(), CommandError> {
    session
        .invoices()
        .fetch()
        .await
        .map_err(SessionError::from)?;
    print_json(&session.invoices().snapshot().await)
}

/// Print the dashboard figures after loading every projection.
pub async fn dashboard(session: &DeskSession) -> Result<(), CommandError> {
    session.refresh_all().await?;
    print_json(&session.dashboard().await)
}
