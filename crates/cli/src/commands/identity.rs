//! Staff identity commands.

use billing_desk_admin::session::DeskSession;

use super::{CommandError, print_json};

/// Print the signed-in staff member and role.
pub fn whoami(session: &DeskSession) -> Result<(), CommandError> {
    print_json(session.current_admin())
}

/// Print every staff role record (admin only).
pub async fn admins(session: &DeskSession) -> Result<(), CommandError> {
    print_json(&session.admin_users().await?)
}
