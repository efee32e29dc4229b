//! CLI command implementations.
//!
//! # Environment Variables
//!
//! - `DESK_BACKEND_URL` - Managed backend base URL
//! - `DESK_BACKEND_API_KEY` - Backend project API key
//! - `DESK_ADMIN_EMAIL` / `DESK_ADMIN_PASSWORD` - Staff credentials

pub mod approve;
pub mod identity;
pub mod records;

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use billing_desk_admin::backend::{BackendError, RestBackend};
use billing_desk_admin::config::{ConfigError, DeskConfig};
use billing_desk_admin::session::{DeskSession, SessionError};

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The backend client could not be built.
    #[error("Backend client error: {0}")]
    Client(#[from] BackendError),

    /// A session operation failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Output could not be serialized.
    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),
}

/// Load configuration, sign in and return the session.
pub async fn open_session() -> Result<DeskSession, CommandError> {
    let config = DeskConfig::from_env()?;
    let staff = config.require_staff()?;
    let backend = Arc::new(RestBackend::new(&config.backend)?);

    tracing::info!(email = %staff.email, "Signing in");
    Ok(DeskSession::sign_in(backend, &staff.email, &staff.password).await?)
}

/// Print `value` as pretty JSON on stdout.
#[allow(clippy::print_stdout)]
pub fn print_json<T: Serialize>(value: &T) -> Result<(), CommandError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
