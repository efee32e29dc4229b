//! HTTP middleware and extractors for the back-office API.
//!
//! Request tracing and Sentry layers are installed in `main`; this module
//! holds the extractors that gate handlers on the desk session.

pub mod auth;

pub use auth::{RequireAdmin, RequireSession};
