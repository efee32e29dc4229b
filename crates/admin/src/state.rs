//! Application state shared across handlers.

use std::sync::Arc;

use crate::backend::Backend;
use crate::session::DeskSession;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    backend: Arc<dyn Backend>,
    session: Option<Arc<DeskSession>>,
}

impl AppState {
    /// Build state around the service session.
    ///
    /// `session` is `None` when the server could not authenticate; API
    /// routes then answer 401.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, session: Option<DeskSession>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                backend,
                session: session.map(Arc::new),
            }),
        }
    }

    /// Get the backend handle.
    #[must_use]
    pub fn backend(&self) -> &dyn Backend {
        self.inner.backend.as_ref()
    }

    /// Get the desk session, if one was established.
    #[must_use]
    pub fn session(&self) -> Option<Arc<DeskSession>> {
        self.inner.session.clone()
    }
}
