//! Application state shared across handlers.

use std::sync::Arc;

use crate::services::Services;

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    services: Services,
}

impl AppState {
    #[must_use]
    pub fn new(services: Services) -> Self {
        Self {
            inner: Arc::new(AppStateInner { services }),
        }
    }

    /// Get a reference to the wired services.
    #[must_use]
    pub fn services(&self) -> &Services {
        &self.inner.services
    }
}
