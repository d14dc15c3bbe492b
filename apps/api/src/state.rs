use std::sync::Arc;

use crate::session::registry::SessionRegistry;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// One orchestrator per session id; collaborators (narrative service, image
    /// services, store, cache) are wired into the registry at startup.
    pub sessions: Arc<SessionRegistry>,
}
