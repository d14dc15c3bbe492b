// Session lifecycle: the per-session orchestrator, the registry that owns one per
// session id, the session cache that outlives UI re-renders, and the HTTP handlers.
// Runs are spawned from handlers and never block a request.

pub mod cache;
pub mod handlers;
pub mod orchestrator;
pub mod registry;
