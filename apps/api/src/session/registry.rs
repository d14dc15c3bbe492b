use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::errors::AppError;
use crate::session::cache::clear_session;
use crate::session::orchestrator::{SessionDeps, SessionOrchestrator, SessionSnapshot};

const MAX_SESSION_ID_LEN: usize = 64;

struct Entry {
    orchestrator: Arc<SessionOrchestrator>,
    last_used: Instant,
}

/// Maps client-chosen session ids to their in-memory orchestrator.
///
/// Only submit and resume create entries. An entry nobody has touched for `idle_ttl`
/// and that no request or run still holds is dropped on the next insert; the session
/// cache keeps what a later resume needs.
pub struct SessionRegistry {
    deps: SessionDeps,
    idle_ttl: Duration,
    sessions: Mutex<HashMap<String, Entry>>,
}

impl SessionRegistry {
    pub fn new(deps: SessionDeps, idle_ttl: Duration) -> Self {
        Self {
            deps,
            idle_ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get_or_create(&self, session_id: &str) -> Result<Arc<SessionOrchestrator>, AppError> {
        validate_session_id(session_id)?;
        let mut sessions = self.sessions();
        let now = Instant::now();
        if !sessions.contains_key(session_id) {
            self.evict_idle(&mut sessions, now);
        }
        let entry = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Entry {
                orchestrator: Arc::new(SessionOrchestrator::new(session_id, self.deps.clone())),
                last_used: now,
            });
        entry.last_used = now;
        Ok(entry.orchestrator.clone())
    }

    /// Lookup without creating an entry.
    pub fn get(&self, session_id: &str) -> Result<Option<Arc<SessionOrchestrator>>, AppError> {
        validate_session_id(session_id)?;
        let mut sessions = self.sessions();
        Ok(sessions.get_mut(session_id).map(|entry| {
            entry.last_used = Instant::now();
            entry.orchestrator.clone()
        }))
    }

    /// The session's current snapshot; an unknown id reads as unsubmitted.
    pub fn snapshot(&self, session_id: &str) -> Result<SessionSnapshot, AppError> {
        Ok(match self.get(session_id)? {
            Some(orchestrator) => orchestrator.snapshot(),
            None => SessionSnapshot::unsubmitted(session_id),
        })
    }

    /// "Start new session": drops the entry and clears the session cache. Work still in
    /// flight on the dropped orchestrator is stale when it returns.
    pub async fn end_session(&self, session_id: &str) -> Result<(), AppError> {
        validate_session_id(session_id)?;
        let removed = self.sessions().remove(session_id);
        match removed {
            Some(entry) => entry.orchestrator.new_session().await,
            None => {
                clear_session(self.deps.cache.as_ref(), session_id).await?;
                Ok(())
            }
        }
    }

    /// Drops an entry created for a submit or resume that was rejected.
    pub fn release_unsubmitted(&self, session_id: &str) {
        let mut sessions = self.sessions();
        let unsubmitted = sessions
            .get(session_id)
            .is_some_and(|entry| !entry.orchestrator.snapshot().submitted);
        if unsubmitted {
            sessions.remove(session_id);
        }
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    fn evict_idle(&self, sessions: &mut HashMap<String, Entry>, now: Instant) {
        let before = sessions.len();
        sessions.retain(|_, entry| {
            Arc::strong_count(&entry.orchestrator) > 1
                || now.duration_since(entry.last_used) < self.idle_ttl
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, remaining = sessions.len(), "Evicted idle sessions");
        }
    }
}

/// Ids end up in cache keys and object keys, so only `[A-Za-z0-9_-]` is accepted.
pub fn validate_session_id(session_id: &str) -> Result<(), AppError> {
    let well_formed = !session_id.is_empty()
        && session_id.len() <= MAX_SESSION_ID_LEN
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if well_formed {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Session id must be 1-{MAX_SESSION_ID_LEN} characters of letters, digits, '-' or '_'"
        )))
    }
}
