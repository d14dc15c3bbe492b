//! Session Orchestrator — sequences narrative acquisition then cover acquisition for one
//! browsing session, and stays idempotent under re-entrant triggers.
//!
//! Flow per `run`:
//! 1. restore a cover persisted by an earlier lifecycle (locks the image step for good)
//! 2. narrative acquisition, at most one call sequence per session
//! 3. image gate: images requested AND a style chosen AND the lock lets us begin
//! 4. acquire, then finalize under the captured token, then persist
//!
//! State lives in a `std::sync::Mutex`. The guard is never held across `.await`; every
//! check-then-write is a single critical section. `epoch` advances on "new session" so
//! continuations started before the reset are dropped when they return.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cover::{
    acquire_cover, AcquisitionToken, CoverSources, ImageAcquisitionResult, ImageLock,
};
use crate::errors::AppError;
use crate::session::cache::{
    clear_session, load_answers, load_cover, store_answers, store_cover, CacheKey, SessionCache,
};
use crate::story::models::{AnswerSet, Narrative, Verdict};
use crate::story::narrative::{acquire_narrative, NarrativeReport, NarrativeService};

/// Writes of the finalized cover to the session cache, first try included.
const COVER_PERSIST_ATTEMPTS: u32 = 2;

// ────────────────────────────────────────────────────────────────────────────
// Phases exposed to the presentation layer
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NarrativePhase {
    #[default]
    Pending,
    Ready,
    Error { message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImagePhase {
    #[default]
    Pending,
    Ready,
    Error { message: String },
    NotRequested,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub submitted: bool,
    pub narrative: NarrativePhase,
    pub image: ImagePhase,
    pub story: Option<Narrative>,
    pub verdict: Option<Verdict>,
    pub attempts: usize,
    pub cover: Option<ImageAcquisitionResult>,
}

impl SessionSnapshot {
    /// What a session nobody has submitted to looks like.
    pub fn unsubmitted(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            submitted: false,
            narrative: NarrativePhase::Pending,
            image: ImagePhase::Pending,
            story: None,
            verdict: None,
            attempts: 0,
            cover: None,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Session state
// ────────────────────────────────────────────────────────────────────────────

/// Shared collaborators, one set for the whole process.
#[derive(Clone)]
pub struct SessionDeps {
    pub narrative: Arc<dyn NarrativeService>,
    pub cache: Arc<dyn SessionCache>,
    pub cover: CoverSources,
}

#[derive(Default)]
struct SessionState {
    epoch: u64,
    answers: Option<AnswerSet>,
    narrative_started: bool,
    narrative_phase: NarrativePhase,
    report: Option<NarrativeReport>,
    image_phase: ImagePhase,
    lock: ImageLock,
}

enum NarrativeStep {
    Run,
    InFlight,
    Done,
    Failed,
}

pub struct SessionOrchestrator {
    session_id: String,
    deps: SessionDeps,
    state: Mutex<SessionState>,
}

impl SessionOrchestrator {
    pub fn new(session_id: impl Into<String>, deps: SessionDeps) -> Self {
        Self {
            session_id: session_id.into(),
            deps,
            state: Mutex::new(SessionState::default()),
        }
    }

    #[cfg(test)]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        // A panic elsewhere must not wedge the session; the state stays usable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ── commands ───────────────────────────────────────────────────────────

    /// Validates and records the Answer Set. Returns the answers the session will run
    /// with: once submitted, an Answer Set is read-only until a new session starts.
    ///
    /// The slot is claimed before the cache write, so an overlapping submit adopts the
    /// same answers instead of racing the write.
    pub async fn submit(&self, answers: AnswerSet) -> Result<AnswerSet, AppError> {
        answers.validate()?;

        let epoch = {
            let mut st = self.state();
            if let Some(existing) = st.answers.clone() {
                if existing != answers {
                    warn!(
                        session = %self.session_id,
                        "Ignoring resubmission with different answers"
                    );
                }
                return Ok(existing);
            }
            st.answers = Some(answers.clone());
            if !answers.wants_cover() && st.lock.finalized().is_none() {
                st.image_phase = ImagePhase::NotRequested;
            }
            st.epoch
        };

        let stored = store_answers(self.deps.cache.as_ref(), &self.session_id, &answers).await;

        let stale_write = {
            let mut st = self.state();
            if st.epoch == epoch {
                if let Err(e) = stored {
                    // Release the slot unless a run already picked these answers up.
                    if !st.narrative_started && !st.lock.is_started() {
                        st.answers = None;
                        if st.image_phase == ImagePhase::NotRequested {
                            st.image_phase = ImagePhase::Pending;
                        }
                    }
                    return Err(e.into());
                }
                None
            } else {
                // Reset meanwhile. The cleared cache may now hold our write again.
                Some(stored.is_ok() && st.answers.is_none())
            }
        };

        if let Some(remove_write) = stale_write {
            debug!(session = %self.session_id, "Session reset during submit");
            if remove_write {
                if let Err(e) = self
                    .deps
                    .cache
                    .remove(&self.session_id, CacheKey::AnswerSet)
                    .await
                {
                    warn!(session = %self.session_id, "Could not remove stale answers: {e}");
                }
            }
            return Err(AppError::Validation(
                "The session was reset while the answers were being saved".to_string(),
            ));
        }

        info!(
            session = %self.session_id,
            children = answers.children.len(),
            "Answer set submitted"
        );
        Ok(answers)
    }

    /// Re-entrant trigger (refresh, language switch). Falls back to the cached Answer
    /// Set when this process has not seen the session yet.
    pub async fn resume(&self) -> Result<AnswerSet, AppError> {
        if let Some(answers) = self.state().answers.clone() {
            return Ok(answers);
        }
        let cached = load_answers(self.deps.cache.as_ref(), &self.session_id)
            .await?
            .ok_or_else(|| {
                AppError::Validation("No answers submitted for this session".to_string())
            })?;
        self.submit(cached).await
    }

    /// Clears both cache keys and every in-memory flag. Anything in flight becomes stale.
    pub async fn new_session(&self) -> Result<(), AppError> {
        {
            let mut st = self.state();
            let epoch = st.epoch + 1;
            st.lock.reset();
            st.epoch = epoch;
            st.answers = None;
            st.narrative_started = false;
            st.narrative_phase = NarrativePhase::Pending;
            st.report = None;
            st.image_phase = ImagePhase::Pending;
        }
        clear_session(self.deps.cache.as_ref(), &self.session_id).await?;
        info!(session = %self.session_id, "New session started");
        Ok(())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let st = self.state();
        SessionSnapshot {
            session_id: self.session_id.clone(),
            submitted: st.answers.is_some(),
            narrative: st.narrative_phase.clone(),
            image: st.image_phase.clone(),
            story: st.report.as_ref().map(|r| r.narrative.clone()),
            verdict: st.report.as_ref().map(|r| r.verdict.clone()),
            attempts: st.report.as_ref().map(|r| r.attempts.len()).unwrap_or(0),
            cover: st.lock.finalized().cloned(),
        }
    }

    // ── lifecycle ──────────────────────────────────────────────────────────

    /// Drives the session as far as it can go. Safe to call any number of times.
    pub async fn run(self: Arc<Self>, answers: AnswerSet) {
        let epoch = self.state().epoch;

        self.restore_cover(epoch).await;

        match self.begin_narrative(epoch) {
            NarrativeStep::InFlight => {
                debug!(session = %self.session_id, "Narrative already in flight");
                return;
            }
            NarrativeStep::Run => {
                if !self.acquire_story(epoch, &answers).await {
                    return;
                }
            }
            NarrativeStep::Done => {}
            NarrativeStep::Failed => return,
        }

        self.maybe_acquire_cover(epoch, &answers).await;
    }

    /// A cover persisted by an earlier lifecycle wins over any new acquisition.
    async fn restore_cover(&self, epoch: u64) {
        if self.state().lock.is_started() {
            return;
        }
        let cached = match load_cover(self.deps.cache.as_ref(), &self.session_id).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(session = %self.session_id, "Could not read cached cover: {e}");
                return;
            }
        };
        let Some(cover) = cached else {
            return;
        };

        let mut st = self.state();
        if st.epoch != epoch || st.lock.is_started() {
            return;
        }
        info!(session = %self.session_id, "Restored cover from session cache");
        st.lock.restore(cover);
        st.image_phase = ImagePhase::Ready;
    }

    fn begin_narrative(&self, epoch: u64) -> NarrativeStep {
        let mut st = self.state();
        if st.epoch != epoch {
            return NarrativeStep::InFlight;
        }
        if st.narrative_started {
            return match st.narrative_phase {
                NarrativePhase::Pending => NarrativeStep::InFlight,
                NarrativePhase::Ready => NarrativeStep::Done,
                NarrativePhase::Error { .. } => NarrativeStep::Failed,
            };
        }
        st.narrative_started = true;
        st.narrative_phase = NarrativePhase::Pending;
        NarrativeStep::Run
    }

    /// Returns true when the cover step may follow: a narrative is ready and the session
    /// was not reset while it was being generated.
    async fn acquire_story(&self, epoch: u64, answers: &AnswerSet) -> bool {
        info!(session = %self.session_id, "Narrative acquisition started");
        let outcome = acquire_narrative(self.deps.narrative.as_ref(), answers).await;

        let mut st = self.state();
        if st.epoch != epoch {
            debug!(session = %self.session_id, "Discarding narrative from a previous session");
            return false;
        }
        match outcome {
            Ok(report) => {
                info!(
                    session = %self.session_id,
                    attempts = report.attempts.len(),
                    valid = report.verdict.valid,
                    "Narrative ready"
                );
                st.report = Some(report);
                st.narrative_phase = NarrativePhase::Ready;
            }
            Err(e) => {
                warn!(session = %self.session_id, "Narrative acquisition failed: {e}");
                st.narrative_phase = NarrativePhase::Error {
                    message: e.to_string(),
                };
                if st.image_phase == ImagePhase::Pending && !st.lock.is_started() {
                    st.image_phase = ImagePhase::Error {
                        message: "Cover skipped: the story could not be generated".to_string(),
                    };
                }
                return false;
            }
        }
        true
    }

    async fn maybe_acquire_cover(&self, epoch: u64, answers: &AnswerSet) {
        let token = {
            let mut st = self.state();
            if st.epoch != epoch {
                return;
            }
            if st.lock.finalized().is_some() {
                st.image_phase = ImagePhase::Ready;
                return;
            }
            if !answers.wants_cover() {
                st.image_phase = ImagePhase::NotRequested;
                return;
            }
            match st.lock.try_begin() {
                Some(token) => {
                    st.image_phase = ImagePhase::Pending;
                    token
                }
                None => {
                    debug!(session = %self.session_id, "Cover acquisition already started");
                    return;
                }
            }
        };

        info!(session = %self.session_id, token = token.0, "Cover acquisition started");
        let outcome = acquire_cover(&self.deps.cover, &self.session_id, answers).await;

        match outcome {
            Ok(result) => self.finalize_cover(token, result).await,
            Err(e) => {
                let mut st = self.state();
                if st.lock.abort(token) {
                    warn!(
                        session = %self.session_id,
                        token = token.0,
                        "Cover acquisition failed: {e}"
                    );
                    st.image_phase = ImagePhase::Error {
                        message: e.to_string(),
                    };
                } else {
                    debug!(
                        session = %self.session_id,
                        token = token.0,
                        "Ignoring failure of stale acquisition: {e}"
                    );
                }
            }
        }
    }

    async fn finalize_cover(&self, token: AcquisitionToken, result: ImageAcquisitionResult) {
        {
            let mut st = self.state();
            if let Err(rejection) = st.lock.finalize(token, result.clone()) {
                warn!(session = %self.session_id, token = token.0, "Discarding cover: {rejection}");
                return;
            }
            st.image_phase = ImagePhase::Ready;
        }
        info!(
            session = %self.session_id,
            token = token.0,
            origin = ?result.origin,
            "Cover finalized"
        );

        if !self.persist_cover(token, &result).await {
            return;
        }

        // A reset may have cleared the cache while we were writing to it.
        let still_current = self.state().lock.current_token() == token;
        if !still_current {
            debug!(session = %self.session_id, "Session reset during persist; removing cover");
            if let Err(e) = self
                .deps
                .cache
                .remove(&self.session_id, CacheKey::CoverImage)
                .await
            {
                warn!(session = %self.session_id, "Could not remove stale cover: {e}");
            }
        }
    }

    /// Writes the cover through to the session cache. Returns true once a write landed.
    /// Without it a restarted process would acquire a second cover for the session.
    async fn persist_cover(
        &self,
        token: AcquisitionToken,
        result: &ImageAcquisitionResult,
    ) -> bool {
        for attempt in 1..=COVER_PERSIST_ATTEMPTS {
            let outcome = store_cover(self.deps.cache.as_ref(), &self.session_id, result).await;
            let Err(e) = outcome else {
                return true;
            };
            if attempt == COVER_PERSIST_ATTEMPTS {
                warn!(
                    session = %self.session_id,
                    "Could not persist cover, it is held in memory only: {e}"
                );
                return false;
            }
            if self.state().lock.current_token() != token {
                return false;
            }
            warn!(session = %self.session_id, attempt, "Could not persist cover, retrying: {e}");
        }
        false
    }
}
