//! Image Acquisition — one cover per session, through one of two exclusive paths.
//!
//! # Lock
//! `ImageLock` is the only owner of the cover slot:
//! `unstarted → in-flight(token) → finalized(result)`.
//! `started` and `finalized` are tracked separately: a failed acquisition clears
//! `started` so the session can retry, while `finalized` is only ever set by a
//! successful `finalize` and only cleared by `reset` (new session).
//!
//! Every check-then-write on the lock happens in one `&mut self` call, so with the lock
//! behind a mutex there is no window between "finalized already?" and the write.
//!
//! # Paths
//! - Path U (photo uploaded): compose → refine → on any refinement failure fall back
//!   to the unenhanced composite, stored via `ImageStore`.
//! - Path S (no photo): synthesize from an exact-count description.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cover::compositor::{compose_cover, CanvasSpec, CompositorError};
use crate::cover::prompts::build_synthesis_request;
use crate::cover::services::{
    ImageRefiner, ImageServiceError, ImageSynthesizer, RefinementOutcome, RefinementRequest,
};
use crate::cover::store::{ImageStore, StoreError};
use crate::story::catalog::Style;
use crate::story::models::{AnswerSet, UploadedImage};

// ────────────────────────────────────────────────────────────────────────────
// Types
// ────────────────────────────────────────────────────────────────────────────

/// Identifies the authoritative in-flight acquisition. Strictly increasing per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AcquisitionToken(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageOrigin {
    Uploaded,
    Synthesized,
}

/// The finalized cover. Immutable once written until the session is reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAcquisitionResult {
    pub reference: String,
    pub origin: ImageOrigin,
    pub style: Style,
    /// Path U only: whether the refinement service produced the reference.
    pub enhanced: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub enum AcquisitionState {
    Unstarted,
    InFlight(AcquisitionToken),
    Finalized(ImageAcquisitionResult),
}

/// Why a completed acquisition was not written. Logged, never surfaced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FinalizeRejection {
    #[error("stale response (token {token:?}, current {current:?})")]
    Stale {
        token: AcquisitionToken,
        current: AcquisitionToken,
    },

    #[error("cover already finalized")]
    LockConflict,
}

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("no illustration style selected")]
    NoStyle,

    #[error("could not compose uploaded photo: {0}")]
    Compositor(#[from] CompositorError),

    #[error("image service failed: {0}")]
    Service(#[from] ImageServiceError),

    #[error("could not store cover: {0}")]
    Store(#[from] StoreError),

    #[error("compositing task failed: {0}")]
    Task(String),
}

// ────────────────────────────────────────────────────────────────────────────
// Single-shot lock
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct ImageLock {
    started: bool,
    current: u64,
    finalized: Option<ImageAcquisitionResult>,
}

impl ImageLock {
    #[cfg(test)]
    pub fn state(&self) -> AcquisitionState {
        match (&self.finalized, self.started) {
            (Some(result), _) => AcquisitionState::Finalized(result.clone()),
            (None, true) => AcquisitionState::InFlight(AcquisitionToken(self.current)),
            (None, false) => AcquisitionState::Unstarted,
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn finalized(&self) -> Option<&ImageAcquisitionResult> {
        self.finalized.as_ref()
    }

    pub fn current_token(&self) -> AcquisitionToken {
        AcquisitionToken(self.current)
    }

    /// Checked-and-set start. Returns a fresh token only for the first caller since the
    /// last reset or failure; `None` if already started or finalized.
    pub fn try_begin(&mut self) -> Option<AcquisitionToken> {
        if self.started || self.finalized.is_some() {
            return None;
        }
        self.started = true;
        self.current += 1;
        Some(AcquisitionToken(self.current))
    }

    /// True while `token` may still write.
    pub fn is_current(&self, token: AcquisitionToken) -> bool {
        self.finalized.is_none() && token.0 == self.current
    }

    /// The single write path for the cover slot.
    pub fn finalize(
        &mut self,
        token: AcquisitionToken,
        result: ImageAcquisitionResult,
    ) -> Result<(), FinalizeRejection> {
        if self.finalized.is_some() {
            return Err(FinalizeRejection::LockConflict);
        }
        if token.0 != self.current {
            return Err(FinalizeRejection::Stale {
                token,
                current: AcquisitionToken(self.current),
            });
        }
        self.finalized = Some(result);
        Ok(())
    }

    /// Failure path: clears `started` for the current token so a later trigger can
    /// retry. Returns false (and changes nothing) for stale tokens.
    pub fn abort(&mut self, token: AcquisitionToken) -> bool {
        if !self.is_current(token) {
            return false;
        }
        self.started = false;
        true
    }

    /// Adopts a result persisted by an earlier lifecycle. No image logic runs after this.
    pub fn restore(&mut self, result: ImageAcquisitionResult) {
        self.started = true;
        self.finalized = Some(result);
    }

    /// New session: empties the slot and advances the token so anything still in flight
    /// is stale when it returns.
    pub fn reset(&mut self) {
        self.started = false;
        self.finalized = None;
        self.current += 1;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Paths
// ────────────────────────────────────────────────────────────────────────────

/// The collaborators an acquisition needs. Cloned into each session.
#[derive(Clone)]
pub struct CoverSources {
    pub synthesizer: Arc<dyn ImageSynthesizer>,
    pub refiner: Arc<dyn ImageRefiner>,
    pub store: Arc<dyn ImageStore>,
    pub canvas: CanvasSpec,
}

/// Runs Path U or Path S. Does not touch the lock; the caller finalizes.
pub async fn acquire_cover(
    sources: &CoverSources,
    session_id: &str,
    answers: &AnswerSet,
) -> Result<ImageAcquisitionResult, AcquisitionError> {
    let style = answers.primary_style().ok_or(AcquisitionError::NoStyle)?;

    match &answers.uploaded_image {
        Some(upload) => acquire_uploaded(sources, session_id, answers, upload, style).await,
        None => acquire_synthesized(sources, answers, style).await,
    }
}

async fn acquire_uploaded(
    sources: &CoverSources,
    session_id: &str,
    answers: &AnswerSet,
    upload: &UploadedImage,
    style: Style,
) -> Result<ImageAcquisitionResult, AcquisitionError> {
    info!(session = session_id, "Cover: composing uploaded photo");

    let bytes = upload.bytes.clone();
    let canvas = sources.canvas;
    let composed = tokio::task::spawn_blocking(move || compose_cover(&bytes, canvas))
        .await
        .map_err(|e| AcquisitionError::Task(e.to_string()))??;
    let placement = &composed.placement;
    debug!(
        session = session_id,
        source = ?placement.source,
        dest = ?placement.dest,
        scale = placement.scale,
        "Cover: photo placed on canvas"
    );

    let request = RefinementRequest {
        image_asset: STANDARD.encode(&composed.png),
        style_name: style.name().to_string(),
        children_meta: answers.children.clone(),
    };

    match sources.refiner.refine(&request).await {
        Ok(RefinementOutcome::Refined { reference }) => {
            info!(session = session_id, "Cover: refinement succeeded");
            return Ok(ImageAcquisitionResult {
                reference,
                origin: ImageOrigin::Uploaded,
                style,
                enhanced: true,
                created_at: Utc::now(),
            });
        }
        Ok(RefinementOutcome::NotAvailable) => {
            info!(session = session_id, "Cover: refinement not available, using composite");
        }
        Err(e) => {
            warn!(session = session_id, "Cover: refinement failed, using composite: {e}");
        }
    }

    let reference = sources.store.put_cover(session_id, composed.png).await?;
    Ok(ImageAcquisitionResult {
        reference,
        origin: ImageOrigin::Uploaded,
        style,
        enhanced: false,
        created_at: Utc::now(),
    })
}

async fn acquire_synthesized(
    sources: &CoverSources,
    answers: &AnswerSet,
    style: Style,
) -> Result<ImageAcquisitionResult, AcquisitionError> {
    let request = build_synthesis_request(answers, style);
    info!(
        style = %request.style_name,
        "Cover: synthesizing ({})",
        request.child_count_description
    );

    let reference = sources.synthesizer.synthesize(&request).await?;
    Ok(ImageAcquisitionResult {
        reference,
        origin: ImageOrigin::Synthesized,
        style,
        enhanced: false,
        created_at: Utc::now(),
    })
}
