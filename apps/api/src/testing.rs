//! Fakes and fixtures shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use image::{ImageFormat, Rgb, RgbImage};

use crate::cover::acquisition::{ImageAcquisitionResult, ImageOrigin};
use crate::cover::services::{
    ImageRefiner, ImageServiceError, ImageSynthesizer, RefinementOutcome, RefinementRequest,
    SynthesisRequest,
};
use crate::cover::store::{cover_key, ImageStore, StoreError};
use crate::cover::{CanvasSpec, CoverSources};
use crate::session::cache::{storage_key, CacheError, CacheKey, SessionCache};
use crate::session::orchestrator::SessionDeps;
use crate::story::catalog::{Language, Style, Theme};
use crate::story::models::{AnswerSet, Child};
use crate::story::narrative::{NarrativeError, NarrativeRequest, NarrativeService};

// ────────────────────────────────────────────────────────────────────────────
// Fixtures
// ────────────────────────────────────────────────────────────────────────────

/// Mia (6) and Leo (4), dragons, cartoon, images on, no photo.
pub fn sample_answers() -> AnswerSet {
    AnswerSet {
        children: vec![
            Child { name: "Mia".to_string(), age: 6 },
            Child { name: "Leo".to_string(), age: 4 },
        ],
        themes: vec![Theme::Dragons],
        length_minutes: 5,
        styles: vec![Style::Cartoon],
        characters: Vec::new(),
        include_images: true,
        uploaded_image: None,
        language: Language::En,
    }
}

/// A one-section story payload as the narrative service would return it.
pub fn story_json(title: &str, body: &str) -> String {
    serde_json::json!({
        "title": title,
        "sections": [{ "headline": "Chapter One", "body": body }]
    })
    .to_string()
}

/// Collaborators that always succeed: a valid Mia/Leo dragon story and a synthesized cover.
pub fn stub_deps() -> SessionDeps {
    SessionDeps {
        narrative: Arc::new(ScriptedNarrativeService::repeating(story_json(
            "The Dragon Egg",
            "Mia climbed the hill while Leo laughed at the tiny dragon.",
        ))),
        cache: Arc::new(InMemorySessionCache::new()),
        cover: CoverSources {
            synthesizer: Arc::new(StubSynthesizer::ok("https://img/synth.png")),
            refiner: Arc::new(ScriptedRefiner::not_available()),
            store: Arc::new(MemoryImageStore::default()),
            canvas: CanvasSpec { width: 160, height: 100, zoom: 1.2 },
        },
    }
}

pub fn sample_result(reference: &str) -> ImageAcquisitionResult {
    ImageAcquisitionResult {
        reference: reference.to_string(),
        origin: ImageOrigin::Synthesized,
        style: Style::Cartoon,
        enhanced: false,
        created_at: Utc::now(),
    }
}

pub fn solid_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([200, 120, 40]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .expect("encode test png");
    out.into_inner()
}

// ────────────────────────────────────────────────────────────────────────────
// Narrative service
// ────────────────────────────────────────────────────────────────────────────

/// Replays scripted responses in order; transport error once the script runs out.
pub struct ScriptedNarrativeService {
    script: Mutex<VecDeque<Result<String, NarrativeError>>>,
    fallback: Option<String>,
    requests: Mutex<Vec<NarrativeRequest>>,
    delay: Option<Duration>,
}

impl ScriptedNarrativeService {
    pub fn new(script: Vec<Result<String, NarrativeError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Answers every call with the same payload.
    pub fn repeating(payload: String) -> Self {
        Self {
            fallback: Some(payload),
            ..Self::new(Vec::new())
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<NarrativeRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl NarrativeService for ScriptedNarrativeService {
    async fn generate(&self, request: &NarrativeRequest) -> Result<String, NarrativeError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        match (next, &self.fallback) {
            (Some(response), _) => response,
            (None, Some(payload)) => Ok(payload.clone()),
            (None, None) => Err(NarrativeError::Transport("script exhausted".to_string())),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Image services
// ────────────────────────────────────────────────────────────────────────────

pub struct StubSynthesizer {
    reference: String,
    failures_left: Mutex<usize>,
    requests: Mutex<Vec<SynthesisRequest>>,
    delay: Option<Duration>,
}

impl StubSynthesizer {
    pub fn ok(reference: &str) -> Self {
        Self::failing_then_ok(0, reference)
    }

    /// Fails the first `failures` calls with a 500, then succeeds.
    pub fn failing_then_ok(failures: usize, reference: &str) -> Self {
        Self {
            reference: reference.to_string(),
            failures_left: Mutex::new(failures),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<SynthesisRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ImageSynthesizer for StubSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<String, ImageServiceError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let fail = {
            let mut left = self.failures_left.lock().unwrap();
            let fail = *left > 0;
            *left = left.saturating_sub(1);
            fail
        };
        if fail {
            return Err(ImageServiceError::Api {
                status: 500,
                message: "synthesis unavailable".to_string(),
            });
        }
        Ok(self.reference.clone())
    }
}

enum RefinerMode {
    Refined(String),
    Failing,
    NotAvailable,
}

pub struct ScriptedRefiner {
    mode: RefinerMode,
    calls: Mutex<usize>,
}

impl ScriptedRefiner {
    fn with_mode(mode: RefinerMode) -> Self {
        Self { mode, calls: Mutex::new(0) }
    }

    pub fn refined(reference: &str) -> Self {
        Self::with_mode(RefinerMode::Refined(reference.to_string()))
    }

    pub fn failing() -> Self {
        Self::with_mode(RefinerMode::Failing)
    }

    pub fn not_available() -> Self {
        Self::with_mode(RefinerMode::NotAvailable)
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ImageRefiner for ScriptedRefiner {
    async fn refine(
        &self,
        _request: &RefinementRequest,
    ) -> Result<RefinementOutcome, ImageServiceError> {
        *self.calls.lock().unwrap() += 1;
        match &self.mode {
            RefinerMode::Refined(reference) => Ok(RefinementOutcome::Refined {
                reference: reference.clone(),
            }),
            RefinerMode::Failing => Err(ImageServiceError::Api {
                status: 502,
                message: "bad gateway".to_string(),
            }),
            RefinerMode::NotAvailable => Ok(RefinementOutcome::NotAvailable),
        }
    }
}

/// Keeps stored covers in memory; references look like `memory://covers/<session>/<id>.png`.
#[derive(Default)]
pub struct MemoryImageStore {
    objects: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemoryImageStore {
    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().last().map(|(_, png)| png.clone())
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn put_cover(&self, session_id: &str, png: Vec<u8>) -> Result<String, StoreError> {
        let key = cover_key(session_id);
        self.objects.lock().unwrap().push((key.clone(), png));
        Ok(format!("memory://{key}"))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Session cache
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemorySessionCache {
    entries: Mutex<HashMap<String, String>>,
}

impl InMemorySessionCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionCache for InMemorySessionCache {
    async fn get(&self, session_id: &str, key: CacheKey) -> Result<Option<String>, CacheError> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.get(&storage_key(session_id, key)).cloned())
    }

    async fn set(&self, session_id: &str, key: CacheKey, value: String) -> Result<(), CacheError> {
        self.entries
            .lock()
            .unwrap()
            .insert(storage_key(session_id, key), value);
        Ok(())
    }

    async fn remove(&self, session_id: &str, key: CacheKey) -> Result<(), CacheError> {
        self.entries
            .lock()
            .unwrap()
            .remove(&storage_key(session_id, key));
        Ok(())
    }
}

/// In-memory cache whose writes to one key can be delayed or fail a number of times.
pub struct FlakyCache {
    inner: InMemorySessionCache,
    key: CacheKey,
    delay: Duration,
    slow_writes_left: Mutex<usize>,
    failures_left: Mutex<usize>,
    writes: Mutex<usize>,
}

impl FlakyCache {
    fn new(key: CacheKey) -> Self {
        Self {
            inner: InMemorySessionCache::new(),
            key,
            delay: Duration::ZERO,
            slow_writes_left: Mutex::new(0),
            failures_left: Mutex::new(0),
            writes: Mutex::new(0),
        }
    }

    /// The first `count` writes to `key` sleep for `delay` before landing.
    pub fn slow_writes(key: CacheKey, delay: Duration, count: usize) -> Self {
        Self {
            delay,
            slow_writes_left: Mutex::new(count),
            ..Self::new(key)
        }
    }

    /// The first `count` writes to `key` fail with a connection error.
    pub fn failing_writes(key: CacheKey, count: usize) -> Self {
        Self {
            failures_left: Mutex::new(count),
            ..Self::new(key)
        }
    }

    /// Write attempts to the scripted key, failed ones included.
    pub fn writes(&self) -> usize {
        *self.writes.lock().unwrap()
    }
}

fn take_one(counter: &Mutex<usize>) -> bool {
    let mut left = counter.lock().unwrap();
    let taken = *left > 0;
    *left = left.saturating_sub(1);
    taken
}

#[async_trait]
impl SessionCache for FlakyCache {
    async fn get(&self, session_id: &str, key: CacheKey) -> Result<Option<String>, CacheError> {
        self.inner.get(session_id, key).await
    }

    async fn set(&self, session_id: &str, key: CacheKey, value: String) -> Result<(), CacheError> {
        if key == self.key {
            *self.writes.lock().unwrap() += 1;
            if take_one(&self.slow_writes_left) {
                tokio::time::sleep(self.delay).await;
            }
            if take_one(&self.failures_left) {
                return Err(CacheError::Redis(redis::RedisError::from((
                    redis::ErrorKind::IoError,
                    "connection reset",
                ))));
            }
        }
        self.inner.set(session_id, key, value).await
    }

    async fn remove(&self, session_id: &str, key: CacheKey) -> Result<(), CacheError> {
        self.inner.remove(session_id, key).await
    }
}
