//! Session Cache — per-browsing-session key/value store that outlives UI re-renders.
//!
//! Two logical keys per session: the submitted Answer Set and the finalized cover.
//! Production uses Redis with a sliding TTL standing in for the browsing session's
//! lifetime.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use thiserror::Error;
use tracing::warn;

use crate::cover::ImageAcquisitionResult;
use crate::story::models::AnswerSet;

const KEY_PREFIX: &str = "storyweaver:session";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    AnswerSet,
    CoverImage,
}

impl CacheKey {
    fn suffix(&self) -> &'static str {
        match self {
            CacheKey::AnswerSet => "answers",
            CacheKey::CoverImage => "cover",
        }
    }
}

pub fn storage_key(session_id: &str, key: CacheKey) -> String {
    format!("{KEY_PREFIX}:{session_id}:{}", key.suffix())
}

#[async_trait]
pub trait SessionCache: Send + Sync {
    async fn get(&self, session_id: &str, key: CacheKey) -> Result<Option<String>, CacheError>;
    async fn set(&self, session_id: &str, key: CacheKey, value: String) -> Result<(), CacheError>;
    async fn remove(&self, session_id: &str, key: CacheKey) -> Result<(), CacheError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Typed helpers
// ────────────────────────────────────────────────────────────────────────────

pub async fn load_answers(
    cache: &dyn SessionCache,
    session_id: &str,
) -> Result<Option<AnswerSet>, CacheError> {
    load_json(cache, session_id, CacheKey::AnswerSet).await
}

pub async fn store_answers(
    cache: &dyn SessionCache,
    session_id: &str,
    answers: &AnswerSet,
) -> Result<(), CacheError> {
    let value = serde_json::to_string(answers)?;
    cache.set(session_id, CacheKey::AnswerSet, value).await
}

pub async fn load_cover(
    cache: &dyn SessionCache,
    session_id: &str,
) -> Result<Option<ImageAcquisitionResult>, CacheError> {
    load_json(cache, session_id, CacheKey::CoverImage).await
}

pub async fn store_cover(
    cache: &dyn SessionCache,
    session_id: &str,
    cover: &ImageAcquisitionResult,
) -> Result<(), CacheError> {
    let value = serde_json::to_string(cover)?;
    cache.set(session_id, CacheKey::CoverImage, value).await
}

/// Removes both keys. Used by "start new session".
pub async fn clear_session(cache: &dyn SessionCache, session_id: &str) -> Result<(), CacheError> {
    cache.remove(session_id, CacheKey::AnswerSet).await?;
    cache.remove(session_id, CacheKey::CoverImage).await
}

/// A value that no longer decodes (e.g. written by an older build) is treated as absent.
async fn load_json<T: serde::de::DeserializeOwned>(
    cache: &dyn SessionCache,
    session_id: &str,
    key: CacheKey,
) -> Result<Option<T>, CacheError> {
    let Some(raw) = cache.get(session_id, key).await? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!(session = session_id, "Discarding undecodable cache entry {key:?}: {e}");
            cache.remove(session_id, key).await?;
            Ok(None)
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Redis
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct RedisSessionCache {
    client: redis::Client,
    ttl_secs: u64,
}

impl RedisSessionCache {
    pub fn new(client: redis::Client, ttl_secs: u64) -> Self {
        Self { client, ttl_secs }
    }

    async fn connection(&self) -> Result<MultiplexedConnection, CacheError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl SessionCache for RedisSessionCache {
    async fn get(&self, session_id: &str, key: CacheKey) -> Result<Option<String>, CacheError> {
        let mut con = self.connection().await?;
        let k = storage_key(session_id, key);
        let value: Option<String> = con.get(&k).await?;
        if value.is_some() {
            // Sliding expiry: an active session keeps its entries alive.
            let _: bool = con.expire(&k, self.ttl_secs as i64).await?;
        }
        Ok(value)
    }

    async fn set(&self, session_id: &str, key: CacheKey, value: String) -> Result<(), CacheError> {
        let mut con = self.connection().await?;
        let _: () = con
            .set_ex(storage_key(session_id, key), value, self.ttl_secs)
            .await?;
        Ok(())
    }

    async fn remove(&self, session_id: &str, key: CacheKey) -> Result<(), CacheError> {
        let mut con = self.connection().await?;
        let _: () = con.del(storage_key(session_id, key)).await?;
        Ok(())
    }
}
