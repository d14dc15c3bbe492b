use std::str::FromStr;

use anyhow::{Context, Result};

use crate::cover::CanvasSpec;

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic_api_key: String,
    pub image_service_url: String,
    pub image_service_api_key: String,
    pub redis_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub port: u16,
    pub rust_log: String,
    /// Sliding expiry of session cache entries.
    pub session_ttl_secs: u64,
    pub cover_canvas: CanvasSpec,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = CanvasSpec::default();
        let cover_canvas = CanvasSpec {
            width: optional_env("COVER_WIDTH", defaults.width)?,
            height: optional_env("COVER_HEIGHT", defaults.height)?,
            zoom: optional_env("COVER_ZOOM", defaults.zoom)?,
        };
        anyhow::ensure!(
            cover_canvas.width > 0 && cover_canvas.height > 0,
            "COVER_WIDTH and COVER_HEIGHT must be positive"
        );
        anyhow::ensure!(cover_canvas.zoom >= 1.0, "COVER_ZOOM must be at least 1.0");

        Ok(Config {
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            image_service_url: require_env("IMAGE_SERVICE_URL")?,
            image_service_api_key: require_env("IMAGE_SERVICE_API_KEY")?,
            redis_url: require_env("REDIS_URL")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            port: optional_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            session_ttl_secs: optional_env("SESSION_TTL_SECS", 86_400)?,
            cover_canvas,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}
