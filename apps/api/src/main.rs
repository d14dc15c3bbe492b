mod config;
mod cover;
mod errors;
mod llm_client;
mod routes;
mod session;
mod state;
mod story;
#[cfg(test)]
mod testing;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::cover::services::ImageServiceClient;
use crate::cover::store::S3ImageStore;
use crate::cover::CoverSources;
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::session::cache::RedisSessionCache;
use crate::session::orchestrator::SessionDeps;
use crate::session::registry::SessionRegistry;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Storyweaver API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize Redis (session cache)
    let redis = redis::Client::open(config.redis_url.clone())?;
    let cache = Arc::new(RedisSessionCache::new(redis, config.session_ttl_secs));
    info!("Session cache initialized (ttl {}s)", config.session_ttl_secs);

    // Initialize S3 / MinIO (composited covers)
    let s3 = build_s3_client(&config).await;
    let store = Arc::new(S3ImageStore::new(
        s3,
        config.s3_bucket.clone(),
        config.s3_endpoint.clone(),
    ));
    info!("S3 client initialized");

    // Initialize narrative service
    let llm = Arc::new(LlmClient::new(config.anthropic_api_key.clone()));
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    // Initialize image service (synthesis + refinement share one client)
    let images = Arc::new(ImageServiceClient::new(
        config.image_service_url.clone(),
        config.image_service_api_key.clone(),
    ));
    info!(
        "Image service client initialized ({}), cover canvas {}x{} @ {}x",
        config.image_service_url,
        config.cover_canvas.width,
        config.cover_canvas.height,
        config.cover_canvas.zoom
    );

    // Build app state
    let deps = SessionDeps {
        narrative: llm,
        cache,
        cover: CoverSources {
            synthesizer: images.clone(),
            refiner: images,
            store,
            canvas: config.cover_canvas,
        },
    };
    let state = AppState {
        sessions: Arc::new(SessionRegistry::new(
            deps,
            Duration::from_secs(config.session_ttl_secs),
        )),
    };

    // Build router
    // TODO: restrict origins once the web client's domain is fixed
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "storyweaver-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}
