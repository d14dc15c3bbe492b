//! Image service client — image synthesis (Path S) and image refinement (Path U).
//!
//! Both endpoints live behind one base URL with bearer auth. Refinement is best-effort:
//! 404/501/503 or a response without a reference mean "not available", which callers
//! treat exactly like a failure, silently.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::story::models::Child;

#[derive(Debug, Error)]
pub enum ImageServiceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Parse(String),
}

// ────────────────────────────────────────────────────────────────────────────
// Wire types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisRequest {
    pub style_name: String,
    pub style_modifiers: String,
    pub child_count: usize,
    pub child_count_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_names_optional: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme_companion_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme_negative_constraints: Option<String>,
    /// Full scene description assembled from the fields above.
    pub description: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesisResponse {
    image_reference: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefinementRequest {
    /// Base64-encoded PNG of the composited cover.
    pub image_asset: String,
    pub style_name: String,
    pub children_meta: Vec<Child>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefinementResponse {
    refined_image_reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefinementOutcome {
    Refined { reference: String },
    NotAvailable,
}

// ────────────────────────────────────────────────────────────────────────────
// Seams
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait ImageSynthesizer: Send + Sync {
    /// Returns the reference of the synthesized image.
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<String, ImageServiceError>;
}

#[async_trait]
pub trait ImageRefiner: Send + Sync {
    async fn refine(
        &self,
        request: &RefinementRequest,
    ) -> Result<RefinementOutcome, ImageServiceError>;
}

// ────────────────────────────────────────────────────────────────────────────
// HTTP implementation
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ImageServiceClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ImageServiceClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl ImageSynthesizer for ImageServiceClient {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<String, ImageServiceError> {
        let response = self
            .client
            .post(self.url("/v1/synthesize"))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ImageServiceError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: SynthesisResponse = response
            .json()
            .await
            .map_err(|e| ImageServiceError::Parse(e.to_string()))?;
        if body.image_reference.trim().is_empty() {
            return Err(ImageServiceError::Parse(
                "empty imageReference".to_string(),
            ));
        }

        debug!(style = %request.style_name, "Synthesis succeeded");
        Ok(body.image_reference)
    }
}

#[async_trait]
impl ImageRefiner for ImageServiceClient {
    async fn refine(
        &self,
        request: &RefinementRequest,
    ) -> Result<RefinementOutcome, ImageServiceError> {
        let response = self
            .client
            .post(self.url("/v1/refine"))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if matches!(
            status,
            StatusCode::NOT_FOUND | StatusCode::NOT_IMPLEMENTED | StatusCode::SERVICE_UNAVAILABLE
        ) {
            return Ok(RefinementOutcome::NotAvailable);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ImageServiceError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: RefinementResponse = response
            .json()
            .await
            .map_err(|e| ImageServiceError::Parse(e.to_string()))?;

        Ok(match body.refined_image_reference {
            Some(reference) if !reference.trim().is_empty() => {
                RefinementOutcome::Refined { reference }
            }
            _ => RefinementOutcome::NotAvailable,
        })
    }
}
