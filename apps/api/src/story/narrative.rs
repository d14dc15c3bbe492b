//! Narrative Acquisition — bounded, strictly sequential generate → evaluate → retry.
//!
//! Attempt 0 sends the plain request. Attempt k > 0 resends it together with the literal
//! violation reasons of attempt k-1. The loop stops at the first valid Verdict or after
//! `MAX_ATTEMPTS`, and hands back the *last* narrative whether or not it passed.
//!
//! Quality failures never reach the caller. A transport or fatal parse failure ends the
//! loop; it only surfaces when no earlier attempt produced a narrative.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::llm_client::{parse_structured, LlmClient, LlmError};
use crate::story::evaluator::evaluate;
use crate::story::models::{AnswerSet, Child, Narrative, Verdict};
use crate::story::prompts::{build_story_prompt, story_system};

pub const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum NarrativeError {
    #[error("narrative service unavailable: {0}")]
    Transport(String),

    #[error("narrative response could not be parsed: {0}")]
    Parse(String),
}

impl From<LlmError> for NarrativeError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Parse(e) => NarrativeError::Parse(e.to_string()),
            LlmError::EmptyContent => NarrativeError::Parse(err.to_string()),
            other => NarrativeError::Transport(other.to_string()),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Request / report types
// ────────────────────────────────────────────────────────────────────────────

/// What the narrative service is asked to write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrativeRequest {
    pub children: Vec<Child>,
    pub theme_list: Vec<String>,
    pub length_minutes: u32,
    pub character_list: Vec<String>,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prior_violation_reasons: Option<Vec<String>>,
}

impl NarrativeRequest {
    pub fn from_answers(answers: &AnswerSet) -> Self {
        Self {
            children: answers.children.clone(),
            theme_list: answers.themes.iter().map(|t| t.name().to_string()).collect(),
            length_minutes: answers.length_minutes,
            character_list: answers.characters.clone(),
            language: answers.language.prompt_name().to_string(),
            prior_violation_reasons: None,
        }
    }

    /// The original request plus the reasons the previous attempt was rejected.
    pub fn with_feedback(&self, reasons: &[String]) -> Self {
        Self {
            prior_violation_reasons: Some(reasons.to_vec()),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Evaluated { verdict: Verdict },
    Failed { error: String },
}

/// One pass through the loop, kept for observability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationAttempt {
    pub index: u32,
    pub prior_reasons: Vec<String>,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeReport {
    pub narrative: Narrative,
    pub verdict: Verdict,
    pub attempts: Vec<GenerationAttempt>,
}

// ────────────────────────────────────────────────────────────────────────────
// Service seam
// ────────────────────────────────────────────────────────────────────────────

/// The remote narrative-generation service. Returns raw text; parsing happens here so
/// prose around the payload can be recovered from.
#[async_trait]
pub trait NarrativeService: Send + Sync {
    async fn generate(&self, request: &NarrativeRequest) -> Result<String, NarrativeError>;
}

#[async_trait]
impl NarrativeService for LlmClient {
    async fn generate(&self, request: &NarrativeRequest) -> Result<String, NarrativeError> {
        let prompt = build_story_prompt(request);
        Ok(self.call_text(&prompt, &story_system()).await?)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Acquisition loop
// ────────────────────────────────────────────────────────────────────────────

pub async fn acquire_narrative(
    service: &dyn NarrativeService,
    answers: &AnswerSet,
) -> Result<NarrativeReport, NarrativeError> {
    let base = NarrativeRequest::from_answers(answers);
    let theme = answers.primary_theme();
    let mut attempts = Vec::new();
    let mut last: Option<(Narrative, Verdict)> = None;

    for index in 0..MAX_ATTEMPTS {
        let prior_reasons = last
            .as_ref()
            .map(|(_, verdict)| verdict.reasons.clone())
            .unwrap_or_default();
        let request = if prior_reasons.is_empty() {
            base.clone()
        } else {
            base.with_feedback(&prior_reasons)
        };

        let generated = service
            .generate(&request)
            .await
            .and_then(|raw| parse_narrative(&raw));

        match generated {
            Ok(narrative) => {
                let verdict = evaluate(&narrative, &answers.children, theme);
                attempts.push(GenerationAttempt {
                    index,
                    prior_reasons,
                    outcome: AttemptOutcome::Evaluated {
                        verdict: verdict.clone(),
                    },
                });

                if verdict.valid {
                    info!(attempt = index + 1, "Narrative passed evaluation");
                    return Ok(NarrativeReport {
                        narrative,
                        verdict,
                        attempts,
                    });
                }

                warn!(
                    "Narrative attempt {}/{} failed evaluation: {:?}",
                    index + 1,
                    MAX_ATTEMPTS,
                    verdict.reasons
                );
                last = Some((narrative, verdict));
            }
            Err(e) => {
                warn!("Narrative attempt {}/{} failed: {e}", index + 1, MAX_ATTEMPTS);
                attempts.push(GenerationAttempt {
                    index,
                    prior_reasons,
                    outcome: AttemptOutcome::Failed {
                        error: e.to_string(),
                    },
                });
                if last.is_none() {
                    return Err(e);
                }
                break;
            }
        }
    }

    let (narrative, verdict) = last.ok_or_else(|| {
        NarrativeError::Parse("narrative loop ended without a narrative".to_string())
    })?;
    warn!(
        attempts = attempts.len(),
        "Keeping last narrative despite failed evaluation"
    );
    Ok(NarrativeReport {
        narrative,
        verdict,
        attempts,
    })
}

fn parse_narrative(raw: &str) -> Result<Narrative, NarrativeError> {
    let narrative: Narrative = parse_structured(raw)?;
    if narrative.sections.is_empty() {
        return Err(NarrativeError::Parse(
            "narrative has no sections".to_string(),
        ));
    }
    Ok(narrative)
}
