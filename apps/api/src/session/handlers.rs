use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};

use crate::errors::AppError;
use crate::session::orchestrator::SessionSnapshot;
use crate::session::registry::validate_session_id;
use crate::state::AppState;
use crate::story::models::{AnswerSet, UploadedImage};

/// Multipart field carrying the Answer Set as JSON.
pub const ANSWERS_FIELD: &str = "answers";
/// Optional multipart field carrying the child's photo.
pub const PHOTO_FIELD: &str = "photo";

/// POST /api/v1/sessions/:id/answers
pub async fn handle_submit_answers(
    State(state): State<AppState>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SessionSnapshot>), AppError> {
    validate_session_id(&id)?;

    let mut answers_json: Option<String> = None;
    let mut photo: Option<UploadedImage> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            ANSWERS_FIELD => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Unreadable answers field: {e}")))?;
                answers_json = Some(text);
            }
            PHOTO_FIELD => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Unreadable photo: {e}")))?;
                // Browsers send an empty part when no file was chosen.
                if !bytes.is_empty() {
                    photo = Some(UploadedImage {
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            _ => {}
        }
    }

    let answers = assemble_answers(answers_json, photo)?;
    let orchestrator = state.sessions.get_or_create(&id)?;
    let answers = match orchestrator.submit(answers).await {
        Ok(answers) => answers,
        Err(e) => {
            state.sessions.release_unsubmitted(&id);
            return Err(e);
        }
    };
    tokio::spawn(orchestrator.clone().run(answers));

    Ok((StatusCode::ACCEPTED, Json(orchestrator.snapshot())))
}

/// POST /api/v1/sessions/:id/resume
pub async fn handle_resume(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<SessionSnapshot>), AppError> {
    let orchestrator = state.sessions.get_or_create(&id)?;
    let answers = match orchestrator.resume().await {
        Ok(answers) => answers,
        Err(e) => {
            state.sessions.release_unsubmitted(&id);
            return Err(e);
        }
    };
    tokio::spawn(orchestrator.clone().run(answers));

    Ok((StatusCode::ACCEPTED, Json(orchestrator.snapshot())))
}

/// GET /api/v1/sessions/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(state.sessions.snapshot(&id)?))
}

/// DELETE /api/v1/sessions/:id
pub async fn handle_new_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.sessions.end_session(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn assemble_answers(
    answers_json: Option<String>,
    photo: Option<UploadedImage>,
) -> Result<AnswerSet, AppError> {
    let raw = answers_json.ok_or_else(|| {
        AppError::Validation(format!("Missing multipart field '{ANSWERS_FIELD}'"))
    })?;
    let mut answers: AnswerSet = serde_json::from_str(&raw)
        .map_err(|e| AppError::Validation(format!("Invalid answers: {e}")))?;

    if let Some(photo) = photo {
        if !photo.content_type.starts_with("image/") {
            return Err(AppError::Validation(format!(
                "Photo must be an image, got '{}'",
                photo.content_type
            )));
        }
        answers.uploaded_image = Some(photo);
    }
    Ok(answers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::catalog::{Language, Style, Theme};

    const ANSWERS: &str = r#"{
        "children": [{"name": "Mia", "age": 6}, {"name": "Leo", "age": 4}],
        "themes": ["Drachen"],
        "length_minutes": 5,
        "styles": ["cartoon"],
        "include_images": true,
        "language": "de"
    }"#;

    #[test]
    fn test_answers_field_is_parsed_with_locale_labels() {
        let answers = assemble_answers(Some(ANSWERS.to_string()), None).unwrap();
        assert_eq!(answers.children.len(), 2);
        assert_eq!(answers.themes, vec![Theme::Dragons]);
        assert_eq!(answers.styles, vec![Style::Cartoon]);
        assert_eq!(answers.language, Language::De);
        assert!(answers.uploaded_image.is_none());
    }

    #[test]
    fn test_photo_is_attached() {
        let photo = UploadedImage {
            content_type: "image/jpeg".to_string(),
            bytes: vec![1, 2, 3],
        };
        let answers = assemble_answers(Some(ANSWERS.to_string()), Some(photo.clone())).unwrap();
        assert_eq!(answers.uploaded_image, Some(photo));
    }

    #[test]
    fn test_missing_or_bad_fields_are_validation_errors() {
        assert!(matches!(
            assemble_answers(None, None),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            assemble_answers(Some("{".to_string()), None),
            Err(AppError::Validation(_))
        ));

        let not_an_image = UploadedImage {
            content_type: "application/pdf".to_string(),
            bytes: vec![1],
        };
        assert!(matches!(
            assemble_answers(Some(ANSWERS.to_string()), Some(not_an_image)),
            Err(AppError::Validation(_))
        ));
    }
}
