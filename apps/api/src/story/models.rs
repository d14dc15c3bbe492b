use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::AppError;
use crate::story::catalog::{Language, Style, Theme};

const MAX_CHILD_AGE: u8 = 17;
const MAX_LENGTH_MINUTES: u32 = 30;
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

// ────────────────────────────────────────────────────────────────────────────
// Questionnaire Answer Set
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Child {
    pub name: String,
    pub age: u8,
}

/// Photo attached to the questionnaire. Bytes travel as base64 so the whole
/// Answer Set can sit in the session cache as one JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedImage {
    pub content_type: String,
    #[serde(serialize_with = "encode_base64", deserialize_with = "decode_base64")]
    pub bytes: Vec<u8>,
}

/// Structured input captured before generation begins. Read-only after submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerSet {
    pub children: Vec<Child>,
    pub themes: Vec<Theme>,
    pub length_minutes: u32,
    #[serde(default)]
    pub styles: Vec<Style>,
    /// Preferred character motif, e.g. favourite toys or animals.
    #[serde(default)]
    pub characters: Vec<String>,
    #[serde(default)]
    pub include_images: bool,
    #[serde(default)]
    pub uploaded_image: Option<UploadedImage>,
    #[serde(default)]
    pub language: Language,
}

impl AnswerSet {
    /// Rejects answer sets that must never reach a remote service.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.children.is_empty() {
            return Err(AppError::Validation(
                "At least one child is required".to_string(),
            ));
        }
        for child in &self.children {
            if child.name.trim().is_empty() {
                return Err(AppError::Validation(
                    "Every child needs a name".to_string(),
                ));
            }
            if child.age > MAX_CHILD_AGE {
                return Err(AppError::Validation(format!(
                    "Age {} for '{}' is out of range (0-{MAX_CHILD_AGE})",
                    child.age, child.name
                )));
            }
        }
        if self.themes.is_empty() {
            return Err(AppError::Validation(
                "Select at least one theme".to_string(),
            ));
        }
        if self.length_minutes == 0 || self.length_minutes > MAX_LENGTH_MINUTES {
            return Err(AppError::Validation(format!(
                "Story length must be between 1 and {MAX_LENGTH_MINUTES} minutes"
            )));
        }
        if let Some(upload) = &self.uploaded_image {
            if upload.bytes.is_empty() {
                return Err(AppError::Validation("Uploaded photo is empty".to_string()));
            }
            if upload.bytes.len() > MAX_UPLOAD_BYTES {
                return Err(AppError::Validation(
                    "Uploaded photo exceeds 10 MiB".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// The theme that drives companion checks and the synthesis description.
    pub fn primary_theme(&self) -> Option<Theme> {
        self.themes.first().copied()
    }

    pub fn primary_style(&self) -> Option<Style> {
        self.styles.first().copied()
    }

    pub fn wants_cover(&self) -> bool {
        self.include_images && !self.styles.is_empty()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Narrative & Verdict
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub headline: String,
    pub body: String,
}

/// Generated story: a title plus ordered sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Narrative {
    pub title: String,
    pub sections: Vec<Section>,
}

impl Narrative {
    /// Title, headlines and bodies joined in reading order.
    pub fn full_text(&self) -> String {
        let mut text = self.title.clone();
        for section in &self.sections {
            text.push('\n');
            text.push_str(&section.headline);
            text.push('\n');
            text.push_str(&section.body);
        }
        text
    }
}

/// The evaluator's judgment. `reasons` holds one entry per failed check, in check order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub valid: bool,
    pub reasons: Vec<String>,
}

impl Verdict {
    pub fn from_reasons(reasons: Vec<String>) -> Self {
        Self {
            valid: reasons.is_empty(),
            reasons,
        }
    }
}

fn encode_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(bytes))
}

fn decode_base64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    STANDARD
        .decode(encoded.as_bytes())
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answers() -> AnswerSet {
        AnswerSet {
            children: vec![
                Child { name: "Mia".to_string(), age: 6 },
                Child { name: "Leo".to_string(), age: 4 },
            ],
            themes: vec![Theme::Dragons],
            length_minutes: 5,
            styles: vec![Style::Cartoon],
            characters: vec![],
            include_images: true,
            uploaded_image: None,
            language: Language::En,
        }
    }

    #[test]
    fn test_valid_answer_set_passes() {
        assert!(answers().validate().is_ok());
    }

    #[test]
    fn test_answer_set_without_children_is_rejected() {
        let mut a = answers();
        a.children.clear();
        assert!(matches!(a.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_blank_child_name_is_rejected() {
        let mut a = answers();
        a.children[1].name = "   ".to_string();
        assert!(matches!(a.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_length_out_of_range_is_rejected() {
        let mut a = answers();
        a.length_minutes = 0;
        assert!(a.validate().is_err());
        a.length_minutes = 31;
        assert!(a.validate().is_err());
    }

    #[test]
    fn test_wants_cover_requires_images_and_style() {
        let mut a = answers();
        assert!(a.wants_cover());
        a.styles.clear();
        assert!(!a.wants_cover());
        a.styles.push(Style::Anime);
        a.include_images = false;
        assert!(!a.wants_cover());
    }

    #[test]
    fn test_answer_set_deserializes_locale_labels_and_base64_upload() {
        let json = r#"{
            "children": [{"name": "Mia", "age": 6}],
            "themes": ["Drachen"],
            "length_minutes": 10,
            "styles": ["Aquarell"],
            "include_images": true,
            "uploaded_image": {"content_type": "image/png", "bytes": "AQID"},
            "language": "Deutsch"
        }"#;
        let a: AnswerSet = serde_json::from_str(json).unwrap();
        assert_eq!(a.themes, vec![Theme::Dragons]);
        assert_eq!(a.styles, vec![Style::Watercolor]);
        assert_eq!(a.language, Language::De);
        assert_eq!(a.uploaded_image.unwrap().bytes, vec![1, 2, 3]);
        assert!(a.characters.is_empty());
    }

    #[test]
    fn test_verdict_valid_iff_no_reasons() {
        assert!(Verdict::from_reasons(vec![]).valid);
        assert!(!Verdict::from_reasons(vec!["x".to_string()]).valid);
    }

    #[test]
    fn test_full_text_includes_title_headlines_and_bodies() {
        let n = Narrative {
            title: "The Dragon Egg".to_string(),
            sections: vec![Section {
                headline: "A Discovery".to_string(),
                body: "Mia found an egg.".to_string(),
            }],
        };
        let text = n.full_text();
        assert!(text.contains("The Dragon Egg"));
        assert!(text.contains("A Discovery"));
        assert!(text.contains("Mia found an egg."));
    }
}
