// Prompt templates for story generation.
// Reuses cross-cutting fragments from llm_client::prompts.

use crate::llm_client::prompts::{
    EXACT_NAMES_INSTRUCTION, JSON_ONLY_SYSTEM, SHOW_DONT_TELL_INSTRUCTION,
};
use crate::story::narrative::NarrativeRequest;

/// Reading speed used to turn a target length into a word budget.
const WORDS_PER_MINUTE: u32 = 130;

/// System prompt for story generation. Enforces JSON-only output.
pub const STORY_SYSTEM: &str = "You are a warm, imaginative children's author writing \
    bedtime stories that are read aloud. \
    You MUST respond with valid JSON only — a single JSON object. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

/// Story prompt template.
/// Replace: {names_instruction}, {show_instruction}, {children}, {themes}, {characters},
///          {language}, {minutes}, {words}, {sections}, {feedback}
pub const STORY_PROMPT_TEMPLATE: &str = r#"{names_instruction}

{show_instruction}

CHILDREN (the heroes of the story):
{children}

THEMES: {themes}
FAVOURITE CHARACTERS to weave in: {characters}
LANGUAGE: write the whole story in {language}
LENGTH: about {minutes} minutes read aloud (~{words} words), in {sections} sections
{feedback}
Return a JSON object with this EXACT schema:
{
  "title": "Story title",
  "sections": [
    {"headline": "Short section headline", "body": "Section text"}
  ]
}"#;

/// Appended on attempt k > 0. Replace: {reasons}
pub const FEEDBACK_TEMPLATE: &str = r#"
A previous version of this story was rejected for these reasons:
{reasons}
Write a NEW version of the story that fixes every one of them.
"#;

pub fn story_system() -> String {
    format!("{STORY_SYSTEM} {JSON_ONLY_SYSTEM}")
}

/// Renders a `NarrativeRequest` into the prompt sent to the narrative service.
pub fn build_story_prompt(request: &NarrativeRequest) -> String {
    let children = request
        .children
        .iter()
        .map(|c| format!("- {} ({} years old)", c.name, c.age))
        .collect::<Vec<_>>()
        .join("\n");

    let characters = if request.character_list.is_empty() {
        "none in particular".to_string()
    } else {
        request.character_list.join(", ")
    };

    let feedback = match &request.prior_violation_reasons {
        Some(reasons) if !reasons.is_empty() => FEEDBACK_TEMPLATE.replace(
            "{reasons}",
            &reasons
                .iter()
                .map(|r| format!("- {r}"))
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        _ => String::new(),
    };

    let sections = (request.length_minutes / 2).clamp(2, 8);

    STORY_PROMPT_TEMPLATE
        .replace("{names_instruction}", EXACT_NAMES_INSTRUCTION)
        .replace("{show_instruction}", SHOW_DONT_TELL_INSTRUCTION)
        .replace("{children}", &children)
        .replace("{themes}", &request.theme_list.join(", "))
        .replace("{characters}", &characters)
        .replace("{language}", &request.language)
        .replace("{minutes}", &request.length_minutes.to_string())
        .replace(
            "{words}",
            &(request.length_minutes * WORDS_PER_MINUTE).to_string(),
        )
        .replace("{sections}", &sections.to_string())
        .replace("{feedback}", &feedback)
}
