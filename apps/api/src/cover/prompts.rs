// Synthesis description builder for Path S.
// The child count must be stated exactly; "a few children" or "some kids" is a defect.

use crate::cover::services::SynthesisRequest;
use crate::story::catalog::Style;
use crate::story::models::AnswerSet;

const NUMBER_WORDS: [&str; 11] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
];

/// Scene framing shared by every synthesized cover.
pub const COVER_SCENE: &str = "Children's book cover illustration, full scene, \
    the children are the clear focus, joyful mood, no text or lettering on the image";

pub fn child_count_description(count: usize) -> String {
    match count {
        1 => "exactly one child".to_string(),
        n if n < NUMBER_WORDS.len() => format!("exactly {} children together", NUMBER_WORDS[n]),
        n => format!("exactly {n} children together"),
    }
}

pub fn build_synthesis_request(answers: &AnswerSet, style: Style) -> SynthesisRequest {
    let count = answers.children.len();
    let count_description = child_count_description(count);
    let companion = answers.primary_theme().and_then(|t| t.companion());

    let names: Vec<String> = answers.children.iter().map(|c| c.name.clone()).collect();
    let ages = answers
        .children
        .iter()
        .map(|c| format!("{} years", c.age))
        .collect::<Vec<_>>()
        .join(", ");

    let mut description = format!(
        "{COVER_SCENE}. Show {count_description} (ages: {ages}), no other people. Style: {}, {}.",
        style.name(),
        style.modifiers()
    );
    if let Some(companion) = &companion {
        description.push_str(&format!(
            " Include {}. Avoid: {}.",
            companion.description, companion.negative_constraints
        ));
    }

    SynthesisRequest {
        style_name: style.name().to_string(),
        style_modifiers: style.modifiers().to_string(),
        child_count: count,
        child_count_description: count_description,
        child_names_optional: (!names.is_empty()).then_some(names),
        theme_companion_description: companion.map(|c| c.description.to_string()),
        theme_negative_constraints: companion.map(|c| c.negative_constraints.to_string()),
        description,
    }
}
