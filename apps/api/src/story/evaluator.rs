//! Quality Evaluator — mechanical grading of a generated narrative.
//!
//! Checks, in order:
//! 1. every child's exact name appears verbatim at least once
//! 2. children are depicted acting, not merely named
//! 3. instructional / moralizing phrasing stays at or below `MAX_MORALIZING_PHRASES`
//! 4. if the primary theme has a companion, at least one companion keyword appears
//!
//! Pure and deterministic: the same narrative and inputs always give the same Verdict.
//! A failed check is a retry signal for narrative acquisition, never a user-facing error.

use regex::Regex;

use crate::story::catalog::Theme;
use crate::story::models::{Child, Narrative, Verdict};

const MAX_MORALIZING_PHRASES: usize = 2;
/// Above this many name mentions the story must show children acting at least twice.
const FEW_MENTIONS: usize = 3;

/// Action verbs that count as "child does something" right after a name.
/// Regular English past tenses (`-ed`) are matched separately.
const ACTION_VERBS: &[&str] = &[
    // English irregular / present forms
    "ran", "runs", "jumps", "climbs", "found", "finds", "flew", "flies", "swam", "swims",
    "held", "holds", "built", "builds", "saw", "sees", "heard", "hears", "took", "takes",
    "gave", "gives", "made", "makes", "caught", "catches", "threw", "throws", "rode",
    "rides", "hid", "hides", "began", "begins", "knew", "felt", "thought", "led", "leads",
    "said", "says", "spoke", "whispers", "shouts", "laughs", "giggles", "smiles", "grabs",
    "opens", "reaches", "points", "looks", "helps", "dances", "sings", "stood", "sat",
    "drew", "wrote", "brought", "told", "woke", "went", "came", "dug", "spun", "swung",
    // German
    "rannte", "sprang", "kletterte", "lachte", "rief", "fand", "öffnete", "entdeckte",
    "flüsterte", "sah", "nahm", "hielt", "baute", "flog", "schwamm", "half", "zeigte",
    // French
    "courut", "sauta", "grimpa", "rit", "cria", "trouva", "ouvrit", "découvrit", "prit",
    // Spanish
    "corrió", "saltó", "trepó", "rió", "gritó", "encontró", "abrió", "descubrió", "tomó",
];

/// Nouns that make `<Name>'s <noun>` read as the child driving the story.
const NARRATIVE_NOUNS: &[&str] = &[
    "idea", "plan", "courage", "voice", "eyes", "hand", "hands", "heart", "laugh",
    "question", "wish", "adventure", "discovery", "smile", "map", "turn", "quest",
    "answer", "trick", "guess", "shout", "whisper", "footsteps", "drawing",
];

const MORALIZING_PHRASES: &[&str] = &[
    "the moral",
    "lesson",
    "lessons",
    "learned that",
    "learnt that",
    "it is important to",
    "it's important to",
    "it’s important to",
    "always remember",
    "never forget",
    "you should",
    "we should",
    "must always",
    "remember to",
    "the importance of",
    "taught them that",
    "die moral",
    "man sollte",
    "es ist wichtig",
];

/// Inflections accepted after a companion keyword: plurals and German/Spanish endings
/// ("dragons", "Drachen", "Feen", "hadas"). Anything longer is a different word.
const KEYWORD_SUFFIXES: &str = "s|es|e|n|en|ns";

/// Grades `narrative` for `children` under the primary `theme`.
pub fn evaluate(narrative: &Narrative, children: &[Child], theme: Option<Theme>) -> Verdict {
    let text = narrative.full_text();
    let mut reasons = Vec::new();

    // (1) exact names
    let missing: Vec<&str> = children
        .iter()
        .filter(|c| count_name_mentions(&text, &c.name) == 0)
        .map(|c| c.name.as_str())
        .collect();
    if !missing.is_empty() {
        reasons.push(format!(
            "The story never mentions {} by exact name. Use each child's name exactly as given.",
            missing.join(", ")
        ));
    }

    // (2) active depiction
    let mentions: usize = children
        .iter()
        .map(|c| count_name_mentions(&text, &c.name))
        .sum();
    let required = if mentions <= FEW_MENTIONS { 1 } else { 2 };
    let active = count_active_patterns(&text, children);
    if active < required {
        reasons.push(format!(
            "The children are named but not shown acting ({active} active moments, need at least {required}). \
            Let them do things themselves, e.g. \"{} climbed ...\" or \"{}'s idea ...\".",
            first_name(children),
            first_name(children)
        ));
    }

    // (3) moralizing
    let moralizing = count_moralizing(&text);
    if moralizing > MAX_MORALIZING_PHRASES {
        reasons.push(format!(
            "Too much instructional or moralizing language ({moralizing} phrases, at most {MAX_MORALIZING_PHRASES}). \
            Show the lesson through events instead of stating it."
        ));
    }

    // (4) theme companion
    if let Some((theme, companion)) = theme.and_then(|t| t.companion().map(|c| (t, c))) {
        if !contains_any_keyword(&text, companion.keywords) {
            reasons.push(format!(
                "The {} theme needs its companion in the story. Include at least one of: {}.",
                theme.name(),
                companion.keywords.join(", ")
            ));
        }
    }

    Verdict::from_reasons(reasons)
}

/// Case-sensitive, word-bounded occurrences of `name` in `text`.
pub(crate) fn count_name_mentions(text: &str, name: &str) -> usize {
    let name = name.trim();
    if name.is_empty() {
        return 0;
    }
    Regex::new(&bounded(name))
        .map(|re| re.find_iter(text).count())
        .unwrap_or(0)
}

/// Counts `<Name> [adverb] <verb>` and `<Name>'s [adjective] <noun>` across all children.
pub(crate) fn count_active_patterns(text: &str, children: &[Child]) -> usize {
    let verbs = ACTION_VERBS
        .iter()
        .map(|v| regex::escape(v))
        .collect::<Vec<_>>()
        .join("|");
    let nouns = NARRATIVE_NOUNS.join("|");

    children
        .iter()
        .map(|child| child.name.trim())
        .filter(|name| !name.is_empty())
        .map(|name| {
            let subject = format!(
                r"{}\s+(?i:(?:\w+ly\s+)?(?:{verbs}|\w+ed))\b",
                bounded(name)
            );
            let possessive = format!(
                r"{}['’]s\s+(?i:(?:\w+\s+)?(?:{nouns}))\b",
                bounded(name)
            );
            count_matches(&subject, text) + count_matches(&possessive, text)
        })
        .sum()
}

/// Non-overlapping, case-insensitive phrase hits. Longer phrases win at the same
/// position, so "always remember to" counts once.
pub(crate) fn count_moralizing(text: &str) -> usize {
    let mut phrases = MORALIZING_PHRASES.to_vec();
    phrases.sort_by_key(|p| std::cmp::Reverse(p.len()));
    let alternation = phrases
        .iter()
        .map(|p| bounded(p))
        .collect::<Vec<_>>()
        .join("|");
    count_matches(&format!("(?i:{alternation})"), text)
}

/// A keyword matches as a whole word, optionally followed by one of `KEYWORD_SUFFIXES`.
pub(crate) fn contains_any_keyword(text: &str, keywords: &[&str]) -> bool {
    let alternation = keywords
        .iter()
        .map(|k| regex::escape(k))
        .collect::<Vec<_>>()
        .join("|");
    let pattern = format!(r"(?i)\b(?:{alternation})(?:{KEYWORD_SUFFIXES})?\b");
    Regex::new(&pattern)
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}

fn count_matches(pattern: &str, text: &str) -> usize {
    Regex::new(pattern)
        .map(|re| re.find_iter(text).count())
        .unwrap_or(0)
}

/// Escapes `name` and adds `\b` on each side that starts or ends with a word character.
fn bounded(name: &str) -> String {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let leading = name.chars().next().is_some_and(is_word);
    let trailing = name.chars().last().is_some_and(is_word);
    format!(
        "{}{}{}",
        if leading { r"\b" } else { "" },
        regex::escape(name),
        if trailing { r"\b" } else { "" }
    )
}

fn first_name(children: &[Child]) -> &str {
    children.first().map(|c| c.name.as_str()).unwrap_or("the child")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::models::Section;

    fn children() -> Vec<Child> {
        vec![
            Child { name: "Mia".to_string(), age: 6 },
            Child { name: "Leo".to_string(), age: 4 },
        ]
    }

    fn narrative(body: &str) -> Narrative {
        Narrative {
            title: "The Dragon Egg".to_string(),
            sections: vec![Section {
                headline: "Morning".to_string(),
                body: body.to_string(),
            }],
        }
    }

    const GOOD_BODY: &str = "Mia climbed the hill while Leo laughed. \
        At the top a tiny dragon blinked at them. Leo's idea was to share their apples.";

    #[test]
    fn test_good_story_is_valid() {
        let verdict = evaluate(&narrative(GOOD_BODY), &children(), Some(Theme::Dragons));
        assert!(verdict.valid, "unexpected reasons: {:?}", verdict.reasons);
        assert!(verdict.reasons.is_empty());
    }

    #[test]
    fn test_missing_child_name_fails_and_names_child() {
        let body = "Mia climbed the hill and found a dragon. Mia laughed.";
        let verdict = evaluate(&narrative(body), &children(), Some(Theme::Dragons));
        assert!(!verdict.valid);
        assert_eq!(verdict.reasons.len(), 1);
        assert!(verdict.reasons[0].contains("Leo"));
        assert!(!verdict.reasons[0].contains("Mia"));
    }

    #[test]
    fn test_name_match_is_word_bounded_and_case_sensitive() {
        assert_eq!(count_name_mentions("Leon and Leopold went out", "Leo"), 0);
        assert_eq!(count_name_mentions("leo went out", "Leo"), 0);
        assert_eq!(count_name_mentions("Leo went out. Leo came back.", "Leo"), 2);
    }

    #[test]
    fn test_names_without_action_fail_active_check() {
        let body = "This is a story about Mia and Leo and a dragon.";
        let verdict = evaluate(&narrative(body), &children(), Some(Theme::Dragons));
        assert!(!verdict.valid);
        assert_eq!(verdict.reasons.len(), 1);
        assert!(verdict.reasons[0].contains("not shown acting"));
    }

    #[test]
    fn test_many_mentions_require_two_active_patterns() {
        // four mentions, one active pattern
        let body = "Mia and Leo. Mia and Leo met a dragon. Mia jumped.";
        let verdict = evaluate(&narrative(body), &children(), Some(Theme::Dragons));
        assert!(!verdict.valid);
        assert!(verdict.reasons[0].contains("need at least 2"));

        // few mentions, one active pattern is enough
        let body = "Mia jumped. Leo and a dragon watched.";
        let verdict = evaluate(&narrative(body), &children(), Some(Theme::Dragons));
        assert!(verdict.valid, "{:?}", verdict.reasons);
    }

    #[test]
    fn test_active_patterns_cover_adverbs_regular_past_and_possessives() {
        let kids = children();
        assert_eq!(count_active_patterns("Mia quickly grabbed the rope.", &kids), 1);
        assert_eq!(count_active_patterns("Leo’s brave plan worked.", &kids), 1);
        assert_eq!(count_active_patterns("Mia rannte los.", &kids), 1);
        assert_eq!(count_active_patterns("Mia and the tree.", &kids), 0);
    }

    #[test]
    fn test_moralizing_limit() {
        let two = "Mia climbed. Leo laughed. The dragon said you should share. \
            They learned that friends help.";
        assert_eq!(count_moralizing(two), 2);
        assert!(evaluate(&narrative(two), &children(), Some(Theme::Dragons)).valid);

        let three = format!("{two} Always remember to be kind.");
        let verdict = evaluate(&narrative(&three), &children(), Some(Theme::Dragons));
        assert!(!verdict.valid);
        assert!(verdict.reasons[0].contains("moralizing"));
    }

    #[test]
    fn test_overlapping_moral_phrases_count_once() {
        assert_eq!(count_moralizing("Always remember to share."), 1);
        assert_eq!(count_moralizing("ALWAYS REMEMBER to share. You should smile."), 2);
        assert_eq!(count_moralizing("Two lessons and one lesson."), 2);
        assert_eq!(count_moralizing("Shouldn't you? Elessons."), 0);

        let body = "Mia climbed. Leo laughed at the dragon. \
            Always remember to share. You should smile.";
        assert!(evaluate(&narrative(body), &children(), Some(Theme::Dragons)).valid);
    }

    #[test]
    fn test_companion_keywords_match_whole_words_only() {
        let mut n = narrative("Mia climbed into bed while Leo laughed at the shadow of his feet.");
        n.title = "Coffee in Hamburg".to_string();
        let verdict = evaluate(&n, &children(), Some(Theme::Fairies));
        assert!(!verdict.valid);
        assert!(verdict.reasons[0].contains("companion"));
        assert!(!evaluate(&n, &children(), Some(Theme::Knights)).valid);

        assert!(contains_any_keyword("Drei Feen tanzten.", &["fee"]));
        assert!(contains_any_keyword("Las hadas cantan.", &["hada"]));
        assert!(contains_any_keyword("Two Dragons and a dragon's egg.", &["dragon"]));
        assert!(contains_any_keyword("Die alte Burg.", &["burg"]));
        assert!(!contains_any_keyword("They felt the fees... feel, feet.", &["fairy", "fée"]));
    }

    #[test]
    fn test_missing_companion_fails_only_for_companion_themes() {
        let body = "Mia climbed the hill while Leo laughed.";
        let mut n = narrative(body);
        n.title = "A Sunny Day".to_string();

        let verdict = evaluate(&n, &children(), Some(Theme::Dragons));
        assert!(!verdict.valid);
        assert!(verdict.reasons[0].contains("dragon"));

        assert!(evaluate(&n, &children(), Some(Theme::Friendship)).valid);
        assert!(evaluate(&n, &children(), None).valid);
    }

    #[test]
    fn test_companion_keyword_matches_other_languages() {
        let mut n = narrative("Mia kletterte, und Leo lachte.");
        n.title = "Der kleine Drache".to_string();
        assert!(evaluate(&n, &children(), Some(Theme::Dragons)).valid);
    }

    #[test]
    fn test_reasons_follow_check_order() {
        let mut n = narrative("Nobody is here. You should listen. Always remember. The lesson.");
        n.title = "Empty".to_string();
        let verdict = evaluate(&n, &children(), Some(Theme::Dragons));
        assert_eq!(verdict.reasons.len(), 4);
        assert!(verdict.reasons[0].contains("exact name"));
        assert!(verdict.reasons[1].contains("not shown acting"));
        assert!(verdict.reasons[2].contains("moralizing"));
        assert!(verdict.reasons[3].contains("companion"));
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let n = narrative("Mia and Leo. You should. Always remember. The lesson.");
        let first = evaluate(&n, &children(), Some(Theme::Dragons));
        for _ in 0..5 {
            assert_eq!(evaluate(&n, &children(), Some(Theme::Dragons)), first);
        }
    }
}
