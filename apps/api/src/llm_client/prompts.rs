// Cross-cutting prompt fragments shared by every narrative request.
// Story-specific templates live in story/prompts.rs.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Children's names are data, not suggestions.
pub const EXACT_NAMES_INSTRUCTION: &str = "\
    CRITICAL: Use every child's name EXACTLY as given — same spelling, same capitalisation, \
    no nicknames, no translations. Do NOT change the children's ages. \
    Every child must appear in the story at least once by name.";

/// Keeps the children as protagonists and the tone free of lecturing.
pub const SHOW_DONT_TELL_INSTRUCTION: &str = "\
    CRITICAL: The children are the heroes. Show them acting — they run, climb, discover, decide, \
    laugh and help. Do NOT lecture: avoid phrases like 'the lesson is', 'you should', \
    'always remember' or an explicit moral at the end.";
