//! Catalog — the identifier enums for theme, style and language.
//!
//! The wizard sends these as whatever label the active locale shows ("Dragons",
//! "Drachen", "Dragones"). Everything is normalised to one enum here, at the input
//! boundary, so companion and style tables exist exactly once.

use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Language
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum Language {
    #[default]
    En,
    De,
    Fr,
    Es,
}

impl Language {
    pub fn from_label(label: &str) -> Option<Self> {
        match normalize(label).as_str() {
            "en" | "en-us" | "en-gb" | "english" | "englisch" | "anglais" | "inglés" | "ingles" => {
                Some(Language::En)
            }
            "de" | "de-de" | "german" | "deutsch" | "allemand" | "alemán" | "aleman" => {
                Some(Language::De)
            }
            "fr" | "fr-fr" | "french" | "französisch" | "français" | "francais" | "francés" => {
                Some(Language::Fr)
            }
            "es" | "es-es" | "spanish" | "spanisch" | "espagnol" | "español" | "espanol" => {
                Some(Language::Es)
            }
            _ => None,
        }
    }

    /// Name used when telling the narrative service which language to write in.
    pub fn prompt_name(&self) -> &'static str {
        match self {
            Language::En => "English",
            Language::De => "German",
            Language::Fr => "French",
            Language::Es => "Spanish",
        }
    }
}

impl TryFrom<String> for Language {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Language::from_label(&value).ok_or_else(|| format!("unknown language '{value}'"))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Theme
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum Theme {
    Dragons,
    Unicorns,
    Dinosaurs,
    Pirates,
    Space,
    Mermaids,
    Fairies,
    Knights,
    Animals,
    Friendship,
    Adventure,
}

/// The friendly character or element a theme promises. Enforced by the evaluator
/// (keywords) and by the synthesis request (description + negative constraints).
#[derive(Debug, Clone, Copy)]
pub struct ThemeCompanion {
    /// Lowercase words; a narrative passes when any one occurs as a whole word, plural
    /// and case endings allowed ("dragons", "Drachen").
    pub keywords: &'static [&'static str],
    pub description: &'static str,
    pub negative_constraints: &'static str,
}

impl Theme {
    pub const ALL: [Theme; 11] = [
        Theme::Dragons,
        Theme::Unicorns,
        Theme::Dinosaurs,
        Theme::Pirates,
        Theme::Space,
        Theme::Mermaids,
        Theme::Fairies,
        Theme::Knights,
        Theme::Animals,
        Theme::Friendship,
        Theme::Adventure,
    ];

    /// Every label this theme is known by across supported locales, plus its id.
    fn labels(&self) -> &'static [&'static str] {
        match self {
            Theme::Dragons => &["dragons", "dragon", "drachen", "dragones"],
            Theme::Unicorns => &["unicorns", "unicorn", "einhörner", "licornes", "unicornios"],
            Theme::Dinosaurs => &["dinosaurs", "dinosaurier", "dinosaures", "dinosaurios"],
            Theme::Pirates => &["pirates", "piraten", "piratas"],
            Theme::Space => &["space", "weltraum", "espace", "espacio"],
            Theme::Mermaids => &["mermaids", "meerjungfrauen", "sirènes", "sirenas"],
            Theme::Fairies => &["fairies", "feen", "fées", "hadas"],
            Theme::Knights => &["knights", "ritter", "chevaliers", "caballeros"],
            Theme::Animals => &["animals", "tiere", "animaux", "animales"],
            Theme::Friendship => &["friendship", "freundschaft", "amitié", "amistad"],
            Theme::Adventure => &["adventure", "abenteuer", "aventure", "aventura"],
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let needle = normalize(label);
        Theme::ALL
            .into_iter()
            .find(|theme| theme.labels().contains(&needle.as_str()))
    }

    /// English display name, used in prompts.
    pub fn name(&self) -> &'static str {
        match self {
            Theme::Dragons => "Dragons",
            Theme::Unicorns => "Unicorns",
            Theme::Dinosaurs => "Dinosaurs",
            Theme::Pirates => "Pirates",
            Theme::Space => "Space",
            Theme::Mermaids => "Mermaids",
            Theme::Fairies => "Fairies",
            Theme::Knights => "Knights",
            Theme::Animals => "Animals",
            Theme::Friendship => "Friendship",
            Theme::Adventure => "Adventure",
        }
    }

    /// Themes without a concrete companion (animals, friendship, adventure) skip the
    /// companion check entirely.
    pub fn companion(&self) -> Option<ThemeCompanion> {
        match self {
            Theme::Dragons => Some(ThemeCompanion {
                keywords: &["dragon", "drache", "drachen", "dragón"],
                description: "a small, friendly, colourful dragon companion playing beside the children",
                negative_constraints: "no scary or aggressive dragons, no fire aimed at the children",
            }),
            Theme::Unicorns => Some(ThemeCompanion {
                keywords: &["unicorn", "einhorn", "einhörner", "licorne", "unicornio"],
                description: "a gentle unicorn with a shimmering mane standing with the children",
                negative_constraints: "no horses without a horn, no menacing poses",
            }),
            Theme::Dinosaurs => Some(ThemeCompanion {
                keywords: &[
                    "dinosaur",
                    "dinosaurier",
                    "dino",
                    "dinosaure",
                    "dinosaurio",
                    "t-rex",
                ],
                description: "a friendly, round-faced dinosaur companion with the children",
                negative_constraints: "no sharp bared teeth, no hunting scenes",
            }),
            Theme::Pirates => Some(ThemeCompanion {
                keywords: &["parrot", "papagei", "perroquet", "loro", "pirate", "pirat"],
                description: "a cheerful parrot on a small pirate ship with the children",
                negative_constraints: "no weapons pointed at anyone, no skulls",
            }),
            Theme::Space => Some(ThemeCompanion {
                keywords: &["robot", "rocket", "rakete", "fusée", "cohete", "alien", "astronaut"],
                description: "a friendly little robot floating beside the children among the stars",
                negative_constraints: "no frightening aliens, no explosions",
            }),
            Theme::Mermaids => Some(ThemeCompanion {
                keywords: &["mermaid", "meerjungfrau", "sirène", "sirena"],
                description: "a kind mermaid waving to the children from sparkling water",
                negative_constraints: "no dark depths, no sea monsters",
            }),
            Theme::Fairies => Some(ThemeCompanion {
                keywords: &["fairy", "fairies", "fee", "fée", "hada"],
                description: "a tiny glowing fairy fluttering around the children",
                negative_constraints: "no dark or thorny forests",
            }),
            Theme::Knights => Some(ThemeCompanion {
                keywords: &["knight", "ritter", "chevalier", "caballero", "castle", "burg"],
                description: "a friendly knight's pony in front of a storybook castle",
                negative_constraints: "no battles, no drawn swords",
            }),
            Theme::Animals | Theme::Friendship | Theme::Adventure => None,
        }
    }
}

impl TryFrom<String> for Theme {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Theme::from_label(&value).ok_or_else(|| format!("unknown theme '{value}'"))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Style
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum Style {
    Cartoon,
    Watercolor,
    Storybook,
    Animated3d,
    Anime,
    PencilSketch,
}

impl Style {
    pub const ALL: [Style; 6] = [
        Style::Cartoon,
        Style::Watercolor,
        Style::Storybook,
        Style::Animated3d,
        Style::Anime,
        Style::PencilSketch,
    ];

    fn labels(&self) -> &'static [&'static str] {
        match self {
            Style::Cartoon => &["cartoon", "comic", "dessin animé", "dibujos animados"],
            Style::Watercolor => &[
                "watercolor",
                "watercolour",
                "aquarell",
                "aquarelle",
                "acuarela",
            ],
            Style::Storybook => &["storybook", "bilderbuch", "livre d'images", "libro de cuentos"],
            Style::Animated3d => &[
                "animated3d",
                "3d",
                "3d animation",
                "3d-animation",
                "animación 3d",
            ],
            Style::Anime => &["anime", "manga"],
            Style::PencilSketch => &[
                "pencil_sketch",
                "pencil sketch",
                "bleistiftskizze",
                "croquis",
                "boceto a lápiz",
            ],
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let needle = normalize(label);
        Style::ALL
            .into_iter()
            .find(|style| style.labels().contains(&needle.as_str()))
    }

    /// Canonical style name sent to the image services.
    pub fn name(&self) -> &'static str {
        match self {
            Style::Cartoon => "Cartoon",
            Style::Watercolor => "Watercolor",
            Style::Storybook => "Storybook",
            Style::Animated3d => "3D Animation",
            Style::Anime => "Anime",
            Style::PencilSketch => "Pencil Sketch",
        }
    }

    pub fn modifiers(&self) -> &'static str {
        match self {
            Style::Cartoon => "bold clean outlines, flat bright colours, expressive faces",
            Style::Watercolor => "soft watercolour washes, paper texture, gentle pastel palette",
            Style::Storybook => "classic picture-book illustration, warm lighting, rich detail",
            Style::Animated3d => "rounded 3D characters, soft global illumination, cinematic depth",
            Style::Anime => "clean linework, large expressive eyes, vibrant cel shading",
            Style::PencilSketch => "graphite pencil strokes, light cross-hatching, subtle colour accents",
        }
    }
}

impl TryFrom<String> for Style {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Style::from_label(&value).ok_or_else(|| format!("unknown style '{value}'"))
    }
}

fn normalize(label: &str) -> String {
    label.trim().to_lowercase()
}
