use serde::{Deserialize, Serialize};

/// Placeholder the classifier uses for every field when no person is visible.
pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationMetadata {
    pub gender: String,
    pub body_type: String,
    pub skin_color: String,
}

/// Wire shape returned by the vision model and forwarded to HTTP clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub metadata: ClassificationMetadata,
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

impl ClassificationResult {
    pub fn normalized(mut self) -> Self {
        self.metadata.skin_color = normalize_skin_color(&self.metadata.skin_color);
        self
    }

    pub fn person_detected(&self) -> bool {
        self.metadata.body_type != NOT_AVAILABLE
    }
}

const SKIN_SYNONYMS: [(&str, &str); 10] = [
    ("light", "fair-light"),
    ("fair", "fair-light"),
    ("pale", "fair-light"),
    ("fair-light", "fair-light"),
    ("medium", "olive"),
    ("olive", "olive"),
    ("brown", "brown"),
    ("medium-brown", "brown"),
    ("dark", "dark-brown"),
    ("dark-brown", "dark-brown"),
];

/// Lower-cases a skin color and maps known synonyms onto the canonical
/// categories. Unrecognized values pass through lower-cased; the `N/A`
/// sentinel is left untouched.
pub fn normalize_skin_color(raw: &str) -> String {
    if raw == NOT_AVAILABLE {
        return raw.to_string();
    }
    let lowered = raw.to_lowercase();
    SKIN_SYNONYMS
        .iter()
        .find(|(alias, _)| *alias == lowered)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(lowered)
}
