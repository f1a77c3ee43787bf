//! Static body-type and skin-tone tables used to parameterize prompts.
//!
//! Lookups by key never fail: unknown keys fall back to a generic phrase
//! built from the key itself.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyDescriptor {
    pub name: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkinDescriptor {
    pub name: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BodyType {
    Slim,
    Average,
    Athletic,
    Muscular,
    Stocky,
    Dadbod,
    Overweight,
}

impl BodyType {
    pub const ALL: [BodyType; 7] = [
        BodyType::Slim,
        BodyType::Average,
        BodyType::Athletic,
        BodyType::Muscular,
        BodyType::Stocky,
        BodyType::Dadbod,
        BodyType::Overweight,
    ];

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|body_type| body_type.key() == key)
    }

    pub fn key(self) -> &'static str {
        self.descriptor().name
    }

    pub fn descriptor(self) -> &'static BodyDescriptor {
        &BODY_DESCRIPTORS[self as usize]
    }
}

// Indexed by `BodyType as usize`; keep the order in sync with the enum.
static BODY_DESCRIPTORS: [BodyDescriptor; 7] = [
    BodyDescriptor {
        name: "slim",
        description: "Slim build with lean frame, 5'11\" tall. Naturally thin physique with long limbs and lighter muscle definition. Narrow shoulders and slim waist. Defined facial features with high cheekbones and angular jawline.",
    },
    BodyDescriptor {
        name: "average",
        description: "Average build with typical proportions, 5'10\" tall. Balanced frame with moderate shoulder width and natural body composition. Neither particularly muscular nor slim. Friendly, approachable facial features with warm expression.",
    },
    BodyDescriptor {
        name: "athletic",
        description: "Athletic build with balanced muscle definition, 5'11\" tall. Well-proportioned with broad shoulders, defined chest, and tapered waist. Natural muscle tone without being overly bulky. Classic handsome features with defined jawline.",
    },
    BodyDescriptor {
        name: "muscular",
        description: "Muscular build with strong physique, 6'0\" tall. Broad shoulders, well-developed chest, and visible muscle mass. Powerful frame with defined musculature. Strong facial features with masculine jawline and confident expression.",
    },
    BodyDescriptor {
        name: "stocky",
        description: "Stocky build with solid frame, 5'9\" tall. Broader, heavier set physique with strong core and natural strength. Wider shoulders and chest with sturdy limbs. Strong facial features with rounded jawline and confident bearing.",
    },
    BodyDescriptor {
        name: "dadbod",
        description: "Comfortable dad bod physique, 5'10\" tall. Natural, relaxed build with softer midsection and broad shoulders. Strong arms with everyday muscle tone. Warm, friendly facial features with kind eyes and welcoming smile.",
    },
    BodyDescriptor {
        name: "overweight",
        description: "Overweight build with substantial frame, 5'11\" tall. Full, well-proportioned frame with natural strength. Broad shoulders and chest with substantial build. Strong facial features with confident, approachable expression.",
    },
];

/// Skin tones used when writing generation prompts.
pub static PROMPT_SKIN_TONES: [SkinDescriptor; 8] = [
    SkinDescriptor {
        name: "porcelain",
        description: "Nearly translucent, very-fair skin with cool pink-or-peach hue; freckles possible",
    },
    SkinDescriptor {
        name: "fair-light",
        description: "Light but less translucent skin with neutral to soft peach warmth",
    },
    SkinDescriptor {
        name: "light-beige",
        description: "Light-medium beige skin with subtle golden warmth; tans slowly",
    },
    SkinDescriptor {
        name: "medium",
        description: "True medium depth skin with balanced golden glow and even tone",
    },
    SkinDescriptor {
        name: "olive",
        description: "Medium skin with green-yellow cast; rarely burns",
    },
    SkinDescriptor {
        name: "tan",
        description: "Warm tan to light-brown skin with golden or reddish warmth; tans easily",
    },
    SkinDescriptor {
        name: "brown",
        description: "Medium-deep brown skin with rich red-brown warmth and smooth tone",
    },
    SkinDescriptor {
        name: "deep",
        description: "Very deep brown to ebony skin with cool blue-red lowlights and high melanin. Fitzpatrick VI.",
    },
];

/// The closed set of skin tones the classifier is allowed to answer with.
pub static CLASSIFICATION_SKIN_TONES: [SkinDescriptor; 4] = [
    SkinDescriptor {
        name: "fair-light",
        description: "Fair to light skin tone with pale to light complexion. Often has pink, peach, or neutral undertones. May have visible veins and burns easily in sun. Classic European, Northern European, or East Asian light complexion.",
    },
    SkinDescriptor {
        name: "olive",
        description: "Medium olive skin tone with green, yellow, or golden undertones. Often associated with Mediterranean, Middle Eastern, Hispanic, or mixed heritage. Naturally warm complexion that tans easily.",
    },
    SkinDescriptor {
        name: "brown",
        description: "Warm medium brown skin tone with golden, red, or warm undertones. Common in African American, Hispanic, Middle Eastern, South Asian, or mixed heritage individuals. Rich, healthy complexion.",
    },
    SkinDescriptor {
        name: "dark-brown",
        description: "Rich dark brown skin tone with deep warm undertones. Beautiful deep complexion often seen in African, African American, or South Asian heritage. Natural luminous quality with golden or red undertones.",
    },
];

pub static FEMALE_BODY_TYPES: [&str; 30] = [
    "smallbust-slim",
    "mediumbust-slim",
    "largebust-slim",
    "smallbust-athletic",
    "mediumbust-athletic",
    "largebust-athletic",
    "smallbust-pear",
    "mediumbust-pear",
    "mediumbust-curvy",
    "mediumbust-hourglass",
    "largebust-curvy",
    "largebust-hourglass",
    "smallbust-topheavy",
    "mediumbust-topheavy",
    "largebust-topheavy",
    "smallbust-apple",
    "mediumbust-apple",
    "largebust-apple",
    "smallbust-average",
    "mediumbust-average",
    "largebust-average",
    "smallbust-plus",
    "mediumbust-plus",
    "largebust-plus",
    "smallbust-petite",
    "mediumbust-petite",
    "largebust-petite",
    "smallbust-tall",
    "mediumbust-tall",
    "largebust-tall",
];

/// Skin tones rendered by the batch command, matching the classifier's categories.
pub const BATCH_SKIN_COLORS: [&str; 4] = ["fair-light", "olive", "brown", "dark-brown"];

/// Default skin tones for the base body library.
pub const LIBRARY_SKIN_COLORS: [&str; 7] =
    ["fair", "light", "medium", "olive", "tan", "brown", "dark"];

const FIXED_POSE: &str = "Model is standing naturally and facing the camera on a city sidewalk in New York City. \
Arms relaxed at sides or lightly interacting with the hoodie (e.g., adjusting sleeve or pocket). \
Face clearly visible, neutral or confident expression. \
Urban sidewalk, red-brick buildings, and storefronts in soft focus. \
Bright diffused daylight, realistic lighting and shadows. \
No snow, no winter elements, no ski resort.";

pub fn find_body_descriptor(key: &str) -> Option<&'static BodyDescriptor> {
    BodyType::from_key(key).map(BodyType::descriptor)
}

pub fn find_skin_descriptor(key: &str) -> Option<&'static SkinDescriptor> {
    let lowered = key.to_lowercase();
    PROMPT_SKIN_TONES
        .iter()
        .find(|descriptor| descriptor.name == lowered)
}

pub fn body_description(key: &str) -> String {
    match find_body_descriptor(key) {
        Some(descriptor) => descriptor.description.to_string(),
        None => format!("{key} body type"),
    }
}

pub fn skin_description(key: &str) -> String {
    match find_skin_descriptor(key) {
        Some(descriptor) => descriptor.description.to_string(),
        None => format!("{key} skin tone with natural undertones"),
    }
}

/// Scene and pose text for a body/skin combination.
///
/// Every combination currently maps to the same urban-daylight scene.
pub fn pose_description(_body_type: &str, _skin_color: &str) -> &'static str {
    FIXED_POSE
}
