//! Prompt assembly for body generation and outfit edits.

use lookbook_contracts::descriptors::{body_description, pose_description, skin_description};
use lookbook_contracts::generation::Framing;

const FULL_BODY_PROMPT: &str = "Create a full-body professional fashion photo of a male model.

CRITICAL FRAMING REQUIREMENTS - MUST FOLLOW EXACTLY:
- OUTPUT MUST BE A FULL BODY IMAGE showing the COMPLETE model from HEAD (including ALL HAIR) to TOE (including COMPLETE SHOES)
- The model's entire head, hair, and face MUST be completely visible and clear
- Divide the frame into a 3x3 grid; the head is centered in the middle square of the top row
- There MUST be a FULL empty grid square (33% of frame height) above the head
- Feet rest in the bottom third, well above the bottom edge

CAMERA SETUP AND POSITION:
- Camera at chest height (about 4.5 feet / 137cm from ground), tilted up 5-10 degrees
- Focal length: 85mm equivalent
- Portrait orientation (4:5 ratio)

POSE SELECTION:
- Use the specific pose instructions provided below; do not default to generic poses

BACKGROUND AND LIGHTING:
- Professional studio lighting with realistic SHADOWS matching the background setting from the pose description
- Rim light to highlight figure

CLOTHING:
- Crisp white dress shirt, light gray dress pants, black leather belt

TECHNICAL SPECIFICATIONS:
- 8k quality, photorealistic, sharp focus throughout, no motion blur

FINAL CHECKS: head in the middle square of the top row, full body visible with no cropping, face clearly visible to camera.";

const KNEE_LENGTH_PROMPT: &str = "Create a knee-length (2/3 body) professional fashion photo of a male model.

CRITICAL FRAMING REQUIREMENTS - MUST FOLLOW EXACTLY:
- OUTPUT MUST BE A 2/3 BODY IMAGE showing the model from HEAD (including ALL HAIR) to KNEES
- The model's entire head, hair, and face MUST be completely visible and clear
- Divide the frame into a 3x3 grid; the head is centered in the middle square of the top row
- Knees rest at the bottom edge of the frame; DO NOT show anything below the knees

CAMERA SETUP AND POSITION:
- Camera at chest height (about 4.5 feet / 137cm from ground)
- Focal length: 85mm equivalent
- Portrait orientation (4:5 ratio)

POSE SELECTION:
- Use the specific pose instructions provided below, adapted to knee-length framing
- Hands and arms visible within the frame

BACKGROUND AND LIGHTING:
- Professional studio lighting with realistic SHADOWS matching the background setting from the pose description

CLOTHING:
- Crisp white dress shirt, light gray dress pants, black leather belt

TECHNICAL SPECIFICATIONS:
- 8k quality, photorealistic, sharp focus throughout, no motion blur

FINAL CHECKS: adequate headroom, body visible down to the knees, face clearly visible to camera.";

const FULL_BODY_TRANSFORM_PROMPT: &str = "Create a professional fashion photo by transforming this base body image to wear the tux and tie (if present), bow tie (if present), and the matching shoes, trousers, and socks from the reference fashion image.

THE COLOR AND TEXTURE OF THE TUX AND VEST, POCKET AND LAPEL DETAILS MUST BE EXACTLY THE SAME AS THE FIRST REFERENCE IMAGE.

CRITICAL REQUIREMENTS (MUST FOLLOW EXACTLY):
- DON'T ADD ANY CLOTHING ITEMS other than the ones in the reference image
- Follow the exact patterns of the source garment regarding color, texture, lapel, vest, tie, bow tie, buttons and pockets
- OUTPUT MUST BE A FULL BODY IMAGE showing the COMPLETE model from HEAD (including ALL HAIR) to TOE (including COMPLETE SHOES)
- The model's entire head, hair, and face MUST be completely visible and clear
- PRESERVE the base body's body type, proportions, and skin color
- FOLLOW THE POSE INSTRUCTIONS provided in this prompt

CLOTHING APPLICATION:
- Apply ALL clothing items from the reference exactly as shown
- Maintain the same fit, patterns, textures and color of clothing
- Preserve all product details, tags and buttons

COMPOSITION REQUIREMENTS:
- Complete head WITH FULL HAIR in the top third of the frame
- Complete shoes fully visible at the bottom of the frame
- DO NOT crop any part of the body; if in doubt, zoom out more

IMPORTANT TECHNICAL DETAILS:
- Realistic lighting and SHADOWS using the background setting from the pose description
- Sharp focus throughout; studio-quality for commercial fashion use";

const KNEE_LENGTH_TRANSFORM_PROMPT: &str = "Create a knee-length (2/3 body) professional fashion photo by transforming this base body image to wear the outfit from the reference fashion image.

CRITICAL REQUIREMENTS (MUST FOLLOW EXACTLY):
- DON'T ADD ANY CLOTHING ITEMS other than the ones in the reference image. DON'T ADD A JACKET if the reference image doesn't have one
- OUTPUT MUST BE A 2/3 BODY IMAGE showing the model from HEAD (including ALL HAIR) to KNEES
- The model's entire head, hair, and face MUST be completely visible and clear
- PRESERVE the base body's body type, proportions, and skin color
- FOLLOW THE POSE INSTRUCTIONS provided in this prompt

CLOTHING APPLICATION:
- Apply ALL clothing items from the reference exactly as shown
- Maintain the same fit, patterns, textures and color of clothing

COMPOSITION REQUIREMENTS:
- Complete head WITH FULL HAIR in the top third of the frame
- The frame ends at the knees; DO NOT SHOW BELOW THE KNEES

IMPORTANT TECHNICAL DETAILS:
- Realistic lighting and SHADOWS using the background setting from the pose description
- Sharp focus throughout; studio-quality for commercial fashion use
- Don't add any additional items like sunglasses or hats";

const SMILE_SECTION: &str = "FACIAL EXPRESSION:
- The model MUST have a WARM, GENUINE SMILE
- Eyes slightly crinkled at the corners
- Teeth showing slightly in a friendly manner
- Relaxed, confident demeanor";

const FABRIC_SECTION_SECOND: &str = "
FABRIC DETAILS (CRITICAL - REFER TO REFERENCE IMAGE):
- CAREFULLY EXAMINE the fabric detail image provided as the second reference image
- PRECISELY replicate all fabric textures, patterns, weaves, and material properties shown in the detail image
- MATCH the exact fabric appearance including color variations, sheen, and surface characteristics
- ENSURE all seams, stitching, buttons, and hardware elements are accurately recreated
- APPLY these fabric details consistently across the entire garment
";

const FABRIC_SECTION_THIRD: &str = "
FABRIC DETAILS (CRITICAL - REFER TO THIRD REFERENCE IMAGE):
- CAREFULLY EXAMINE the fabric detail image provided as the third reference
- PRECISELY replicate all fabric textures, patterns, weaves, and material properties shown
- MATCH the exact fabric appearance including color variations, sheen, and surface characteristics
- APPLY these fabric details consistently across the entire garment
";

const CLOSING_NOTE: &str = "
This is for a fashion e-commerce website, so the product appearance must be perfectly preserved with the only change being the model's body type, skin color, pose, and smiling expression.

NOTE: Maintain the exact COLORS and TEXTURE of the tux and vest, pocket and lapel details as shown in the detail image, and don't add any additional items like sunglasses or hats.";

pub fn body_template(framing: Framing) -> &'static str {
    match framing {
        Framing::Full => FULL_BODY_PROMPT,
        Framing::Knee => KNEE_LENGTH_PROMPT,
    }
}

pub fn transform_template(framing: Framing) -> &'static str {
    match framing {
        Framing::Full => FULL_BODY_TRANSFORM_PROMPT,
        Framing::Knee => KNEE_LENGTH_TRANSFORM_PROMPT,
    }
}

/// Inputs shared by every prompt builder.
#[derive(Debug, Clone, Copy)]
pub struct PromptSubject<'a> {
    pub body_type: &'a str,
    pub skin_color: &'a str,
    pub framing: Framing,
}

impl<'a> PromptSubject<'a> {
    pub fn new(body_type: &'a str, skin_color: &'a str, framing: Framing) -> Self {
        Self {
            body_type,
            skin_color,
            framing,
        }
    }

    /// Combined physique and skin sentence used when the caller gives none.
    pub fn default_description(&self) -> String {
        format!(
            "{} with {} skin tone: {}",
            body_description(self.body_type),
            self.skin_color,
            skin_description(self.skin_color)
        )
    }
}

/// Single-step edit of a reference photo into a new body type and skin tone.
pub fn transform_prompt(
    subject: &PromptSubject<'_>,
    description: Option<&str>,
    tux_instructions: Option<&str>,
    with_fabric_detail: bool,
) -> String {
    let description = description
        .map(str::to_string)
        .unwrap_or_else(|| subject.default_description());
    let mut prompt = format!(
        "{template}

CHANGE TO THIS SPECIFIC POSE:
{pose}

CHANGE TO THIS SPECIFIC BODY TYPE AND SKIN COLOR:
- Body type: {body_type}
- Body details: {body_details}
- Skin color: {skin_color}
- Skin color details: {skin_details}

ADDITIONAL DIRECTION:
{description}

{SMILE_SECTION}",
        template = transform_template(subject.framing),
        pose = pose_description(subject.body_type, subject.skin_color),
        body_type = subject.body_type,
        body_details = body_description(subject.body_type),
        skin_color = subject.skin_color,
        skin_details = skin_description(subject.skin_color),
    );
    push_tux_section(&mut prompt, "CRITICAL INSTRUCTIONS For Tux and Vest, Pocket and Lapel Details, etc. APPLY THESE EXACTLY and CAREFULLY and CONSISTENTLY", tux_instructions);
    if with_fabric_detail {
        prompt.push_str(FABRIC_SECTION_SECOND);
    }
    prompt.push_str(CLOSING_NOTE);
    prompt
}

/// Text-to-image prompt for a base body with no garment reference.
pub fn body_variation_prompt(subject: &PromptSubject<'_>, tux_instructions: Option<&str>) -> String {
    let mut prompt = format!(
        "{template}

{details}

{SMILE_SECTION}

POSE INSTRUCTIONS:
{pose}",
        template = body_template(subject.framing),
        details = subject_details(subject),
        pose = pose_description(subject.body_type, subject.skin_color),
    );
    push_tux_section(&mut prompt, "SPECIFIC INSTRUCTIONS For Tux", tux_instructions);
    prompt
}

/// Second step of the two-step flow: dress a base body in the reference outfit.
pub fn outfit_prompt(subject: &PromptSubject<'_>) -> String {
    format!(
        "{template}

{details}

{SMILE_SECTION}

POSE INSTRUCTIONS:
{pose}",
        template = transform_template(subject.framing),
        details = subject_details(subject),
        pose = pose_description(subject.body_type, subject.skin_color),
    )
}

/// Appended to an outfit prompt when a fabric close-up rides along as the
/// third input image.
pub fn outfit_fabric_section() -> &'static str {
    FABRIC_SECTION_THIRD
}

fn subject_details(subject: &PromptSubject<'_>) -> String {
    format!(
        "BODY TYPE: {}\nBODY TYPE DETAILS: {}\n\nSKIN COLOR: {}\nSKIN COLOR DETAILS: {}",
        subject.body_type,
        body_description(subject.body_type),
        subject.skin_color,
        skin_description(subject.skin_color)
    )
}

fn push_tux_section(prompt: &mut String, heading: &str, tux_instructions: Option<&str>) {
    let Some(instructions) = tux_instructions.map(str::trim).filter(|value| !value.is_empty())
    else {
        return;
    };
    prompt.push_str("\n\n");
    prompt.push_str(heading);
    prompt.push_str(":\n");
    prompt.push_str(instructions);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framing_selects_template() {
        let full = PromptSubject::new("slim", "olive", Framing::Full);
        let knee = PromptSubject::new("slim", "olive", Framing::Knee);
        assert!(transform_prompt(&full, None, None, false).starts_with(FULL_BODY_TRANSFORM_PROMPT));
        assert!(transform_prompt(&knee, None, None, false).starts_with(KNEE_LENGTH_TRANSFORM_PROMPT));
        assert!(body_variation_prompt(&knee, None).starts_with(KNEE_LENGTH_PROMPT));
    }

    #[test]
    fn transform_prompt_carries_descriptors_and_optional_sections() {
        let subject = PromptSubject::new("stocky", "tan", Framing::Full);
        let plain = transform_prompt(&subject, None, None, false);
        assert!(plain.contains("- Body type: stocky"));
        assert!(plain.contains("Stocky build with solid frame"));
        assert!(plain.contains("Warm tan to light-brown skin"));
        assert!(plain.contains("New York City"));
        assert!(!plain.contains("FABRIC DETAILS"));
        assert!(!plain.contains("CRITICAL INSTRUCTIONS For Tux"));

        let rich = transform_prompt(&subject, Some("broad shoulders"), Some("peak lapel"), true);
        assert!(rich.contains("ADDITIONAL DIRECTION:\nbroad shoulders"));
        assert!(rich.contains("peak lapel"));
        assert!(rich.contains("second reference image"));
        assert!(rich.ends_with(CLOSING_NOTE));
    }

    #[test]
    fn unknown_keys_still_produce_a_prompt() {
        let subject = PromptSubject::new("lanky", "sunburnt", Framing::Full);
        let prompt = body_variation_prompt(&subject, Some("   "));
        assert!(prompt.contains("BODY TYPE DETAILS: lanky body type"));
        assert!(prompt.contains("sunburnt skin tone with natural undertones"));
        assert!(!prompt.contains("SPECIFIC INSTRUCTIONS For Tux"));
    }

    #[test]
    fn default_description_names_the_skin_tone() {
        let subject = PromptSubject::new("average", "olive", Framing::Knee);
        let description = subject.default_description();
        assert!(description.starts_with("Average build"));
        assert!(description.contains("with olive skin tone: Medium skin"));
    }
}
