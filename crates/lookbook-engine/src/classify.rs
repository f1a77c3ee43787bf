//! Gender, body type and skin tone classification of an uploaded photo.

use std::io::Cursor;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use lookbook_contracts::classification::ClassificationResult;
use lookbook_contracts::descriptors::{BodyType, CLASSIFICATION_SKIN_TONES, FEMALE_BODY_TYPES};
use thiserror::Error;

use crate::error::GenerationError;
use crate::openai::VisionApi;
use crate::retry::{run_with_retry, Jitter, RetryPolicy, Sleeper, ThreadRngJitter, ThreadSleeper};

/// Longest edge sent to the vision model.
pub const MAX_ANALYSIS_DIMENSION: u32 = 2000;
pub const ANALYSIS_JPEG_QUALITY: u8 = 95;

pub const USER_PROMPT: &str = "Please analyze this image and describe the gender, body type, and skin color of the central person.";

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("could not decode uploaded image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("could not re-encode image for analysis: {0}")]
    Encode(#[source] image::ImageError),
    #[error(transparent)]
    Upstream(#[from] GenerationError),
    #[error("classifier returned an unexpected payload: {0}")]
    InvalidResponse(#[from] serde_json::Error),
}

/// Decodes an upload, bounds it to [`MAX_ANALYSIS_DIMENSION`], flattens it
/// to RGB and returns a JPEG data URI.
pub fn prepare_for_analysis(bytes: &[u8]) -> Result<String, ClassifyError> {
    let mut image = image::load_from_memory(bytes).map_err(ClassifyError::Decode)?;
    let (width, height) = image.dimensions();
    tracing::debug!(width, height, "decoded upload");
    if width > MAX_ANALYSIS_DIMENSION || height > MAX_ANALYSIS_DIMENSION {
        image = image.resize(
            MAX_ANALYSIS_DIMENSION,
            MAX_ANALYSIS_DIMENSION,
            FilterType::Lanczos3,
        );
        tracing::debug!(width = image.width(), height = image.height(), "resized upload");
    }

    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut encoded = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut encoded, ANALYSIS_JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(ClassifyError::Encode)?;
    Ok(format!(
        "data:image/jpeg;base64,{}",
        BASE64.encode(encoded.into_inner())
    ))
}

pub fn system_prompt() -> String {
    let male_types = BodyType::ALL
        .iter()
        .map(|body_type| {
            let descriptor = body_type.descriptor();
            format!("- {}: {}", descriptor.name, descriptor.description)
        })
        .collect::<Vec<_>>()
        .join("\n");
    let skin_tones = CLASSIFICATION_SKIN_TONES
        .iter()
        .map(|tone| format!("- {}: {}", tone.name, tone.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are an advanced image analysis AI. Your task is to identify the central person \
in the provided image and classify them based on the given structured schema. \
If no human is present or identifiable, set all attributes to 'N/A' and provide an appropriate message. \
If a human is present then always classify all attributes. Never set any attribute to 'N/A'. \
If multiple people are in the image, focus on the central character. \
The body types with bust size are only for female genders. \
The body types without bust size are only for male genders. \
The body type will be deduced after the gender, to ensure that the classification is correct. \
\nFor males, use these body types with their detailed descriptions:\n{male_types}\n\
For females, use these body types: {female_types}.\n\
\nFor skin color, use these values with their detailed descriptions:\n{skin_tones}\n\
Return the response in this exact JSON format: \
{{'metadata': {{'gender': string, 'body_type': string, 'skin_color': string}}, \
'success': boolean, 'message': string}}",
        female_types = FEMALE_BODY_TYPES.join(", "),
    )
}

pub struct Classifier {
    vision: Arc<dyn VisionApi>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    jitter: Arc<dyn Jitter>,
}

impl Classifier {
    pub fn new(vision: Arc<dyn VisionApi>, policy: RetryPolicy) -> Self {
        Self {
            vision,
            policy,
            sleeper: Arc::new(ThreadSleeper),
            jitter: Arc::new(ThreadRngJitter),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_jitter(mut self, jitter: Arc<dyn Jitter>) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn classify(&self, image_bytes: &[u8]) -> Result<ClassificationResult, ClassifyError> {
        tracing::debug!(bytes = image_bytes.len(), "starting image analysis");
        let data_uri = prepare_for_analysis(image_bytes)?;
        let system = system_prompt();
        let content = run_with_retry(
            &self.policy,
            self.sleeper.as_ref(),
            self.jitter.as_ref(),
            "image classification",
            |_attempt| self.vision.describe_json(&system, USER_PROMPT, &data_uri),
        )?;
        let parsed: ClassificationResult = serde_json::from_str(&content)?;
        let result = parsed.normalized();
        tracing::debug!(?result, "classification finished");
        Ok(result)
    }
}
