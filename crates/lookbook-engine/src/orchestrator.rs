//! Catalog flows built on top of [`GenerationClient`]: direct reference
//! transforms, base body generation, the two-step base-then-outfit flow and
//! the base body library.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use lookbook_contracts::descriptors::{BodyType, LIBRARY_SKIN_COLORS};
use lookbook_contracts::generation::{Framing, ImageSize, Quality, ReferenceImage};

use crate::client::GenerationClient;
use crate::config::EngineConfig;
use crate::error::GenerationError;
use crate::prompts::{self, PromptSubject};
use crate::retry::{Sleeper, ThreadSleeper};

pub const DEFAULT_SKIN_COLOR: &str = "light";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformRequest {
    pub reference_image: PathBuf,
    pub body_type: String,
    pub skin_color: String,
    pub description: Option<String>,
    pub output_file: Option<PathBuf>,
    pub fabric_detail_image: Option<PathBuf>,
    pub framing: Framing,
    pub tux_instructions: Option<String>,
}

impl TransformRequest {
    pub fn new(
        reference_image: impl Into<PathBuf>,
        body_type: impl Into<String>,
        skin_color: impl Into<String>,
    ) -> Self {
        Self {
            reference_image: reference_image.into(),
            body_type: body_type.into(),
            skin_color: skin_color.into(),
            description: None,
            output_file: None,
            fabric_detail_image: None,
            framing: Framing::Full,
            tux_instructions: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_output(mut self, output_file: impl Into<PathBuf>) -> Self {
        self.output_file = Some(output_file.into());
        self
    }

    pub fn with_fabric_detail(mut self, fabric_detail_image: impl Into<PathBuf>) -> Self {
        self.fabric_detail_image = Some(fabric_detail_image.into());
        self
    }

    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    pub fn with_tux_instructions(mut self, tux_instructions: impl Into<String>) -> Self {
        self.tux_instructions = Some(tux_instructions.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariationRequest {
    pub reference_image: PathBuf,
    pub body_type: String,
    /// Free text; the skin tone is read from a "<word> skin tone" phrase.
    pub description: String,
    pub output_file: Option<PathBuf>,
    pub base_library: Option<PathBuf>,
    pub fabric_detail_image: Option<PathBuf>,
    pub framing: Framing,
    pub tux_instructions: Option<String>,
}

impl VariationRequest {
    pub fn new(
        reference_image: impl Into<PathBuf>,
        body_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            reference_image: reference_image.into(),
            body_type: body_type.into(),
            description: description.into(),
            output_file: None,
            base_library: None,
            fabric_detail_image: None,
            framing: Framing::Full,
            tux_instructions: None,
        }
    }
}

/// Which combinations `generate_base_body_library` renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryPlan {
    pub body_types: Vec<String>,
    pub skin_colors: Vec<String>,
    pub poses_per_combination: u32,
    pub quality: Option<Quality>,
}

impl Default for LibraryPlan {
    fn default() -> Self {
        Self {
            body_types: BodyType::ALL.iter().map(|body| body.key().to_string()).collect(),
            skin_colors: LIBRARY_SKIN_COLORS.iter().map(|skin| skin.to_string()).collect(),
            poses_per_combination: 1,
            quality: None,
        }
    }
}

pub struct Transformer {
    client: GenerationClient,
    size: ImageSize,
    quality: Quality,
    cooldown: Duration,
    temp_dir: PathBuf,
    use_fabric_details: bool,
    cooldown_sleeper: Arc<dyn Sleeper>,
}

impl Transformer {
    pub fn new(client: GenerationClient, config: &EngineConfig) -> Self {
        Self {
            client,
            size: config.size,
            quality: config.quality,
            cooldown: config.cooldown,
            temp_dir: config.temp_dir.clone(),
            use_fabric_details: config.use_fabric_details,
            cooldown_sleeper: Arc::new(ThreadSleeper),
        }
    }

    pub fn with_cooldown_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.cooldown_sleeper = sleeper;
        self
    }

    /// Edits the reference photo into the requested body type and skin tone.
    ///
    /// A successful edit is followed by the configured cooldown so that
    /// back-to-back batch items stay under the provider's rate limits.
    pub fn transform_reference_image(
        &self,
        request: &TransformRequest,
    ) -> Result<Vec<u8>, GenerationError> {
        tracing::info!(
            reference = %request.reference_image.display(),
            body_type = %request.body_type,
            skin_color = %request.skin_color,
            framing = request.framing.label(),
            "transforming reference image"
        );
        let subject = PromptSubject::new(&request.body_type, &request.skin_color, request.framing);
        let prompt = prompts::transform_prompt(
            &subject,
            request.description.as_deref(),
            request.tux_instructions.as_deref(),
            request.fabric_detail_image.is_some(),
        );

        let mut images = vec![read_reference(&request.reference_image)?];
        if let Some(fabric) = &request.fabric_detail_image {
            tracing::info!(fabric = %fabric.display(), "including fabric detail image");
            images.push(read_reference(fabric)?);
        }

        let result = self.client.edit(
            &prompt,
            images,
            self.size,
            self.quality,
            request.output_file.as_deref(),
        )?;

        if !self.cooldown.is_zero() {
            tracing::info!(
                cooldown_secs = self.cooldown.as_secs(),
                "waiting before the next generation"
            );
            self.cooldown_sleeper.sleep(self.cooldown);
        }
        Ok(result.image_bytes)
    }

    /// Generates a base body with no garment reference. Failures are logged
    /// and reported as `None`.
    pub fn generate_body_variation(
        &self,
        body_type: &str,
        skin_color: &str,
        output_file: Option<&Path>,
        framing: Framing,
        tux_instructions: Option<&str>,
    ) -> Option<PathBuf> {
        let target = output_file
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.temp_dir.join(format!("temp_body_{body_type}_{skin_color}.jpg")));
        let subject = PromptSubject::new(body_type, skin_color, framing);
        let prompt = prompts::body_variation_prompt(&subject, tux_instructions);

        match self
            .client
            .generate(&prompt, self.size, self.quality, Some(&target))
        {
            Ok(_) => Some(target),
            Err(err) => {
                tracing::error!(body_type, skin_color, error = %err, "body variation failed");
                None
            }
        }
    }

    /// Two-step flow: find or generate a base body, then dress it in the
    /// reference outfit. Failures are logged and reported as `None`.
    pub fn generate_variation_with_reference(&self, request: &VariationRequest) -> Option<PathBuf> {
        let skin_color = extract_skin_color(&request.description);
        let body_type = request.body_type.as_str();
        tracing::info!(
            reference = %request.reference_image.display(),
            body_type,
            skin_color = %skin_color,
            framing = request.framing.label(),
            "generating variation with reference"
        );

        let reused = request
            .base_library
            .as_deref()
            .and_then(|library| find_base_body(library, body_type, &skin_color));
        let base_body = match reused {
            Some(path) => {
                tracing::info!(base_body = %path.display(), "using pre-generated base body");
                path
            }
            None => {
                let temp_dir = request
                    .output_file
                    .as_deref()
                    .and_then(Path::parent)
                    .map(|parent| parent.join("temp"))
                    .unwrap_or_else(|| self.temp_dir.clone());
                let target = temp_dir.join(format!("base_body_{body_type}_{skin_color}.jpg"));
                self.generate_body_variation(
                    body_type,
                    &skin_color,
                    Some(&target),
                    request.framing,
                    request.tux_instructions.as_deref(),
                )?
            }
        };

        let output = request.output_file.clone().unwrap_or_else(|| {
            self.temp_dir
                .join(format!("variation_{body_type}_{skin_color}.jpg"))
        });
        let subject = PromptSubject::new(body_type, &skin_color, request.framing);
        let prompt = prompts::outfit_prompt(&subject);
        match self.apply_outfit(
            &base_body,
            &request.reference_image,
            &prompt,
            &output,
            request.fabric_detail_image.as_deref(),
        ) {
            Ok(_) => Some(output),
            Err(err) => {
                tracing::error!(body_type, error = %err, "outfit application failed");
                None
            }
        }
    }

    /// Edit call with `[base body, reference, fabric detail?]`.
    pub fn apply_outfit(
        &self,
        base_body: &Path,
        reference_image: &Path,
        prompt: &str,
        output_file: &Path,
        fabric_detail_image: Option<&Path>,
    ) -> Result<Vec<u8>, GenerationError> {
        let mut prompt = prompt.to_string();
        let mut images = vec![read_reference(base_body)?, read_reference(reference_image)?];
        if let Some(fabric) = fabric_detail_image {
            prompt.push_str(prompts::outfit_fabric_section());
            images.push(read_reference(fabric)?);
        }
        let result = self
            .client
            .edit(&prompt, images, self.size, self.quality, Some(output_file))?;
        Ok(result.image_bytes)
    }

    /// Renders every planned body type, skin color and pose into
    /// `<output_dir>/<body>_<skin>/base_body_<body>_<skin>_pose<N>.jpg`.
    ///
    /// Existing files are kept and reported, so an interrupted run resumes
    /// where it stopped. Unknown body types are skipped.
    pub fn generate_base_body_library(
        &self,
        output_dir: &Path,
        plan: &LibraryPlan,
    ) -> Result<IndexMap<String, Vec<PathBuf>>, GenerationError> {
        create_dir(output_dir)?;
        let quality = plan.quality.unwrap_or(self.quality);
        let total =
            plan.body_types.len() * plan.skin_colors.len() * plan.poses_per_combination as usize;
        tracing::info!(
            total,
            body_types = plan.body_types.len(),
            skin_colors = plan.skin_colors.len(),
            poses = plan.poses_per_combination,
            "generating base body library"
        );

        let mut library = IndexMap::new();
        let mut count = 0usize;
        for body_type in &plan.body_types {
            if BodyType::from_key(body_type).is_none() {
                tracing::warn!(body_type = %body_type, "unknown body type, skipping");
                continue;
            }
            for skin_color in &plan.skin_colors {
                let key = format!("{body_type}_{skin_color}");
                let combination_dir = output_dir.join(&key);
                create_dir(&combination_dir)?;

                let subject = PromptSubject::new(body_type, skin_color, Framing::Full);
                let prompt = prompts::body_variation_prompt(&subject, None);
                let mut images = Vec::new();
                for pose in 1..=plan.poses_per_combination {
                    count += 1;
                    let target =
                        combination_dir.join(format!("base_body_{key}_pose{pose}.jpg"));
                    if target.exists() {
                        tracing::info!(path = %target.display(), "base body already exists");
                        images.push(target);
                        continue;
                    }
                    tracing::info!(count, total, body_type = %body_type, skin_color = %skin_color, pose, "generating base body");
                    match self.client.generate(&prompt, self.size, quality, Some(&target)) {
                        Ok(_) => images.push(target),
                        Err(err) => {
                            tracing::error!(body_type = %body_type, skin_color = %skin_color, pose, error = %err, "base body generation failed");
                        }
                    }
                }
                library.insert(key, images);
            }
        }
        tracing::info!(count, "base body library finished");
        Ok(library)
    }

    /// Looks for `<code>*_FABRIC*.jpg`, then any `<code>*.jpg`, in `dir`.
    pub fn find_fabric_detail_image(&self, product_code: &str, dir: &Path) -> Option<PathBuf> {
        if !self.use_fabric_details {
            return None;
        }
        if !dir.is_dir() {
            tracing::warn!(dir = %dir.display(), "fabric details directory not found");
            return None;
        }
        let found = first_match(dir, &format!("{product_code}*_FABRIC*.jpg"))
            .or_else(|| first_match(dir, &format!("{product_code}*.jpg")));
        match &found {
            Some(path) => tracing::info!(path = %path.display(), "found fabric detail image"),
            None => tracing::info!(product_code, "no fabric detail image found"),
        }
        found
    }
}

/// Reads the skin tone out of a "<word> skin tone" phrase, defaulting to
/// [`DEFAULT_SKIN_COLOR`].
pub fn extract_skin_color(description: &str) -> String {
    let lowered = description.to_lowercase();
    let tokens: Vec<&str> = lowered.split_whitespace().collect();
    for (index, pair) in tokens.windows(2).enumerate() {
        if pair[1] != "skin" {
            continue;
        }
        let follows_tone = tokens
            .get(index + 2)
            .map(|next| next.starts_with("tone"))
            .unwrap_or(false);
        if !follows_tone {
            continue;
        }
        let word: String = pair[0]
            .chars()
            .rev()
            .take_while(|ch| ch.is_alphanumeric() || *ch == '_')
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        if !word.is_empty() {
            return word;
        }
    }
    DEFAULT_SKIN_COLOR.to_string()
}

fn find_base_body(library: &Path, body_type: &str, skin_color: &str) -> Option<PathBuf> {
    let found = first_match(library, &format!("*{body_type}*{skin_color}*.jpg"));
    if found.is_none() {
        tracing::info!(body_type, skin_color, "no pre-generated base body found");
    }
    found
}

/// Lexicographically first file in `dir` whose name matches `pattern`.
fn first_match(dir: &Path, pattern: &str) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    let mut matches: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map(|kind| kind.is_file()).unwrap_or(false))
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|name| glob_match::glob_match(pattern, name))
                .unwrap_or(false)
        })
        .map(|entry| entry.path())
        .collect();
    matches.sort();
    matches.into_iter().next()
}

fn read_reference(path: &Path) -> Result<ReferenceImage, GenerationError> {
    ReferenceImage::from_path(path).map_err(|source| GenerationError::ReadInput {
        path: path.to_path_buf(),
        source,
    })
}

fn create_dir(path: &Path) -> Result<(), GenerationError> {
    fs::create_dir_all(path).map_err(|source| GenerationError::WriteOutput {
        path: path.to_path_buf(),
        source,
    })
}
