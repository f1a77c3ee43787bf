use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use lookbook_contracts::generation::{ImageSize, Quality};

use crate::retry::RetryPolicy;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_IMAGE_MODEL: &str = "gpt-image-1";
pub const DEFAULT_VISION_MODEL: &str = "gpt-4o";
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

/// Settings shared by the generation client, orchestrator and classifier.
/// Built once at startup and handed to each component.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub api_key: String,
    pub api_base: String,
    pub image_model: String,
    pub vision_model: String,
    pub size: ImageSize,
    pub quality: Quality,
    pub retry: RetryPolicy,
    pub cooldown: Duration,
    pub temp_dir: PathBuf,
    pub request_timeout: Duration,
    pub use_fabric_details: bool,
}

impl EngineConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            size: ImageSize::Portrait,
            quality: Quality::Medium,
            retry: RetryPolicy::default(),
            cooldown: DEFAULT_COOLDOWN,
            temp_dir: PathBuf::from("temp"),
            request_timeout: Duration::from_secs(300),
            use_fabric_details: false,
        }
    }

    /// Reads `OPENAI_API_KEY` (required) plus optional overrides.
    pub fn from_env() -> Result<Self> {
        let Some(api_key) = non_empty_env("OPENAI_API_KEY") else {
            bail!(
                "OPENAI_API_KEY environment variable is required. \
                 Please set it in your environment or .env file."
            );
        };
        let mut config = Self::new(api_key);
        if let Some(base) = non_empty_env("OPENAI_API_BASE") {
            config.api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(model) = non_empty_env("LOOKBOOK_IMAGE_MODEL") {
            config.image_model = model;
        }
        if let Some(model) = non_empty_env("LOOKBOOK_VISION_MODEL") {
            config.vision_model = model;
        }
        if let Some(quality) = non_empty_env("LOOKBOOK_IMAGE_QUALITY") {
            config.quality = quality.parse().map_err(anyhow::Error::msg)?;
        }
        if let Some(dir) = non_empty_env("LOOKBOOK_TEMP_DIR") {
            config.temp_dir = PathBuf::from(dir);
        }
        Ok(config)
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_size(mut self, size: ImageSize) -> Self {
        self.size = size;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = temp_dir.into();
        self
    }

    pub fn with_fabric_details(mut self, enabled: bool) -> Self {
        self.use_fabric_details = enabled;
        self
    }
}

pub fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
