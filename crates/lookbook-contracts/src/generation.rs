use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Upper bound on images attached to one edit call: subject, garment
/// reference and an optional fabric close-up.
pub const MAX_REFERENCE_IMAGES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImageSize {
    #[serde(rename = "1024x1024")]
    Square,
    #[default]
    #[serde(rename = "1024x1536")]
    Portrait,
    #[serde(rename = "1536x1024")]
    Landscape,
    #[serde(rename = "auto")]
    Auto,
}

impl ImageSize {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageSize::Square => "1024x1024",
            ImageSize::Portrait => "1024x1536",
            ImageSize::Landscape => "1536x1024",
            ImageSize::Auto => "auto",
        }
    }
}

impl FromStr for ImageSize {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1024x1024" => Ok(ImageSize::Square),
            "1024x1536" => Ok(ImageSize::Portrait),
            "1536x1024" => Ok(ImageSize::Landscape),
            "auto" => Ok(ImageSize::Auto),
            other => Err(format!(
                "unsupported image size '{other}' (expected 1024x1024, 1024x1536, 1536x1024 or auto)"
            )),
        }
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    #[default]
    Medium,
    High,
}

impl Quality {
    pub fn as_str(self) -> &'static str {
        match self {
            Quality::Low => "low",
            Quality::Medium => "medium",
            Quality::High => "high",
        }
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Quality::Low),
            "medium" => Ok(Quality::Medium),
            "high" => Ok(Quality::High),
            other => Err(format!("unsupported quality '{other}' (expected low, medium or high)")),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    #[default]
    Full,
    Knee,
}

impl Framing {
    pub fn label(self) -> &'static str {
        match self {
            Framing::Full => "Full body",
            Framing::Knee => "Knee-length (2/3 body)",
        }
    }
}

impl FromStr for Framing {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Framing::Full),
            "knee" => Ok(Framing::Knee),
            other => Err(format!("unsupported framing '{other}' (expected full or knee)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Generate,
    Edit,
}

/// An image attached to an edit call, already read into memory.
#[derive(Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ReferenceImage {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or("image.png")
            .to_string();
        Ok(Self { file_name, bytes })
    }

    pub fn mime_type(&self) -> Option<&'static str> {
        mime_for_path(Path::new(&self.file_name))
    }
}

impl fmt::Debug for ReferenceImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceImage")
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub size: ImageSize,
    pub quality: Quality,
    pub reference_images: Vec<ReferenceImage>,
}

impl GenerationRequest {
    pub fn generate(prompt: impl Into<String>, size: ImageSize, quality: Quality) -> Self {
        Self {
            prompt: prompt.into(),
            size,
            quality,
            reference_images: Vec::new(),
        }
    }

    pub fn edit(
        prompt: impl Into<String>,
        reference_images: Vec<ReferenceImage>,
        size: ImageSize,
        quality: Quality,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            size,
            quality,
            reference_images,
        }
    }

    /// Any attached reference image turns the call into an edit.
    pub fn operation(&self) -> Operation {
        if self.reference_images.is_empty() {
            Operation::Generate
        } else {
            Operation::Edit
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    pub image_bytes: Vec<u8>,
    pub saved_path: Option<PathBuf>,
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_follows_reference_images() {
        let generate = GenerationRequest::generate("a", ImageSize::Portrait, Quality::Medium);
        assert_eq!(generate.operation(), Operation::Generate);

        let edit = GenerationRequest::edit(
            "a",
            vec![ReferenceImage::new("ref.png", vec![1, 2, 3])],
            ImageSize::Portrait,
            Quality::High,
        );
        assert_eq!(edit.operation(), Operation::Edit);
    }

    #[test]
    fn parses_cli_spellings() {
        assert_eq!("1536x1024".parse::<ImageSize>(), Ok(ImageSize::Landscape));
        assert_eq!(" HIGH ".parse::<Quality>(), Ok(Quality::High));
        assert_eq!("knee".parse::<Framing>(), Ok(Framing::Knee));
        assert!("512x512".parse::<ImageSize>().is_err());
        assert!("ultra".parse::<Quality>().is_err());
    }

    #[test]
    fn reference_image_reads_name_and_mime() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("hoodie.JPG");
        std::fs::write(&path, b"jpg")?;
        let image = ReferenceImage::from_path(&path)?;
        assert_eq!(image.file_name, "hoodie.JPG");
        assert_eq!(image.mime_type(), Some("image/jpeg"));
        assert_eq!(image.bytes, b"jpg");
        Ok(())
    }

    #[test]
    fn serde_uses_wire_spellings() -> anyhow::Result<()> {
        assert_eq!(serde_json::to_string(&ImageSize::Portrait)?, "\"1024x1536\"");
        assert_eq!(serde_json::to_string(&Quality::Low)?, "\"low\"");
        assert_eq!(serde_json::to_string(&Framing::Knee)?, "\"knee\"");
        Ok(())
    }
}
