//! Reference image path handling for the head-swap endpoint.
//!
//! Every path handed to the filesystem must stay inside the images root.
//! Containment is checked lexically; symlinks inside the root are trusted.

use std::path::{Component, Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// Pregenerated catalog image for a classified body type and skin color.
pub fn derived_reference_path(body_type: &str, skin_color: &str) -> String {
    format!("bodytypes/headswapper/{body_type}/jordan_red_hoodie_reference_{skin_color}.png")
}

/// True when a client-supplied path tries to climb out with `..`.
pub fn has_parent_reference(raw: &str) -> bool {
    raw.split(['/', '\\']).any(|segment| segment == "..")
}

/// Strips traversal sequences, NUL bytes and surrounding slashes.
pub fn sanitize_reference_path(raw: &str) -> String {
    let mut sanitized = raw.replace('\0', "").replace('\\', "/").replace("..", "");
    while sanitized.contains("//") {
        sanitized = sanitized.replace("//", "/");
    }
    sanitized.trim_matches('/').to_string()
}

/// Joins `relative` onto `base` and normalizes it, refusing anything that
/// ends up outside `base`.
pub fn resolve_within(base: &Path, relative: &str) -> Option<PathBuf> {
    let mut resolved = base.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if resolved.starts_with(base) && resolved != base {
        Some(resolved)
    } else {
        None
    }
}

/// Public URL under which the static route serves `resolved`.
pub fn public_url(base: &Path, resolved: &Path) -> Option<String> {
    let relative = resolved.strip_prefix(base).ok()?;
    let segments: Vec<String> = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(format!("/images/{}", segments.join("/")))
}

/// Inlines `bytes` as a data URI typed after the file's extension.
pub fn file_data_uri(path: &Path, bytes: &[u8]) -> String {
    let ext = path
        .extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("data:image/{ext};base64,{}", BASE64.encode(bytes))
}

/// The user's original upload, always labelled as JPEG for the remote API.
pub fn upload_data_uri(bytes: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", BASE64.encode(bytes))
}
