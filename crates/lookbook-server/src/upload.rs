use axum::extract::multipart::{Multipart, MultipartError};
use axum::http::StatusCode;

use crate::error::ApiError;

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const ALLOWED_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "gif", "bmp", "webp"];

#[derive(Debug, Default)]
pub struct UploadForm {
    pub image: Option<RawUpload>,
    pub reference_image: Option<String>,
}

#[derive(Debug)]
pub struct RawUpload {
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

/// An upload that passed every check.
#[derive(Debug)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

pub async fn read_form(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name() {
            Some("image") => {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?;
                form.image = Some(RawUpload {
                    file_name,
                    bytes: bytes.to_vec(),
                });
            }
            Some("reference_image") => {
                let value = field.text().await.map_err(multipart_error)?;
                form.reference_image = Some(value).filter(|value| !value.is_empty());
            }
            _ => {}
        }
    }
    Ok(form)
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::FileTooLarge;
    }
    tracing::warn!(error = %err.body_text(), "rejected multipart body");
    ApiError::MalformedUpload
}

/// Checks presence, extension, size and emptiness, in that order.
pub fn validate_upload(upload: Option<RawUpload>) -> Result<ImageUpload, ApiError> {
    let upload = upload.ok_or(ApiError::MissingImage)?;
    let file_name = upload.file_name.unwrap_or_default();
    if !has_allowed_extension(&file_name) {
        return Err(ApiError::InvalidFileType);
    }
    if upload.bytes.len() > MAX_UPLOAD_BYTES {
        return Err(ApiError::FileTooLarge);
    }
    if upload.bytes.is_empty() {
        return Err(ApiError::EmptyFile);
    }
    Ok(ImageUpload {
        file_name,
        bytes: upload.bytes,
    })
}

fn has_allowed_extension(file_name: &str) -> bool {
    let lowered = file_name.to_lowercase();
    ALLOWED_EXTENSIONS
        .iter()
        .any(|ext| lowered.ends_with(&format!(".{ext}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str, len: usize) -> Option<RawUpload> {
        Some(RawUpload {
            file_name: Some(name.to_string()),
            bytes: vec![1; len],
        })
    }

    #[test]
    fn checks_run_in_order() {
        assert!(matches!(validate_upload(None), Err(ApiError::MissingImage)));
        assert!(matches!(
            validate_upload(raw("notes.txt", MAX_UPLOAD_BYTES + 1)),
            Err(ApiError::InvalidFileType)
        ));
        assert!(matches!(
            validate_upload(raw("photo.JPG", MAX_UPLOAD_BYTES + 1)),
            Err(ApiError::FileTooLarge)
        ));
        assert!(matches!(
            validate_upload(raw("photo.webp", 0)),
            Err(ApiError::EmptyFile)
        ));
    }

    #[test]
    fn nameless_parts_are_not_images() {
        let upload = Some(RawUpload {
            file_name: None,
            bytes: vec![1, 2, 3],
        });
        assert!(matches!(
            validate_upload(upload),
            Err(ApiError::InvalidFileType)
        ));
    }

    #[test]
    fn exactly_ten_megabytes_is_accepted() {
        let accepted = validate_upload(raw("photo.png", MAX_UPLOAD_BYTES));
        assert_eq!(accepted.map(|upload| upload.bytes.len()).ok(), Some(MAX_UPLOAD_BYTES));
    }
}
