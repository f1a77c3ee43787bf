//! Client for the remote head-swap service.

use std::time::Duration;

use anyhow::Context;
use lookbook_contracts::classification::ClassificationMetadata;
use reqwest::blocking::Client as HttpClient;
use serde::Serialize;
use serde_json::Value;

use crate::error::UpstreamError;

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
pub const SWAP_TIMEOUT: Duration = Duration::from_secs(120);

/// Wire payload for the head-swap POST.
///
/// The remote API names its inputs backwards: `reference_image` carries the
/// user's photo (the head donor) and `edit_image` the pregenerated catalog
/// image that receives the head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeadSwapRequest {
    pub reference_image: String,
    pub edit_image: String,
    pub gender: Option<String>,
    pub face_description: String,
    pub rotation_degrees: i32,
    pub owner_id: String,
}

impl HeadSwapRequest {
    pub fn new(
        user_image_uri: String,
        target_image_uri: String,
        metadata: &ClassificationMetadata,
        owner_id: impl Into<String>,
    ) -> Self {
        let gender = Some(metadata.gender.trim())
            .filter(|value| !value.is_empty())
            .map(str::to_uppercase);
        Self {
            reference_image: user_image_uri,
            edit_image: target_image_uri,
            gender,
            face_description: face_description(&metadata.body_type, &metadata.skin_color),
            rotation_degrees: 0,
            owner_id: owner_id.into(),
        }
    }
}

pub fn face_description(body_type: &str, skin_color: &str) -> String {
    format!(
        "Natural head swap preserving skin tone, hair texture, and lighting for {body_type} body type with {skin_color} skin."
    )
}

pub trait HeadSwapService: Send + Sync {
    /// Lightweight reachability check. Any HTTP answer counts as reachable;
    /// only transport failures are errors.
    fn check_reachable(&self) -> Result<u16, UpstreamError>;

    /// Performs the swap and returns the output image (a data URI or URL,
    /// passed through untouched).
    fn swap(&self, request: &HeadSwapRequest) -> Result<String, UpstreamError>;
}

pub struct HttpHeadSwap {
    url: String,
    reach_http: HttpClient,
    swap_http: HttpClient,
}

impl HttpHeadSwap {
    pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
        let reach_http = HttpClient::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .context("failed to build head-swap reachability client")?;
        let swap_http = HttpClient::builder()
            .timeout(SWAP_TIMEOUT)
            .build()
            .context("failed to build head-swap client")?;
        Ok(Self {
            url: url.into(),
            reach_http,
            swap_http,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl HeadSwapService for HttpHeadSwap {
    fn check_reachable(&self) -> Result<u16, UpstreamError> {
        let response = self.reach_http.get(&self.url).send()?;
        let status = response.status().as_u16();
        tracing::debug!(status, url = %self.url, "head-swap service answered");
        Ok(status)
    }

    fn swap(&self, request: &HeadSwapRequest) -> Result<String, UpstreamError> {
        tracing::debug!(url = %self.url, gender = ?request.gender, "sending head-swap request");
        let response = self.swap_http.post(&self.url).json(request).send()?;
        let status = response.status();
        let body = response.text()?;
        tracing::debug!(status = status.as_u16(), body = %crate::error::truncate_text(&body, 500), "head-swap responded");
        if !status.is_success() {
            return Err(UpstreamError::from_status(status.as_u16(), None, &body));
        }
        let parsed: Value = serde_json::from_str(&body).map_err(|err| {
            UpstreamError::MalformedResponse(format!("head-swap returned invalid JSON: {err}"))
        })?;
        extract_output_image(&parsed)
    }
}

/// Accepts only `{"status": "success", "data": {"output_image": ...}}`.
pub fn extract_output_image(payload: &Value) -> Result<String, UpstreamError> {
    let succeeded = payload.get("status").and_then(Value::as_str) == Some("success");
    let output = payload
        .pointer("/data/output_image")
        .and_then(Value::as_str);
    match (succeeded, output) {
        (true, Some(image)) => Ok(image.to_string()),
        _ => Err(UpstreamError::MalformedResponse(format!(
            "unexpected head-swap response: {}",
            crate::error::truncate_text(&payload.to_string(), 200)
        ))),
    }
}
