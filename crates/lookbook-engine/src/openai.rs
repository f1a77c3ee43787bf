//! Blocking transports for the OpenAI image and chat-completion APIs.
//!
//! Each transport performs exactly one HTTP call per invocation; retries
//! live in the callers.

use anyhow::Context;
use lookbook_contracts::generation::GenerationRequest;
use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use reqwest::header::RETRY_AFTER;
use serde_json::{json, Value};

use crate::config::EngineConfig;
use crate::error::UpstreamError;

/// Text-to-image and image-edit calls. Both return the base64 payload of
/// the first generated image.
pub trait ImageApi: Send + Sync {
    fn generate(&self, request: &GenerationRequest) -> Result<String, UpstreamError>;
    fn edit(&self, request: &GenerationRequest) -> Result<String, UpstreamError>;
}

/// A single vision completion constrained to a JSON object answer.
/// Returns the raw message content.
pub trait VisionApi: Send + Sync {
    fn describe_json(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        image_data_uri: &str,
    ) -> Result<String, UpstreamError>;
}

pub struct OpenAiImages {
    api_base: String,
    api_key: String,
    model: String,
    http: HttpClient,
}

impl OpenAiImages {
    pub fn new(config: &EngineConfig) -> anyhow::Result<Self> {
        Ok(Self {
            api_base: config.api_base.clone(),
            api_key: config.api_key.clone(),
            model: config.image_model.clone(),
            http: build_http_client(config)?,
        })
    }
}

impl ImageApi for OpenAiImages {
    fn generate(&self, request: &GenerationRequest) -> Result<String, UpstreamError> {
        let endpoint = format!("{}/images/generations", self.api_base);
        let payload = json!({
            "model": self.model,
            "prompt": request.prompt,
            "size": request.size.as_str(),
            "quality": request.quality.as_str(),
            "n": 1,
        });
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()?;
        let parsed = response_json_or_error(response)?;
        first_image_payload(&parsed)
    }

    fn edit(&self, request: &GenerationRequest) -> Result<String, UpstreamError> {
        if request.reference_images.is_empty() {
            return Err(UpstreamError::Other(
                "image edits require at least one input image".to_string(),
            ));
        }
        let endpoint = format!("{}/images/edits", self.api_base);
        let mut form = MultipartForm::new()
            .text("model", self.model.clone())
            .text("prompt", request.prompt.clone())
            .text("size", request.size.as_str().to_string())
            .text("quality", request.quality.as_str().to_string())
            .text("n", "1".to_string());

        for image in &request.reference_images {
            let mut part =
                MultipartPart::bytes(image.bytes.clone()).file_name(image.file_name.clone());
            if let Some(mime) = image.mime_type() {
                part = part.mime_str(mime).map_err(|err| {
                    UpstreamError::Other(format!("invalid mime '{mime}' for {}: {err}", image.file_name))
                })?;
            }
            form = form.part("image[]", part);
        }

        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()?;
        let parsed = response_json_or_error(response)?;
        first_image_payload(&parsed)
    }
}

pub struct OpenAiVision {
    api_base: String,
    api_key: String,
    model: String,
    http: HttpClient,
}

impl OpenAiVision {
    pub fn new(config: &EngineConfig) -> anyhow::Result<Self> {
        Ok(Self {
            api_base: config.api_base.clone(),
            api_key: config.api_key.clone(),
            model: config.vision_model.clone(),
            http: build_http_client(config)?,
        })
    }
}

impl VisionApi for OpenAiVision {
    fn describe_json(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        image_data_uri: &str,
    ) -> Result<String, UpstreamError> {
        let endpoint = format!("{}/chat/completions", self.api_base);
        let payload = vision_payload(&self.model, system_prompt, user_prompt, image_data_uri);
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()?;
        let parsed = response_json_or_error(response)?;
        parsed
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                UpstreamError::MalformedResponse("completion returned no message content".to_string())
            })
    }
}

fn build_http_client(config: &EngineConfig) -> anyhow::Result<HttpClient> {
    HttpClient::builder()
        .timeout(config.request_timeout)
        .build()
        .context("failed to build OpenAI HTTP client")
}

pub(crate) fn vision_payload(
    model: &str,
    system_prompt: &str,
    user_prompt: &str,
    image_data_uri: &str,
) -> Value {
    json!({
        "model": model,
        "messages": [
            {"role": "system", "content": system_prompt},
            {
                "role": "user",
                "content": [
                    {"type": "text", "text": user_prompt},
                    {"type": "image_url", "image_url": {"url": image_data_uri}},
                ],
            },
        ],
        "response_format": {"type": "json_object"},
        "temperature": 0.0,
    })
}

fn response_json_or_error(response: HttpResponse) -> Result<Value, UpstreamError> {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_retry_after);
    let body = response.text()?;
    if !status.is_success() {
        return Err(UpstreamError::from_status(
            status.as_u16(),
            retry_after,
            &body,
        ));
    }
    serde_json::from_str(&body)
        .map_err(|err| UpstreamError::MalformedResponse(format!("invalid JSON payload: {err}")))
}

/// `Retry-After` in whole seconds. HTTP dates and fractional or
/// non-numeric values are ignored.
pub(crate) fn parse_retry_after(value: &str) -> Option<f64> {
    value.trim().parse::<u32>().ok().map(f64::from)
}

pub(crate) fn first_image_payload(payload: &Value) -> Result<String, UpstreamError> {
    payload
        .pointer("/data/0/b64_json")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| UpstreamError::MalformedResponse("response returned no images".to_string()))
}
