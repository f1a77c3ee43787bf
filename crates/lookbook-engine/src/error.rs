use std::path::PathBuf;

use thiserror::Error;

/// A failed call to an external service, shaped for retry classification.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    #[error("rate limited ({message})")]
    RateLimited {
        retry_after: Option<f64>,
        message: String,
    },
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("upstream returned {code}: {message}")]
    Status { code: u16, message: String },
    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),
    #[error("{0}")]
    Other(String),
}

impl UpstreamError {
    pub fn from_status(code: u16, retry_after: Option<f64>, body: &str) -> Self {
        let message = truncate_text(body, 512);
        if code == 429 {
            UpstreamError::RateLimited {
                retry_after,
                message,
            }
        } else {
            UpstreamError::Status { code, message }
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            UpstreamError::Connection(err.to_string())
        } else if err.is_decode() || err.is_body() {
            UpstreamError::MalformedResponse(err.to_string())
        } else if let Some(status) = err.status() {
            UpstreamError::Status {
                code: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            UpstreamError::Other(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("{operation} gave up after {retries} retries: {source}")]
    RetriesExhausted {
        operation: &'static str,
        retries: u32,
        #[source]
        source: UpstreamError,
    },
    #[error("{operation} failed: {source}")]
    Fatal {
        operation: &'static str,
        #[source]
        source: UpstreamError,
    },
    #[error("invalid generation request: {0}")]
    InvalidRequest(String),
    #[error("failed to read {}: {source}", path.display())]
    ReadInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {}: {source}", path.display())]
    WriteOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
