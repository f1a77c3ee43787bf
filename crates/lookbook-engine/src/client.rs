use std::fs;
use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use lookbook_contracts::generation::{
    GenerationRequest, GenerationResult, ImageSize, Operation, Quality, ReferenceImage,
    MAX_REFERENCE_IMAGES,
};

use crate::error::{GenerationError, UpstreamError};
use crate::openai::ImageApi;
use crate::retry::{run_with_retry, Jitter, RetryPolicy, Sleeper, ThreadRngJitter, ThreadSleeper};

/// Retrying wrapper around an [`ImageApi`] that decodes and persists results.
pub struct GenerationClient {
    api: Arc<dyn ImageApi>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    jitter: Arc<dyn Jitter>,
}

impl GenerationClient {
    pub fn new(api: Arc<dyn ImageApi>, policy: RetryPolicy) -> Self {
        Self {
            api,
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

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn generate(
        &self,
        prompt: &str,
        size: ImageSize,
        quality: Quality,
        output: Option<&Path>,
    ) -> Result<GenerationResult, GenerationError> {
        self.execute(&GenerationRequest::generate(prompt, size, quality), output)
    }

    /// The subject image goes first; garment or fabric references follow.
    pub fn edit(
        &self,
        prompt: &str,
        images: Vec<ReferenceImage>,
        size: ImageSize,
        quality: Quality,
        output: Option<&Path>,
    ) -> Result<GenerationResult, GenerationError> {
        if images.is_empty() {
            return Err(GenerationError::InvalidRequest(
                "edit requires at least one reference image".to_string(),
            ));
        }
        self.execute(&GenerationRequest::edit(prompt, images, size, quality), output)
    }

    pub fn execute(
        &self,
        request: &GenerationRequest,
        output: Option<&Path>,
    ) -> Result<GenerationResult, GenerationError> {
        if request.reference_images.len() > MAX_REFERENCE_IMAGES {
            return Err(GenerationError::InvalidRequest(format!(
                "at most {MAX_REFERENCE_IMAGES} reference images are supported, got {}",
                request.reference_images.len()
            )));
        }
        let operation = request.operation();
        let label = match operation {
            Operation::Generate => "image generation",
            Operation::Edit => "image edit",
        };
        tracing::debug!(operation = label, prompt = %request.prompt, "sending image request");

        let image_bytes = run_with_retry(
            &self.policy,
            self.sleeper.as_ref(),
            self.jitter.as_ref(),
            label,
            |_attempt| {
                let payload = match operation {
                    Operation::Generate => self.api.generate(request)?,
                    Operation::Edit => self.api.edit(request)?,
                };
                decode_image_payload(&payload)
            },
        )?;

        let saved_path = match output {
            Some(path) => {
                persist(path, &image_bytes)?;
                tracing::info!(path = %path.display(), bytes = image_bytes.len(), "image saved");
                Some(path.to_path_buf())
            }
            None => None,
        };
        Ok(GenerationResult {
            image_bytes,
            saved_path,
        })
    }
}

pub fn decode_image_payload(payload: &str) -> Result<Vec<u8>, UpstreamError> {
    BASE64
        .decode(payload.trim())
        .map_err(|err| UpstreamError::MalformedResponse(format!("invalid base64 image payload: {err}")))
}

fn persist(path: &Path, bytes: &[u8]) -> Result<(), GenerationError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| GenerationError::WriteOutput {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, bytes).map_err(|source| GenerationError::WriteOutput {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use lookbook_contracts::generation::GenerationRequest;

    use crate::error::UpstreamError;
    use crate::openai::ImageApi;

    /// Replays queued outcomes in order and records every request it sees.
    /// An empty queue answers with a fixed success payload.
    #[derive(Default)]
    pub struct ScriptedImageApi {
        outcomes: Mutex<VecDeque<Result<Vec<u8>, UpstreamError>>>,
        pub requests: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedImageApi {
        pub const DEFAULT_IMAGE: &'static [u8] = b"generated-image";

        pub fn push_ok(&self, bytes: &[u8]) {
            if let Ok(mut queue) = self.outcomes.lock() {
                queue.push_back(Ok(bytes.to_vec()));
            }
        }

        pub fn push_err(&self, error: UpstreamError) {
            if let Ok(mut queue) = self.outcomes.lock() {
                queue.push_back(Err(error));
            }
        }

        pub fn recorded(&self) -> Vec<GenerationRequest> {
            self.requests.lock().map(|guard| guard.clone()).unwrap_or_default()
        }

        fn answer(&self, request: &GenerationRequest) -> Result<String, UpstreamError> {
            if let Ok(mut guard) = self.requests.lock() {
                guard.push(request.clone());
            }
            let next = self
                .outcomes
                .lock()
                .ok()
                .and_then(|mut queue| queue.pop_front())
                .unwrap_or_else(|| Ok(Self::DEFAULT_IMAGE.to_vec()));
            next.map(|bytes| BASE64.encode(bytes))
        }
    }

    impl ImageApi for ScriptedImageApi {
        fn generate(&self, request: &GenerationRequest) -> Result<String, UpstreamError> {
            self.answer(request)
        }

        fn edit(&self, request: &GenerationRequest) -> Result<String, UpstreamError> {
            self.answer(request)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::testing::ScriptedImageApi;
    use super::*;
    use crate::retry::testing::{LowJitter, RecordingSleeper};

    fn client(api: Arc<ScriptedImageApi>, sleeper: Arc<RecordingSleeper>) -> GenerationClient {
        GenerationClient::new(api, RetryPolicy::default())
            .with_sleeper(sleeper)
            .with_jitter(Arc::new(LowJitter))
    }

    #[test]
    fn generate_decodes_and_persists() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let api = Arc::new(ScriptedImageApi::default());
        api.push_ok(b"png-bytes");
        let sleeper = Arc::new(RecordingSleeper::default());
        let target = temp.path().join("a").join("b").join("out.png");

        let result = client(api.clone(), sleeper).generate(
            "prompt",
            ImageSize::Portrait,
            Quality::Low,
            Some(&target),
        )?;

        assert_eq!(result.image_bytes, b"png-bytes");
        assert_eq!(result.saved_path.as_deref(), Some(target.as_path()));
        assert_eq!(fs::read(&target)?, b"png-bytes");
        assert_eq!(api.recorded()[0].operation(), Operation::Generate);
        Ok(())
    }

    #[test]
    fn existing_output_is_overwritten() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let target = temp.path().join("out.png");
        fs::write(&target, b"old")?;
        let api = Arc::new(ScriptedImageApi::default());
        api.push_ok(b"new");

        client(api, Arc::new(RecordingSleeper::default())).generate(
            "prompt",
            ImageSize::Square,
            Quality::Medium,
            Some(&target),
        )?;
        assert_eq!(fs::read(&target)?, b"new");
        Ok(())
    }

    #[test]
    fn in_memory_result_without_target() -> anyhow::Result<()> {
        let api = Arc::new(ScriptedImageApi::default());
        let result = client(api, Arc::new(RecordingSleeper::default())).edit(
            "prompt",
            vec![ReferenceImage::new("base.png", vec![1])],
            ImageSize::Portrait,
            Quality::High,
            None,
        )?;
        assert_eq!(result.image_bytes, ScriptedImageApi::DEFAULT_IMAGE);
        assert!(result.saved_path.is_none());
        Ok(())
    }

    #[test]
    fn rate_limits_are_retried_with_backoff() -> anyhow::Result<()> {
        let api = Arc::new(ScriptedImageApi::default());
        api.push_err(UpstreamError::RateLimited {
            retry_after: None,
            message: "slow down".to_string(),
        });
        api.push_ok(b"ok");
        let sleeper = Arc::new(RecordingSleeper::default());

        let result = client(api.clone(), sleeper.clone()).generate(
            "prompt",
            ImageSize::Portrait,
            Quality::Medium,
            None,
        )?;
        assert_eq!(result.image_bytes, b"ok");
        assert_eq!(api.recorded().len(), 2);
        assert_eq!(sleeper.recorded(), vec![Duration::from_secs(11)]);
        Ok(())
    }

    #[test]
    fn client_error_fails_without_writing() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let target = temp.path().join("never.png");
        let api = Arc::new(ScriptedImageApi::default());
        api.push_err(UpstreamError::Status {
            code: 400,
            message: "content policy".to_string(),
        });
        let sleeper = Arc::new(RecordingSleeper::default());

        let result = client(api, sleeper.clone()).generate(
            "prompt",
            ImageSize::Portrait,
            Quality::Medium,
            Some(&target),
        );
        assert!(matches!(result, Err(GenerationError::Fatal { .. })));
        assert!(!target.exists());
        assert!(sleeper.recorded().is_empty());
        Ok(())
    }

    #[test]
    fn edit_rejects_empty_and_oversized_image_lists() {
        let api = Arc::new(ScriptedImageApi::default());
        let client = client(api.clone(), Arc::new(RecordingSleeper::default()));
        let empty = client.edit("p", Vec::new(), ImageSize::Portrait, Quality::Low, None);
        assert!(matches!(empty, Err(GenerationError::InvalidRequest(_))));

        let images = (0..=MAX_REFERENCE_IMAGES)
            .map(|index| ReferenceImage::new(format!("{index}.png"), vec![0]))
            .collect();
        let too_many = client.edit("p", images, ImageSize::Portrait, Quality::Low, None);
        assert!(matches!(too_many, Err(GenerationError::InvalidRequest(_))));
        assert!(api.recorded().is_empty());
    }

    #[test]
    fn undecodable_payload_is_not_retried() {
        assert!(matches!(
            decode_image_payload("%%% not base64"),
            Err(UpstreamError::MalformedResponse(_))
        ));
    }
}
