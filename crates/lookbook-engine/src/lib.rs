pub mod classify;
pub mod client;
pub mod config;
pub mod error;
pub mod headswap;
pub mod openai;
pub mod orchestrator;
pub mod prompts;
pub mod retry;

pub use classify::{Classifier, ClassifyError};
pub use client::GenerationClient;
pub use config::EngineConfig;
pub use error::{GenerationError, UpstreamError};
pub use headswap::{HeadSwapRequest, HeadSwapService, HttpHeadSwap};
pub use openai::{ImageApi, OpenAiImages, OpenAiVision, VisionApi};
pub use orchestrator::{LibraryPlan, TransformRequest, Transformer, VariationRequest};
pub use retry::{Jitter, RetryPolicy, Sleeper};
