//! Provider implementations and model decorators.
//!
//! - [`openai_compatible`]: adapter for OpenAI-compatible HTTP APIs
//! - [`registry`]: `provider:model` resolution with metrics and
//!   stream hardening
//! - [`retry`]: retry decorators with exponential backoff

pub mod openai_compatible;
pub mod registry;
pub mod retry;

pub use openai_compatible::{OpenAiCompatibleProvider, OpenAiCompatibleProviderBuilder};
pub use registry::ProviderRegistry;
pub use retry::{RetryConfig, RetryingEmbeddingModel, RetryingImageModel, RetryingLanguageModel};
