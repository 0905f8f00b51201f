//! Provider and model traits.
//!
//! A [`Provider`] is a factory for model handles. Model handles are the
//! vendor-specific adapters: they translate the normalized call options into
//! a vendor request and the vendor response back into normalized results.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ModelType;
use crate::types::{
    CallOptions, EmbedOptions, EmbedResult, GenerateResult, ImageOptions, ImageResult,
    StreamResult,
};
use crate::urls::SupportedUrls;
use crate::{HuginnError, Result};

/// Version of the model interface implemented by this crate.
pub const SPECIFICATION_VERSION: &str = "v2";

/// A language model handle.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Interface version this model implements.
    fn specification_version(&self) -> &'static str {
        SPECIFICATION_VERSION
    }

    /// Provider id for logging/debugging, e.g. `"acme.chat"`.
    fn provider(&self) -> &str;

    /// Vendor model id.
    fn model_id(&self) -> &str;

    /// URLs the vendor can fetch itself, by media-type pattern.
    ///
    /// File parts with other URLs must be downloaded by the caller first.
    fn supported_urls(&self) -> SupportedUrls {
        SupportedUrls::default()
    }

    /// Non-streaming generation.
    async fn do_generate(&self, options: &CallOptions) -> Result<GenerateResult>;

    /// Streaming generation.
    async fn do_stream(&self, options: &CallOptions) -> Result<StreamResult>;
}

/// A text embedding model handle.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    fn specification_version(&self) -> &'static str {
        SPECIFICATION_VERSION
    }

    fn provider(&self) -> &str;

    fn model_id(&self) -> &str;

    /// Limit of values per `do_embed` call, if the vendor has one.
    fn max_embeddings_per_call(&self) -> Option<usize> {
        None
    }

    async fn do_embed(&self, options: EmbedOptions) -> Result<EmbedResult>;
}

/// An image generation model handle.
#[async_trait]
pub trait ImageModel: Send + Sync {
    fn specification_version(&self) -> &'static str {
        SPECIFICATION_VERSION
    }

    fn provider(&self) -> &str;

    fn model_id(&self) -> &str;

    /// Limit of images per `do_generate` call.
    fn max_images_per_call(&self) -> usize {
        1
    }

    async fn do_generate(&self, options: ImageOptions) -> Result<ImageResult>;
}

/// Factory producing model handles for a model id.
///
/// Providers that do not offer a model type keep the default, which
/// returns [`HuginnError::NoSuchModel`].
pub trait Provider: Send + Sync {
    fn language_model(&self, model_id: &str) -> Result<Arc<dyn LanguageModel>>;

    fn text_embedding_model(&self, model_id: &str) -> Result<Arc<dyn EmbeddingModel>> {
        Err(HuginnError::NoSuchModel {
            model_id: model_id.to_string(),
            model_type: ModelType::TextEmbedding,
        })
    }

    fn image_model(&self, model_id: &str) -> Result<Arc<dyn ImageModel>> {
        Err(HuginnError::NoSuchModel {
            model_id: model_id.to_string(),
            model_type: ModelType::Image,
        })
    }
}
