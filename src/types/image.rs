//! Types for image generation models.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::ProviderOptions;
use super::response::ResponseInfo;
use super::warning::CallWarning;

/// Options for image generation.
#[derive(Debug, Clone, Default)]
pub struct ImageOptions {
    pub prompt: String,
    /// Number of images to generate.
    pub n: u32,
    /// `{width}x{height}`, e.g. `1024x1024`.
    pub size: Option<String>,
    /// `{width}:{height}`, e.g. `16:9`.
    pub aspect_ratio: Option<String>,
    pub seed: Option<u64>,
    pub headers: HashMap<String, String>,
    pub provider_options: Option<ProviderOptions>,
    pub abort: Option<CancellationToken>,
}

impl ImageOptions {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            n: 1,
            ..Default::default()
        }
    }

    pub fn n(mut self, n: u32) -> Self {
        self.n = n;
        self
    }

    pub fn size(mut self, size: impl Into<String>) -> Self {
        self.size = Some(size.into());
        self
    }
}

/// Result of image generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageResult {
    /// Base64-encoded images.
    pub images: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<CallWarning>,
    #[serde(default)]
    pub response: ResponseInfo,
}
