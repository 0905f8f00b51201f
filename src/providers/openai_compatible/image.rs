//! Image generation model (`/images/generations`).

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::instrument;

use super::ProviderConfig;
use crate::http::{combine_headers, post_json, read_json, response_headers};
use crate::traits::ImageModel;
use crate::types::{CallWarning, ImageOptions, ImageResult, ResponseInfo};
use crate::{HuginnError, Result};

const MAX_IMAGES_PER_CALL: usize = 10;

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    b64_json: Option<String>,
}

/// An OpenAI-compatible image generation model.
#[derive(Clone)]
pub struct OpenAiCompatibleImageModel {
    model_id: String,
    provider: String,
    config: Arc<ProviderConfig>,
    http: Client,
}

impl OpenAiCompatibleImageModel {
    pub(crate) fn new(model_id: impl Into<String>, config: Arc<ProviderConfig>, http: Client) -> Self {
        Self {
            model_id: model_id.into(),
            provider: format!("{}.image", config.name),
            config,
            http,
        }
    }
}

#[async_trait]
impl ImageModel for OpenAiCompatibleImageModel {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn max_images_per_call(&self) -> usize {
        MAX_IMAGES_PER_CALL
    }

    #[instrument(name = "image.generate", skip(self, options), fields(provider = %self.provider, model = %self.model_id, n = options.n))]
    async fn do_generate(&self, options: ImageOptions) -> Result<ImageResult> {
        let requested = options.n.max(1) as usize;
        if requested > MAX_IMAGES_PER_CALL {
            return Err(HuginnError::TooManyImages {
                max: MAX_IMAGES_PER_CALL,
                actual: requested,
            });
        }

        let mut warnings = Vec::new();
        if options.aspect_ratio.is_some() {
            warnings.push(CallWarning::unsupported_setting_with(
                "aspect_ratio",
                "This model does not support aspect ratio. Use `size` instead.",
            ));
        }
        if options.seed.is_some() {
            warnings.push(CallWarning::unsupported_setting("seed"));
        }

        let mut body = Map::new();
        body.insert("model".into(), json!(self.model_id));
        body.insert("prompt".into(), json!(options.prompt));
        body.insert("n".into(), json!(options.n.max(1)));
        body.insert("response_format".into(), json!("b64_json"));
        if let Some(size) = &options.size {
            body.insert("size".into(), json!(size));
        }
        if let Some(extra) = options
            .provider_options
            .as_ref()
            .and_then(|o| o.get(&self.config.name))
        {
            for (k, v) in extra {
                body.insert(k.clone(), v.clone());
            }
        }
        let body = Value::Object(body);

        let url = self.config.url("/images/generations")?;
        let headers = combine_headers([&self.config.headers, &options.headers]);
        let response = post_json(&self.http, &url, &headers, &body, options.abort.as_ref()).await?;
        let headers = response_headers(&response);
        let (parsed, raw) =
            read_json::<ImageResponse>(response, options.abort.as_ref()).await?;

        let images = parsed
            .data
            .into_iter()
            .map(|d| {
                d.b64_json
                    .ok_or_else(|| HuginnError::InvalidResponse("image without b64_json".into()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ImageResult {
            images,
            warnings,
            response: ResponseInfo {
                headers,
                body: Some(raw),
                ..Default::default()
            },
        })
    }
}
