pub mod gemini;
pub mod imagen;
pub mod media;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::credentials::ApiKey;
use crate::prompt::{self, PromptTemplate, SceneParameters};
pub use gemini::GeminiProvider;
pub use imagen::ImagenProvider;
pub use media::{ImageData, MediaError};

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{provider} request failed: {message}")]
    Transport { provider: String, message: String },
    #[error("{provider} request failed with status {status}: {message}")]
    Status {
        provider: String,
        status: StatusCode,
        message: String,
    },
    #[error("No images returned by {provider} (model: {model})")]
    NoImages { provider: String, model: String },
    #[error("{provider} returned an unreadable response: {message}")]
    Decode { provider: String, message: String },
    #[error("{provider} does not support {operation}")]
    Unsupported {
        provider: String,
        operation: &'static str,
    },
}

/// Image-generation backend. Adapters translate vendor payloads into
/// [`ImageData`] so nothing vendor-specific leaks past this trait.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    async fn generate_images(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<ImageData>, ProviderError>;

    async fn edit_image(
        &self,
        image: &ImageData,
        instruction: &str,
    ) -> Result<ImageData, ProviderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gemini,
    Imagen,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Gemini => f.write_str("gemini"),
            ProviderKind::Imagen => f.write_str("imagen"),
        }
    }
}

/// One entry of a provider chain, written as `kind:model`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub kind: ProviderKind,
    pub model: String,
}

impl ProviderSpec {
    pub fn new(kind: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            kind,
            model: model.into(),
        }
    }

    pub fn build(
        &self,
        api_key: &ApiKey,
        base_url: &str,
        client: reqwest::Client,
    ) -> Arc<dyn ImageProvider> {
        match self.kind {
            ProviderKind::Gemini => Arc::new(GeminiProvider::new(
                api_key.clone(),
                &self.model,
                base_url,
                client,
            )),
            ProviderKind::Imagen => Arc::new(ImagenProvider::new(
                api_key.clone(),
                &self.model,
                base_url,
                client,
            )),
        }
    }
}

impl fmt::Display for ProviderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.model)
    }
}

impl FromStr for ProviderSpec {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        let (kind, model) = match value.split_once(':') {
            Some((kind, model)) => (kind.trim().to_ascii_lowercase(), model.trim()),
            None => ("gemini".to_string(), value),
        };
        if model.is_empty() {
            return Err(format!("Missing model in provider spec '{value}'"));
        }
        let kind = match kind.as_str() {
            "gemini" => ProviderKind::Gemini,
            "imagen" => ProviderKind::Imagen,
            other => return Err(format!("Unknown provider kind '{other}'")),
        };
        Ok(ProviderSpec::new(kind, model))
    }
}

/// A single generation call, fixed at construction.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    prompt: String,
    reference_image: Option<ImageData>,
    quantity: u32,
    aspect_ratio: String,
    depth_of_field: String,
}

impl GenerationRequest {
    pub fn new(
        prompt: impl Into<String>,
        reference_image: Option<ImageData>,
        quantity: u32,
        aspect_ratio: impl Into<String>,
        depth_of_field: impl Into<String>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            reference_image,
            quantity: quantity.max(1),
            aspect_ratio: aspect_ratio.into(),
            depth_of_field: depth_of_field.into(),
        }
    }

    pub fn from_scene(
        template: &PromptTemplate,
        params: &SceneParameters,
        max_quantity: u32,
    ) -> Self {
        Self::new(
            prompt::build(template, params),
            params.reference_image.clone(),
            params.effective_quantity(max_quantity),
            params.aspect_ratio_or_default(),
            params.depth_of_field_or_default(),
        )
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn reference_image(&self) -> Option<&ImageData> {
        self.reference_image.as_ref()
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn aspect_ratio(&self) -> &str {
        &self.aspect_ratio
    }

    pub fn depth_of_field(&self) -> &str {
        &self.depth_of_field
    }
}

pub(crate) fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

pub(crate) fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}
