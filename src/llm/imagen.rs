use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::credentials::ApiKey;
use crate::llm::media::ImageData;
use crate::llm::{summarize_error_body, GenerationRequest, ImageProvider, ProviderError};

const PROVIDER_NAME: &str = "imagen";
const OUTPUT_MIME_TYPE: &str = "image/jpeg";
const MAX_SAMPLE_COUNT: u32 = 4;

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: Option<String>,
    mime_type: Option<String>,
    rai_filtered_reason: Option<String>,
}

/// Imagen `predict` adapter. Text-to-image only.
pub struct ImagenProvider {
    api_key: ApiKey,
    model: String,
    base_url: String,
    client: Client,
}

impl ImagenProvider {
    pub fn new(api_key: ApiKey, model: &str, base_url: &str, client: Client) -> Self {
        Self {
            api_key,
            model: model.trim().to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:predict", self.base_url, self.model)
    }

    async fn predict(&self, payload: Value) -> Result<PredictResponse, ProviderError> {
        debug!(target: "llm.imagen", model = %self.model, parameters = %payload["parameters"]);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", self.api_key.expose())
            .json(&payload)
            .send()
            .await
            .map_err(|err| ProviderError::Transport {
                provider: PROVIDER_NAME.to_string(),
                message: self.api_key.redact(&err.to_string()),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let (message, body_summary) = summarize_error_body(&body);
            warn!(
                "Imagen API error: status={}, model={}, body={}",
                status,
                self.model,
                self.api_key.redact(&body_summary)
            );
            return Err(ProviderError::Status {
                provider: PROVIDER_NAME.to_string(),
                status,
                message: self.api_key.redact(&message.unwrap_or(body_summary)),
            });
        }

        response
            .json::<PredictResponse>()
            .await
            .map_err(|err| ProviderError::Decode {
                provider: PROVIDER_NAME.to_string(),
                message: err.to_string(),
            })
    }
}

#[async_trait]
impl ImageProvider for ImagenProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate_images(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<ImageData>, ProviderError> {
        if request.reference_image().is_some() {
            debug!(
                target: "llm.imagen",
                "Imagen ignores reference images; sending prompt only (model={})",
                self.model
            );
        }

        let payload = json!({
            "instances": [{ "prompt": request.prompt() }],
            "parameters": {
                "sampleCount": request.quantity().min(MAX_SAMPLE_COUNT),
                "aspectRatio": request.aspect_ratio(),
                "outputOptions": { "mimeType": OUTPUT_MIME_TYPE },
            }
        });

        let response = self.predict(payload).await?;
        let mut images = Vec::new();
        for prediction in response.predictions {
            if let Some(reason) = prediction.rai_filtered_reason {
                warn!("Imagen filtered a sample: {}", reason);
                continue;
            }
            let Some(data) = prediction.bytes_base64_encoded else {
                continue;
            };
            let mime_type = prediction.mime_type.as_deref().unwrap_or(OUTPUT_MIME_TYPE);
            match ImageData::from_base64(&data, mime_type) {
                Ok(image) if !image.is_empty() => images.push(image),
                Ok(_) => {}
                Err(err) => warn!("Skipping undecodable Imagen prediction: {}", err),
            }
        }

        if images.is_empty() {
            return Err(ProviderError::NoImages {
                provider: PROVIDER_NAME.to_string(),
                model: self.model.clone(),
            });
        }
        Ok(images)
    }

    async fn edit_image(
        &self,
        _image: &ImageData,
        _instruction: &str,
    ) -> Result<ImageData, ProviderError> {
        Err(ProviderError::Unsupported {
            provider: PROVIDER_NAME.to_string(),
            operation: "image editing",
        })
    }
}
