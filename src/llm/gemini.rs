use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::credentials::ApiKey;
use crate::llm::media::ImageData;
use crate::llm::{
    summarize_error_body, truncate_for_log, GenerationRequest, ImageProvider, ProviderError,
};
use crate::prompt::{self, templates};

const PROVIDER_NAME: &str = "gemini";

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
    #[allow(dead_code)]
    Other(Value),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

/// Gemini `generateContent` adapter for image-capable models.
pub struct GeminiProvider {
    api_key: ApiKey,
    model: String,
    base_url: String,
    client: Client,
}

impl GeminiProvider {
    pub fn new(api_key: ApiKey, model: &str, base_url: &str, client: Client) -> Self {
        Self {
            api_key,
            model: model.trim().to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    async fn call_api(&self, payload: Value) -> Result<GeminiResponse, ProviderError> {
        if tracing::enabled!(tracing::Level::DEBUG) {
            let payload_summary = summarize_gemini_payload(&payload);
            debug!(target: "llm.gemini", model = %self.model, payload = %payload_summary);
        }

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", self.api_key.expose())
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                let err_text = self.api_key.redact(&err.to_string());
                warn!(
                    "Gemini request failed to send: {} (timeout={}, connect={}, model={})",
                    err_text,
                    err.is_timeout(),
                    err.is_connect(),
                    self.model
                );
                ProviderError::Transport {
                    provider: PROVIDER_NAME.to_string(),
                    message: err_text,
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let (message, body_summary) = summarize_error_body(&body);
            warn!(
                "Gemini API error: status={}, model={}, body={}",
                status,
                self.model,
                self.api_key.redact(&body_summary)
            );
            let detail = message.unwrap_or(body_summary);
            return Err(ProviderError::Status {
                provider: PROVIDER_NAME.to_string(),
                status,
                message: self.api_key.redact(&detail),
            });
        }

        let value = response
            .json::<GeminiResponse>()
            .await
            .map_err(|err| ProviderError::Decode {
                provider: PROVIDER_NAME.to_string(),
                message: err.to_string(),
            })?;
        if tracing::enabled!(tracing::Level::DEBUG) {
            let response_summary = summarize_gemini_response(&value);
            debug!(target: "llm.gemini", model = %self.model, response = %response_summary);
        }
        Ok(value)
    }

    fn no_images(&self) -> ProviderError {
        ProviderError::NoImages {
            provider: PROVIDER_NAME.to_string(),
            model: self.model.clone(),
        }
    }
}

#[async_trait]
impl ImageProvider for GeminiProvider {
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
        let system_instruction = if request.reference_image().is_some() {
            templates::REFERENCE_SYSTEM_PROMPT
        } else {
            templates::GENERATE_SYSTEM_PROMPT
        };
        let parts = build_parts(request.prompt(), request.reference_image(), false);
        let payload = json!({
            "systemInstruction": { "parts": [{ "text": system_instruction }] },
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": build_generation_config(
                Some(request.aspect_ratio()),
                request.quantity(),
            ),
        });

        let response = self.call_api(payload).await?;
        let images = extract_images_from_response(response);
        if images.is_empty() {
            return Err(self.no_images());
        }
        Ok(images)
    }

    async fn edit_image(
        &self,
        image: &ImageData,
        instruction: &str,
    ) -> Result<ImageData, ProviderError> {
        let parts = build_parts(&prompt::edit_prompt(instruction), Some(image), true);
        let payload = json!({
            "systemInstruction": { "parts": [{ "text": templates::EDIT_SYSTEM_PROMPT }] },
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": build_generation_config(None, 1),
        });

        let response = self.call_api(payload).await?;
        extract_images_from_response(response)
            .into_iter()
            .next()
            .ok_or_else(|| self.no_images())
    }
}

fn build_generation_config(aspect_ratio: Option<&str>, quantity: u32) -> Value {
    let mut config = Map::new();
    config.insert("responseModalities".to_string(), json!(["TEXT", "IMAGE"]));
    if quantity > 1 {
        config.insert("candidateCount".to_string(), json!(quantity));
    }
    if let Some(aspect_ratio) = aspect_ratio.map(str::trim).filter(|v| !v.is_empty()) {
        config.insert(
            "imageConfig".to_string(),
            json!({ "aspectRatio": aspect_ratio }),
        );
    }
    Value::Object(config)
}

fn build_parts(text: &str, image: Option<&ImageData>, text_after_media: bool) -> Vec<Value> {
    let mut parts = Vec::new();
    let text_part = json!({ "text": text });

    if !text_after_media {
        parts.push(text_part.clone());
    }

    if let Some(image) = image {
        parts.push(json!({
            "inlineData": {
                "mimeType": image.mime_type(),
                "data": image.to_base64()
            }
        }));
    }

    if text_after_media {
        parts.push(text_part);
    }

    parts
}

fn extract_images_from_response(response: GeminiResponse) -> Vec<ImageData> {
    let mut images = Vec::new();
    for candidate in response.candidates.unwrap_or_default() {
        let Some(parts) = candidate.content.and_then(|content| content.parts) else {
            if let Some(reason) = candidate.finish_reason {
                debug!(target: "llm.gemini", "Candidate without content: finishReason={}", reason);
            }
            continue;
        };
        for part in parts {
            if let GeminiPart::InlineData { inline_data } = part {
                if !inline_data.mime_type.starts_with("image/") {
                    continue;
                }
                match ImageData::from_base64(&inline_data.data, &inline_data.mime_type) {
                    Ok(image) if !image.is_empty() => images.push(image),
                    Ok(_) => {}
                    Err(err) => warn!("Skipping undecodable Gemini image part: {}", err),
                }
            }
        }
    }
    images
}

fn summarize_gemini_parts(parts: &[Value]) -> Vec<Value> {
    parts
        .iter()
        .map(|part| {
            if let Some(text) = part.get("text").and_then(|value| value.as_str()) {
                json!({ "text": truncate_for_log(text, 200) })
            } else if let Some(inline_data) = part.get("inlineData") {
                let mime_type = inline_data
                    .get("mimeType")
                    .and_then(|value| value.as_str())
                    .unwrap_or("unknown");
                let data_len = inline_data
                    .get("data")
                    .and_then(|value| value.as_str())
                    .map(|value| value.len())
                    .unwrap_or(0);
                json!({ "inlineData": { "mimeType": mime_type, "dataLen": data_len } })
            } else {
                json!({ "unknownPart": true })
            }
        })
        .collect()
}

fn summarize_gemini_payload(payload: &Value) -> Value {
    let mut summary = Map::new();

    if let Some(contents) = payload.get("contents").and_then(|value| value.as_array()) {
        let mut summarized_contents = Vec::new();
        for content in contents {
            let role = content
                .get("role")
                .and_then(|value| value.as_str())
                .unwrap_or("user");
            let parts = content
                .get("parts")
                .and_then(|value| value.as_array())
                .map(|parts| summarize_gemini_parts(parts))
                .unwrap_or_default();
            summarized_contents.push(json!({ "role": role, "parts": parts }));
        }
        summary.insert("contents".to_string(), Value::Array(summarized_contents));
    }

    if let Some(config) = payload.get("generationConfig") {
        summary.insert("generationConfig".to_string(), config.clone());
    }

    Value::Object(summary)
}

fn summarize_gemini_response(response: &GeminiResponse) -> Value {
    let mut text_parts = 0usize;
    let mut image_parts = 0usize;
    let mut text_preview = None;

    let candidates = response.candidates.as_deref().unwrap_or(&[]);
    for candidate in candidates {
        let Some(parts) = candidate.content.as_ref().and_then(|c| c.parts.as_ref()) else {
            continue;
        };
        for part in parts {
            match part {
                GeminiPart::Text { text } => {
                    text_parts += 1;
                    if text_preview.is_none() && !text.trim().is_empty() {
                        text_preview = Some(truncate_for_log(text, 200));
                    }
                }
                GeminiPart::InlineData { inline_data } => {
                    if inline_data.mime_type.starts_with("image/") {
                        image_parts += 1;
                    }
                }
                GeminiPart::Other(_) => {}
            }
        }
    }

    json!({
        "candidates": candidates.len(),
        "textParts": text_parts,
        "imageParts": image_parts,
        "textPreview": text_preview
    })
}
