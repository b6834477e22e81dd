use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;

use crate::error::ApiError;
use crate::message::TextGenerator;
use crate::types::{
    Content, GenerateContentRequest, GenerateContentResponse, GeneratedImage, GenerationConfig,
    ImageConfig, InlineData, Part,
};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";

/// External image-generation service, used when theming the draw screen.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage, ApiError>;
}

pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    text_model: String,
    image_model: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: GEMINI_BASE_URL.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
        }
    }

    pub fn with_models(mut self, text_model: &str, image_model: &str) -> Self {
        self.text_model = text_model.to_string();
        self.image_model = image_model.to_string();
        self
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, ApiError> {
        if self.api_key.is_empty() {
            return Err(ApiError::MissingApiKey);
        }

        let url = format!("{}/{}:generateContent", self.base_url, model);
        debug!("POST {}", url);
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let content: GenerateContentResponse = response.json().await?;
        Ok(content)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate_text(&self, prompt: &str) -> Result<String, ApiError> {
        let request = text_request(prompt);
        let response = self.generate_content(&self.text_model, &request).await?;
        response.text().ok_or(ApiError::EmptyResponse)
    }
}

#[async_trait]
impl ImageGenerator for GeminiClient {
    async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage, ApiError> {
        let request = image_request(prompt);
        let response = self.generate_content(&self.image_model, &request).await?;
        let inline = response.first_inline_data().ok_or(ApiError::EmptyResponse)?;
        decode_inline_image(inline)
    }
}

fn prompt_contents(prompt: &str) -> Vec<Content> {
    vec![Content {
        parts: vec![Part {
            text: Some(prompt.to_string()),
            inline_data: None,
        }],
    }]
}

pub fn text_request(prompt: &str) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: prompt_contents(prompt),
        generation_config: Some(GenerationConfig {
            temperature: Some(0.9),
            ..Default::default()
        }),
    }
}

pub fn image_request(prompt: &str) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: prompt_contents(prompt),
        generation_config: Some(GenerationConfig {
            response_modalities: Some(vec!["IMAGE".to_string()]),
            image_config: Some(ImageConfig {
                aspect_ratio: "16:9".to_string(),
            }),
            ..Default::default()
        }),
    }
}

pub fn decode_inline_image(inline: &InlineData) -> Result<GeneratedImage, ApiError> {
    let bytes = STANDARD.decode(inline.data.as_bytes())?;
    if bytes.is_empty() {
        return Err(ApiError::EmptyResponse);
    }
    Ok(GeneratedImage {
        mime_type: inline.mime_type.clone(),
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_request_embeds_prompt_and_temperature() {
        let value = serde_json::to_value(text_request("hello")).unwrap();
        assert_eq!(
            value,
            json!({
                "contents": [{"parts": [{"text": "hello"}]}],
                "generationConfig": {"temperature": 0.9f32}
            })
        );
    }

    #[test]
    fn image_request_asks_for_widescreen_image() {
        let value = serde_json::to_value(image_request("lanterns")).unwrap();
        assert_eq!(value["generationConfig"]["imageConfig"]["aspectRatio"], "16:9");
        assert_eq!(value["generationConfig"]["responseModalities"][0], "IMAGE");
    }

    #[test]
    fn inline_image_is_decoded() {
        let raw = r#"{"candidates":[{"content":{"parts":[
            {"text":"here you go"},
            {"inlineData":{"mimeType":"image/png","data":"iVBORw0KGgo="}}
        ]}}]}"#;
        let response: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        let image = decode_inline_image(response.first_inline_data().unwrap()).unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.bytes, vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
    }

    #[test]
    fn invalid_inline_data_is_an_error() {
        let inline = InlineData {
            mime_type: "image/png".to_string(),
            data: "not base64!!".to_string(),
        };
        assert!(matches!(decode_inline_image(&inline), Err(ApiError::Decode(_))));
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_any_request() {
        let client = GeminiClient::new("");
        let result = client.generate_text("hi").await;
        assert!(matches!(result, Err(ApiError::MissingApiKey)));
    }
}
