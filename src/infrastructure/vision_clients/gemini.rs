use super::prompt::{SAFETY_ANALYSIS_PROMPT, SYSTEM_MESSAGE};
use super::reply::parse_analysis_reply;
use super::{api_key, build_http_client, ensure_success, transport_error, VisionClient};
use crate::domain::error::{AnalysisFailure, AppError, Result};
use crate::domain::inspection::AnalysisResult;
use crate::domain::vision_config::VisionConfig;
use crate::infrastructure::image_codec::EncodedImage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Serialize)]
struct GeminiRequest<'a> {
    #[serde(rename = "systemInstruction")]
    system_instruction: GeminiContent<'a>,
    contents: Vec<GeminiContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum GeminiPart<'a> {
    Text {
        text: &'a str,
    },
    InlineData {
        inline_data: InlineData<'a>,
    },
}

#[derive(Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiCandidateContent,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Deserialize)]
struct GeminiCandidatePart {
    #[serde(default)]
    text: Option<String>,
}

pub struct GeminiVisionClient {
    client: reqwest::Client,
    config: VisionConfig,
}

impl GeminiVisionClient {
    pub fn new(config: VisionConfig) -> Self {
        Self {
            client: build_http_client(config.timeout_secs),
            config,
        }
    }

    fn endpoint(&self, api_key: &str) -> String {
        let base_url = self.config.base_url.trim_end_matches('/');
        format!(
            "{}/{}:generateContent?key={}",
            base_url,
            self.config.model.trim(),
            api_key
        )
    }
}

#[async_trait]
impl VisionClient for GeminiVisionClient {
    async fn analyze(&self, image: &EncodedImage, file_name: &str) -> Result<AnalysisResult> {
        let api_key = api_key(&self.config)?;

        let body = GeminiRequest {
            system_instruction: GeminiContent {
                parts: vec![GeminiPart::Text {
                    text: SYSTEM_MESSAGE,
                }],
                role: None,
            },
            contents: vec![GeminiContent {
                parts: vec![
                    GeminiPart::Text {
                        text: SAFETY_ANALYSIS_PROMPT,
                    },
                    GeminiPart::InlineData {
                        inline_data: InlineData {
                            mime_type: image.mime_type,
                            data: &image.base64,
                        },
                    },
                ],
                role: Some("user"),
            }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_tokens,
                response_mime_type: "application/json",
            },
        };

        debug!(
            file_name = %file_name,
            model = %self.config.model,
            bytes = image.byte_len,
            "Sending image to Gemini vision endpoint"
        );

        let response = self
            .client
            .post(self.endpoint(&api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let json: GeminiResponse = ensure_success(response).await?.json().await.map_err(|e| {
            AppError::analysis(
                AnalysisFailure::Malformed,
                format!("Failed to parse JSON: {}", e),
            )
        })?;

        let text = json
            .candidates
            .first()
            .and_then(|candidate| candidate.content.parts.iter().find_map(|p| p.text.as_deref()))
            .ok_or_else(|| {
                AppError::analysis(AnalysisFailure::Malformed, "Invalid response format")
            })?;

        parse_analysis_reply(text)
    }
}
