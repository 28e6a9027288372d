use super::prompt::{SAFETY_ANALYSIS_PROMPT, SYSTEM_MESSAGE};
use super::reply::parse_analysis_reply;
use super::{api_key, build_http_client, ensure_success, transport_error, VisionClient};
use crate::domain::error::{AnalysisFailure, AppError, Result};
use crate::domain::inspection::AnalysisResult;
use crate::domain::vision_config::VisionConfig;
use crate::infrastructure::image_codec::EncodedImage;
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

/// Client for OpenAI-compatible chat-completions endpoints with image input.
pub struct OpenAIVisionClient {
    client: reqwest::Client,
    config: VisionConfig,
}

impl OpenAIVisionClient {
    pub fn new(config: VisionConfig) -> Self {
        Self {
            client: build_http_client(config.timeout_secs),
            config,
        }
    }

    fn endpoint(&self) -> String {
        if self.config.base_url.ends_with('/') {
            format!("{}chat/completions", self.config.base_url)
        } else {
            format!("{}/chat/completions", self.config.base_url)
        }
    }
}

#[async_trait]
impl VisionClient for OpenAIVisionClient {
    async fn analyze(&self, image: &EncodedImage, file_name: &str) -> Result<AnalysisResult> {
        let api_key = api_key(&self.config)?;

        let body = json!({
            "model": self.config.model,
            "messages": [
                {
                    "role": "system",
                    "content": SYSTEM_MESSAGE
                },
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": SAFETY_ANALYSIS_PROMPT },
                        { "type": "image_url", "image_url": { "url": image.data_url() } }
                    ]
                }
            ],
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        });

        debug!(
            file_name = %file_name,
            model = %self.config.model,
            bytes = image.byte_len,
            "Sending image to OpenAI-compatible vision endpoint"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let json: serde_json::Value = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| {
                AppError::analysis(
                    AnalysisFailure::Malformed,
                    format!("Failed to parse JSON: {}", e),
                )
            })?;

        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                AppError::analysis(AnalysisFailure::Malformed, "Invalid response format")
            })?;

        parse_analysis_reply(content)
    }
}

#[cfg(test)]
mod tests {
    use super::super::mock_service;
    use super::*;
    use crate::domain::inspection::{RiskLevel, ViolationCategory};
    use crate::infrastructure::image_codec::{encode_image, fixtures::png_bytes};
    use std::sync::{Arc, Mutex};

    fn config(base_url: &str) -> VisionConfig {
        VisionConfig {
            base_url: base_url.to_string(),
            api_key: Some("test-key".to_string()),
            timeout_secs: 5,
            ..Default::default()
        }
    }

    fn completion(content: &str) -> serde_json::Value {
        json!({ "choices": [ { "message": { "role": "assistant", "content": content } } ] })
    }

    #[actix_web::test]
    async fn test_analyze_maps_completion_content() {
        let captured = Arc::new(Mutex::new(None));
        let content = r#"```json
{"violations": [{"type": "No Hard Hat", "category": "PPE", "location": "center", "confidence": 95}], "riskLevel": "High", "safetyScore": 20}
```"#;
        let service = mock_service::start(200, completion(content), captured.clone());

        let client = OpenAIVisionClient::new(config(&service.base_url));
        let image = encode_image(&png_bytes(3)).unwrap();
        let result = client.analyze(&image, "site.png").await.unwrap();

        assert_eq!(result.risk_level, RiskLevel::High);
        assert_eq!(result.safety_score, 20);
        assert_eq!(result.violations[0].category, ViolationCategory::Ppe);

        let request = captured.lock().unwrap().clone().unwrap();
        assert_eq!(request["model"], "gpt-4o");
        assert_eq!(
            request["messages"][1]["content"][1]["image_url"]["url"],
            image.data_url()
        );

        service.stop().await;
    }

    #[actix_web::test]
    async fn test_client_error_is_rejected() {
        let captured = Arc::new(Mutex::new(None));
        let service = mock_service::start(
            400,
            json!({ "error": { "message": "unsupported image" } }),
            captured,
        );

        let client = OpenAIVisionClient::new(config(&service.base_url));
        let image = encode_image(&png_bytes(3)).unwrap();
        match client.analyze(&image, "site.png").await {
            Err(AppError::Analysis { reason, detail }) => {
                assert_eq!(reason, AnalysisFailure::Rejected);
                assert!(detail.contains("unsupported image"));
            }
            other => panic!("unexpected: {:?}", other),
        }

        service.stop().await;
    }

    #[actix_web::test]
    async fn test_server_error_is_unreachable() {
        let captured = Arc::new(Mutex::new(None));
        let service = mock_service::start(503, json!({ "error": "overloaded" }), captured);

        let client = OpenAIVisionClient::new(config(&service.base_url));
        let image = encode_image(&png_bytes(3)).unwrap();
        match client.analyze(&image, "site.png").await {
            Err(AppError::Analysis { reason, .. }) => {
                assert_eq!(reason, AnalysisFailure::Unreachable)
            }
            other => panic!("unexpected: {:?}", other),
        }

        service.stop().await;
    }

    #[actix_web::test]
    async fn test_unexpected_body_is_malformed() {
        let captured = Arc::new(Mutex::new(None));
        let service = mock_service::start(200, json!({ "id": "x" }), captured);

        let client = OpenAIVisionClient::new(config(&service.base_url));
        let image = encode_image(&png_bytes(3)).unwrap();
        match client.analyze(&image, "site.png").await {
            Err(AppError::Analysis { reason, .. }) => assert_eq!(reason, AnalysisFailure::Malformed),
            other => panic!("unexpected: {:?}", other),
        }

        service.stop().await;
    }

    #[actix_web::test]
    async fn test_unreachable_host() {
        let client = OpenAIVisionClient::new(config("http://127.0.0.1:9"));
        let image = encode_image(&png_bytes(3)).unwrap();
        match client.analyze(&image, "site.png").await {
            Err(AppError::Analysis { reason, .. }) => {
                assert_eq!(reason, AnalysisFailure::Unreachable)
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
