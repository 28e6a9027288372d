pub mod gemini;
pub mod openai;
pub mod prompt;
pub mod reply;

use crate::domain::error::{AnalysisFailure, AppError, Result};
use crate::domain::inspection::AnalysisResult;
use crate::domain::vision_config::{VisionConfig, VisionProvider};
use crate::infrastructure::image_codec::EncodedImage;
use async_trait::async_trait;
use gemini::GeminiVisionClient;
use openai::OpenAIVisionClient;

/// One call to the external vision service for one image. Implementations never retry.
#[async_trait]
pub trait VisionClient {
    async fn analyze(&self, image: &EncodedImage, file_name: &str) -> Result<AnalysisResult>;
}

pub struct RouterClient {
    provider: VisionProvider,
    openai: OpenAIVisionClient,
    gemini: GeminiVisionClient,
}

impl RouterClient {
    pub fn new(config: VisionConfig) -> Self {
        Self {
            provider: config.provider,
            openai: OpenAIVisionClient::new(config.clone()),
            gemini: GeminiVisionClient::new(config),
        }
    }
}

#[async_trait]
impl VisionClient for RouterClient {
    async fn analyze(&self, image: &EncodedImage, file_name: &str) -> Result<AnalysisResult> {
        match self.provider {
            VisionProvider::Gemini => self.gemini.analyze(image, file_name).await,
            VisionProvider::OpenAI => self.openai.analyze(image, file_name).await,
        }
    }
}

fn build_http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

fn api_key(config: &VisionConfig) -> Result<String> {
    config
        .api_key
        .clone()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| {
            AppError::analysis(
                AnalysisFailure::NotConfigured,
                format!("missing API key for {:?} provider", config.provider),
            )
        })
}

fn transport_error(err: reqwest::Error) -> AppError {
    let detail = if err.is_timeout() {
        format!("request timed out: {}", err)
    } else {
        format!("request failed: {}", err)
    };
    AppError::analysis(AnalysisFailure::Unreachable, detail)
}

/// Maps non-success statuses: 4xx means the service refused the input,
/// anything else means it could not serve the request.
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let reason = if status.is_client_error() {
        AnalysisFailure::Rejected
    } else {
        AnalysisFailure::Unreachable
    };
    Err(AppError::analysis(
        reason,
        format!("API error ({}): {}", status, text),
    ))
}
