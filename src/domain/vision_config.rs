use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum VisionProvider {
    /// Any OpenAI-compatible chat-completions endpoint with image input.
    OpenAI,
    Gemini,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct VisionConfig {
    pub provider: VisionProvider,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub timeout_secs: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            provider: VisionProvider::OpenAI,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            api_key: None,
            max_tokens: Some(1500),
            temperature: Some(0.2),
            timeout_secs: 120,
        }
    }
}
