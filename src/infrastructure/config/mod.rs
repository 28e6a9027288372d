use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::error::Result;
use crate::domain::vision_config::VisionConfig;

pub const DEFAULT_CONFIG_FILE: &str = "safety_vision.toml";
pub const CONFIG_PATH_ENV: &str = "SAFETY_VISION_CONFIG";
pub const ENV_PREFIX: &str = "SAFETY_VISION_";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub vision: VisionConfig,
    pub server: ServerConfig,
    pub batch: BatchConfig,
    pub reports: ReportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8001,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// How long finished upload tasks stay visible before the map is cleared.
    pub progress_clear_delay_ms: u64,
    /// Capacity of the batch event channel.
    pub event_capacity: usize,
}

impl BatchConfig {
    pub fn progress_clear_delay(&self) -> Duration {
        Duration::from_millis(self.progress_clear_delay_ms)
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            progress_clear_delay_ms: 2000,
            event_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// When set, every rendered report is also written here.
    pub output_dir: Option<PathBuf>,
    pub organization: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            organization: "Safety Vision".to_string(),
        }
    }
}

impl AppConfig {
    /// Defaults, then the TOML file, then `SAFETY_VISION_*` environment variables.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let config = Self::figment(path).extract()?;
        Ok(config)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::vision_config::VisionProvider;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8001);
        assert_eq!(config.batch.progress_clear_delay(), Duration::from_secs(2));
        assert_eq!(config.vision.provider, VisionProvider::OpenAI);
        assert!(config.reports.output_dir.is_none());
    }

    #[test]
    fn test_layering_file_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "custom.toml",
                r#"
                [vision]
                provider = "Gemini"
                model = "gemini-1.5-pro"

                [server]
                port = 9100
                "#,
            )?;
            jail.set_env("SAFETY_VISION_VISION__API_KEY", "secret");
            jail.set_env("SAFETY_VISION_BATCH__PROGRESS_CLEAR_DELAY_MS", "50");

            let config = AppConfig::load_from(Path::new("custom.toml"))
                .map_err(|e| figment::Error::from(e.to_string()))?;
            assert_eq!(config.vision.provider, VisionProvider::Gemini);
            assert_eq!(config.vision.model, "gemini-1.5-pro");
            assert_eq!(config.vision.api_key.as_deref(), Some("secret"));
            assert_eq!(config.vision.timeout_secs, 120);
            assert_eq!(config.server.port, 9100);
            assert_eq!(config.server.host, "127.0.0.1");
            assert_eq!(config.batch.progress_clear_delay_ms, 50);
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = AppConfig::load_from(Path::new("absent.toml"))
                .map_err(|e| figment::Error::from(e.to_string()))?;
            assert_eq!(config.server.port, 8001);
            Ok(())
        });
    }
}
