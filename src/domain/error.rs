use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a single call to the vision service failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisFailure {
    /// Transport error, timeout, or a 5xx from the service.
    Unreachable,
    /// The service refused the input (4xx), e.g. unsupported image.
    Rejected,
    /// The reply could not be mapped into an `AnalysisResult`.
    Malformed,
    /// No credentials were configured for the selected provider.
    NotConfigured,
}

impl fmt::Display for AnalysisFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AnalysisFailure::Unreachable => "service unreachable",
            AnalysisFailure::Rejected => "input rejected",
            AnalysisFailure::Malformed => "malformed reply",
            AnalysisFailure::NotConfigured => "not configured",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub enum AppError {
    Internal(String),
    NotFound(String),
    ValidationError(String),
    ConfigError(String),
    IoError(String),
    Codec(String),
    Analysis {
        reason: AnalysisFailure,
        detail: String,
    },
    Synthesis(String),
}

impl AppError {
    pub fn analysis(reason: AnalysisFailure, detail: impl Into<String>) -> Self {
        AppError::Analysis {
            reason,
            detail: detail.into(),
        }
    }

    /// Failures scoped to one photo of a batch; these never escape the batch loop.
    pub fn is_per_photo(&self) -> bool {
        matches!(self, AppError::Codec(_) | AppError::Analysis { .. })
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Config error: {}", msg),
            AppError::IoError(msg) => write!(f, "IO error: {}", msg),
            AppError::Codec(msg) => write!(f, "Codec error: {}", msg),
            AppError::Analysis { reason, detail } => {
                write!(f, "Analysis error ({}): {}", reason, detail)
            }
            AppError::Synthesis(msg) => write!(f, "Report synthesis error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(err.to_string())
    }
}

impl From<figment::Error> for AppError {
    fn from(err: figment::Error) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_error_display_includes_reason() {
        let err = AppError::analysis(AnalysisFailure::Rejected, "unsupported format");
        assert_eq!(
            err.to_string(),
            "Analysis error (input rejected): unsupported format"
        );
    }

    #[test]
    fn test_per_photo_classification() {
        assert!(AppError::Codec("empty".to_string()).is_per_photo());
        assert!(AppError::analysis(AnalysisFailure::Malformed, "x").is_per_photo());
        assert!(!AppError::Synthesis("x".to_string()).is_per_photo());
        assert!(!AppError::NotFound("x".to_string()).is_per_photo());
    }
}
