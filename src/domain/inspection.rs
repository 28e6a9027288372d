use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Coarse severity of one photo. Declaration order is severity order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            other => Err(format!("unknown risk level '{}'", other)),
        }
    }
}

/// Violation category. Unknown labels are kept in `Other` rather than dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ViolationCategory {
    Ppe,
    Equipment,
    Environmental,
    Housekeeping,
    Other(String),
}

impl ViolationCategory {
    /// Fixed presentation order for grouping and recommendations.
    pub const FIXED: [ViolationCategory; 4] = [
        ViolationCategory::Ppe,
        ViolationCategory::Equipment,
        ViolationCategory::Environmental,
        ViolationCategory::Housekeeping,
    ];

    pub fn from_label(label: &str) -> Self {
        let trimmed = label.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "ppe" => ViolationCategory::Ppe,
            "equipment" => ViolationCategory::Equipment,
            "environmental" => ViolationCategory::Environmental,
            "housekeeping" => ViolationCategory::Housekeeping,
            _ => ViolationCategory::Other(trimmed.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            ViolationCategory::Ppe => "PPE",
            ViolationCategory::Equipment => "Equipment",
            ViolationCategory::Environmental => "Environmental",
            ViolationCategory::Housekeeping => "Housekeeping",
            ViolationCategory::Other(label) => label,
        }
    }

    /// Position in the fixed order; `None` for `Other`.
    pub fn rank(&self) -> Option<usize> {
        Self::FIXED.iter().position(|fixed| fixed == self)
    }

    /// Heading used in the recommended-actions table.
    pub fn action_title(&self) -> String {
        match self {
            ViolationCategory::Ppe => "PPE Compliance".to_string(),
            ViolationCategory::Equipment => "Equipment Safety".to_string(),
            ViolationCategory::Environmental => "Environmental Hazards".to_string(),
            ViolationCategory::Housekeeping => "Housekeeping".to_string(),
            ViolationCategory::Other(label) => label.clone(),
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            ViolationCategory::Ppe => {
                "Conduct immediate PPE inspection. Ensure all personnel have proper hard hats, safety vests, gloves, and eye protection."
            }
            ViolationCategory::Equipment => {
                "Review equipment placement and guarding. Ensure all machinery has proper safety guards and is correctly positioned."
            }
            ViolationCategory::Environmental => {
                "Address spills, exposed wiring, and fire hazards immediately. Ensure proper containment and signage."
            }
            ViolationCategory::Housekeeping => {
                "Schedule immediate cleanup. Remove debris, organize work areas, and establish regular housekeeping protocols."
            }
            ViolationCategory::Other(_) => {
                "Review these findings with the site supervisor and assign corrective actions."
            }
        }
    }
}

impl From<String> for ViolationCategory {
    fn from(value: String) -> Self {
        ViolationCategory::from_label(&value)
    }
}

impl From<ViolationCategory> for String {
    fn from(value: ViolationCategory) -> Self {
        value.label().to_string()
    }
}

impl fmt::Display for ViolationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Violation {
    #[serde(rename = "type")]
    pub violation_type: String,
    pub category: ViolationCategory,
    pub location: String,
    /// 0-100
    pub confidence: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub risk_level: RiskLevel,
    /// 0-100
    pub safety_score: u8,
    /// Detection order as reported by the service.
    pub violations: Vec<Violation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Set when the reply had to be adjusted, e.g. a clamped score.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl AnalysisResult {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Display-only reference to the original image bytes, see `PreviewStore`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PreviewHandle(pub String);

impl PreviewHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub photo_id: String,
    pub file_name: String,
    pub preview_reference: PreviewHandle,
    pub upload_time: DateTime<Utc>,
    /// Seconds from the start of conversion to the end of analysis.
    pub processing_time: f64,
    pub analysis_results: AnalysisResult,
    pub user_notes: String,
    pub flagged_for_follow_up: bool,
}

impl Photo {
    /// Builds a photo for a successful analysis. Ids are fresh v4 UUIDs and never reused.
    pub fn from_analysis(
        file_name: impl Into<String>,
        preview_reference: PreviewHandle,
        analysis_results: AnalysisResult,
        processing_time: f64,
    ) -> Self {
        let flagged_for_follow_up = analysis_results.risk_level == RiskLevel::High;
        Self {
            photo_id: Uuid::new_v4().to_string(),
            file_name: file_name.into(),
            preview_reference,
            upload_time: Utc::now(),
            processing_time,
            analysis_results,
            user_notes: String::new(),
            flagged_for_follow_up,
        }
    }

    pub fn risk_level(&self) -> RiskLevel {
        self.analysis_results.risk_level
    }

    pub fn violations(&self) -> &[Violation] {
        &self.analysis_results.violations
    }
}

/// Aggregates derived from the session's current photos.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub total: usize,
    pub high_risk: usize,
    pub medium_risk: usize,
    pub low_risk: usize,
    pub total_violations: usize,
    /// Rounded mean, 0 for an empty session.
    pub avg_safety_score: u32,
}

impl SessionStats {
    pub fn from_photos(photos: &[Photo]) -> Self {
        let mut stats = SessionStats {
            total: photos.len(),
            ..Default::default()
        };
        let mut score_sum: u64 = 0;

        for photo in photos {
            match photo.risk_level() {
                RiskLevel::High => stats.high_risk += 1,
                RiskLevel::Medium => stats.medium_risk += 1,
                RiskLevel::Low => stats.low_risk += 1,
            }
            stats.total_violations += photo.violations().len();
            score_sum += u64::from(photo.analysis_results.safety_score);
        }

        if !photos.is_empty() {
            stats.avg_safety_score = (score_sum as f64 / photos.len() as f64).round() as u32;
        }

        stats
    }
}
