//! Mapping of raw model replies into the canonical `AnalysisResult`.

use serde_json::{Map, Value};
use tracing::warn;

use crate::domain::error::{AnalysisFailure, AppError, Result};
use crate::domain::inspection::{AnalysisResult, RiskLevel, Violation, ViolationCategory};
use crate::infrastructure::response::clean_json_reply;

fn malformed(detail: impl Into<String>) -> AppError {
    AppError::analysis(AnalysisFailure::Malformed, detail)
}

pub fn parse_analysis_reply(raw: &str) -> Result<AnalysisResult> {
    let cleaned = clean_json_reply(raw);
    if cleaned.is_empty() {
        return Err(malformed("empty reply"));
    }

    let value: Value = serde_json::from_str(&cleaned)
        .map_err(|e| malformed(format!("reply is not valid JSON: {}", e)))?;
    let object = value
        .as_object()
        .ok_or_else(|| malformed("reply is not a JSON object"))?;

    let risk_level = required_str(object, "riskLevel")?
        .parse::<RiskLevel>()
        .map_err(malformed)?;

    let mut warnings = Vec::new();
    let safety_score = bounded_percent(
        object
            .get("safetyScore")
            .ok_or_else(|| malformed("missing safetyScore"))?,
        "safetyScore",
        &mut warnings,
    )?;

    let violations = match object.get("violations") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(index, item)| parse_violation(index, item, &mut warnings))
            .collect::<Result<Vec<_>>>()?,
        Some(_) => return Err(malformed("violations is not a list")),
    };

    let summary = object
        .get("summary")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    for warning in &warnings {
        warn!(warning = %warning, "Adjusted vision reply");
    }

    Ok(AnalysisResult {
        risk_level,
        safety_score,
        violations,
        summary,
        warnings,
    })
}

fn parse_violation(index: usize, item: &Value, warnings: &mut Vec<String>) -> Result<Violation> {
    let object = item
        .as_object()
        .ok_or_else(|| malformed(format!("violation {} is not an object", index)))?;

    let confidence = bounded_percent(
        object
            .get("confidence")
            .ok_or_else(|| malformed(format!("violation {} has no confidence", index)))?,
        &format!("violations[{}].confidence", index),
        warnings,
    )?;

    Ok(Violation {
        violation_type: required_str(object, "type")?.trim().to_string(),
        category: ViolationCategory::from_label(required_str(object, "category")?),
        location: required_str(object, "location")?.trim().to_string(),
        confidence,
    })
}

fn required_str<'a>(object: &'a Map<String, Value>, field: &str) -> Result<&'a str> {
    object
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(format!("missing or non-string {}", field)))
}

/// Reads a 0-100 integer, accepting floats and numeric strings. Out-of-range
/// values are clamped and recorded in `warnings`.
fn bounded_percent(value: &Value, field: &str, warnings: &mut Vec<String>) -> Result<u8> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
    .ok_or_else(|| malformed(format!("{} is not a number", field)))?;

    let rounded = number.round();
    if !(0.0..=100.0).contains(&rounded) {
        warnings.push(format!("{} {} clamped into 0-100", field, number));
    }
    Ok(rounded.clamp(0.0, 100.0) as u8)
}
