//! Builds report content trees from analyzed photos and hands them to a renderer.
//!
//! The builders only decide content, grouping and ordering. Layout, colours and
//! pagination belong to the `DocumentRenderer`.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use tracing::{error, info};

use crate::application::use_cases::session_store::SharedSessionStore;
use crate::domain::error::{AppError, Result};
use crate::domain::inspection::{Photo, RiskLevel, SessionStats, Violation, ViolationCategory};
use crate::domain::report::{
    ContentBlock, RenderedReport, ReportDocument, ReportKind, TableCell, Tone,
};
use crate::infrastructure::pdf_renderer::DocumentRenderer;
use crate::infrastructure::storage;

pub const BATCH_REPORT_TITLE: &str = "SAFETY INSPECTION REPORT";
pub const PHOTO_REPORT_TITLE: &str = "PHOTO INSPECTION REPORT";

pub const SECTION_EXECUTIVE_SUMMARY: &str = "EXECUTIVE SUMMARY";
pub const SECTION_RISK_ASSESSMENT: &str = "RISK ASSESSMENT";
pub const SECTION_DETAILED_FINDINGS: &str = "DETAILED FINDINGS";
pub const SECTION_RECOMMENDED_ACTIONS: &str = "RECOMMENDED ACTIONS";
pub const SECTION_PHOTO_DETAILS: &str = "PHOTO DETAILS";
pub const SECTION_VIOLATIONS: &str = "VIOLATIONS";
pub const SECTION_NOTES: &str = "INSPECTOR NOTES";

pub const NO_VIOLATIONS_TEXT: &str = "No violations detected in any of the analyzed photos.";
pub const ALL_COMPLIANT_TEXT: &str =
    "All areas inspected are compliant. Continue regular safety monitoring.";
const PHOTO_NO_VIOLATIONS_TEXT: &str = "No violations detected in this photo.";

const FILE_NAME_DISPLAY_LEN: usize = 15;

/// `High` if any photo is High, else `Medium` if any is Medium, else `Low`.
pub fn overall_risk(photos: &[Photo]) -> RiskLevel {
    photos
        .iter()
        .map(Photo::risk_level)
        .max()
        .unwrap_or(RiskLevel::Low)
}

/// Cuts long names to a fixed number of characters followed by `...`.
pub fn truncate_file_name(name: &str) -> String {
    if name.chars().count() > FILE_NAME_DISPLAY_LEN {
        let head: String = name.chars().take(FILE_NAME_DISPLAY_LEN).collect();
        format!("{}...", head)
    } else {
        name.to_string()
    }
}

/// Categories present in `categories`: fixed ones first, then others in first-seen order.
fn ordered_categories<'a>(
    categories: impl Iterator<Item = &'a ViolationCategory>,
) -> Vec<ViolationCategory> {
    let mut fixed_seen = [false; ViolationCategory::FIXED.len()];
    let mut others: Vec<ViolationCategory> = Vec::new();

    for category in categories {
        match category.rank() {
            Some(rank) => fixed_seen[rank] = true,
            None => {
                if !others.contains(category) {
                    others.push(category.clone());
                }
            }
        }
    }

    ViolationCategory::FIXED
        .iter()
        .zip(fixed_seen)
        .filter(|(_, seen)| *seen)
        .map(|(category, _)| category.clone())
        .chain(others)
        .collect()
}

/// Violations grouped by category in presentation order.
pub fn group_violations(violations: &[Violation]) -> Vec<(ViolationCategory, Vec<&Violation>)> {
    ordered_categories(violations.iter().map(|v| &v.category))
        .into_iter()
        .map(|category| {
            let members = violations.iter().filter(|v| v.category == category).collect();
            (category, members)
        })
        .collect()
}

pub fn build_single_report(photo: &Photo, generated_at: DateTime<Utc>) -> ReportDocument {
    let results = &photo.analysis_results;
    let mut blocks = vec![
        ContentBlock::heading(SECTION_PHOTO_DETAILS),
        ContentBlock::KeyValueTable {
            rows: vec![
                ("File Name".to_string(), photo.file_name.clone()),
                ("Photo ID".to_string(), photo.photo_id.clone()),
                (
                    "Uploaded".to_string(),
                    photo.upload_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
                ),
                (
                    "Processing Time".to_string(),
                    format!("{:.1}s", photo.processing_time),
                ),
                (
                    "Follow-up".to_string(),
                    (if photo.flagged_for_follow_up { "Flagged" } else { "Not flagged" }).to_string(),
                ),
            ],
        },
        ContentBlock::heading(SECTION_RISK_ASSESSMENT),
        ContentBlock::paragraph(
            format!("Risk Level: {}", results.risk_level.as_str().to_uppercase()),
            Tone::for_risk(results.risk_level),
        ),
        ContentBlock::paragraph(
            format!("Safety Score: {}%", results.safety_score),
            Tone::for_safety_score(results.safety_score),
        ),
    ];

    if let Some(summary) = results.summary.as_deref().filter(|s| !s.trim().is_empty()) {
        blocks.push(ContentBlock::paragraph(summary.trim(), Tone::Neutral));
    }

    blocks.push(ContentBlock::heading(SECTION_VIOLATIONS));
    let groups = group_violations(&results.violations);
    if groups.is_empty() {
        blocks.push(ContentBlock::paragraph(PHOTO_NO_VIOLATIONS_TEXT, Tone::Success));
    }
    for (category, members) in groups {
        blocks.push(ContentBlock::subheading(format!(
            "{} ({})",
            category.label(),
            members.len()
        )));
        blocks.push(ContentBlock::Table {
            columns: vec![
                "Violation".to_string(),
                "Location".to_string(),
                "Confidence".to_string(),
            ],
            column_widths: vec![50, 30, 20],
            rows: members
                .into_iter()
                .map(|v| {
                    vec![
                        TableCell::plain(v.violation_type.clone()),
                        TableCell::plain(v.location.clone()),
                        TableCell::toned(
                            format!("{}%", v.confidence),
                            Tone::for_confidence(v.confidence),
                        ),
                    ]
                })
                .collect(),
        });
    }

    let notes = photo.user_notes.trim();
    if !notes.is_empty() {
        blocks.push(ContentBlock::heading(SECTION_NOTES));
        blocks.push(ContentBlock::paragraph(notes, Tone::Neutral));
    }

    ReportDocument {
        kind: ReportKind::SinglePhoto,
        title: PHOTO_REPORT_TITLE.to_string(),
        subtitle: generated_line(generated_at),
        generated_at,
        photo_ids: vec![photo.photo_id.clone()],
        blocks,
    }
}

pub fn build_batch_report(
    photos: &[Photo],
    stats: &SessionStats,
    generated_at: DateTime<Utc>,
) -> ReportDocument {
    let mut blocks = vec![
        ContentBlock::heading(SECTION_EXECUTIVE_SUMMARY),
        ContentBlock::KeyValueTable {
            rows: vec![
                ("Total Photos Analyzed".to_string(), stats.total.to_string()),
                ("High Risk Items".to_string(), stats.high_risk.to_string()),
                ("Medium Risk Items".to_string(), stats.medium_risk.to_string()),
                ("Low Risk Items".to_string(), stats.low_risk.to_string()),
                (
                    "Total Violations Found".to_string(),
                    stats.total_violations.to_string(),
                ),
                (
                    "Average Safety Score".to_string(),
                    format!("{}%", stats.avg_safety_score),
                ),
            ],
        },
    ];

    let overall = overall_risk(photos);
    blocks.push(ContentBlock::heading(SECTION_RISK_ASSESSMENT));
    blocks.push(ContentBlock::paragraph(
        format!("Overall Site Risk Level: {}", overall.as_str().to_uppercase()),
        Tone::for_risk(overall),
    ));

    blocks.push(ContentBlock::heading(SECTION_DETAILED_FINDINGS));
    let findings: Vec<Vec<TableCell>> = photos
        .iter()
        .flat_map(|photo| {
            let risk = photo.risk_level();
            photo.violations().iter().map(move |v| {
                vec![
                    TableCell::plain(truncate_file_name(&photo.file_name)),
                    TableCell::plain(v.violation_type.clone()),
                    TableCell::plain(v.category.label()),
                    TableCell::plain(v.location.clone()),
                    TableCell::toned(
                        format!("{}%", v.confidence),
                        Tone::for_confidence(v.confidence),
                    ),
                    TableCell::toned(risk.as_str(), Tone::for_risk(risk)),
                ]
            })
        })
        .collect();

    if findings.is_empty() {
        blocks.push(ContentBlock::paragraph(NO_VIOLATIONS_TEXT, Tone::Muted));
    } else {
        blocks.push(ContentBlock::Table {
            columns: ["File", "Violation", "Category", "Location", "Confidence", "Risk"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            column_widths: vec![17, 24, 17, 17, 14, 11],
            rows: findings,
        });
    }

    blocks.push(ContentBlock::heading(SECTION_RECOMMENDED_ACTIONS));
    let all_violations: Vec<&Violation> = photos.iter().flat_map(|p| p.violations()).collect();
    let recommendations: Vec<Vec<TableCell>> =
        ordered_categories(all_violations.iter().map(|v| &v.category))
            .into_iter()
            .map(|category| {
                let count = all_violations
                    .iter()
                    .filter(|v| v.category == category)
                    .count();
                vec![
                    TableCell::plain(category.action_title()),
                    TableCell::plain(format!("{} violation(s) found", count)),
                    TableCell::plain(category.recommendation()),
                ]
            })
            .collect();

    if recommendations.is_empty() {
        blocks.push(ContentBlock::paragraph(ALL_COMPLIANT_TEXT, Tone::Success));
    } else {
        blocks.push(ContentBlock::Table {
            columns: vec![
                "Category".to_string(),
                "Issues".to_string(),
                "Recommended Action".to_string(),
            ],
            column_widths: vec![21, 18, 61],
            rows: recommendations,
        });
    }

    ReportDocument {
        kind: ReportKind::Batch,
        title: BATCH_REPORT_TITLE.to_string(),
        subtitle: generated_line(generated_at),
        generated_at,
        photo_ids: photos.iter().map(|p| p.photo_id.clone()).collect(),
        blocks,
    }
}

fn generated_line(generated_at: DateTime<Utc>) -> String {
    format!("Generated: {}", generated_at.format("%Y-%m-%d %H:%M:%S UTC"))
}

/// `<prefix>_<YYYY-MM-DD>_<HHMMSS>_<hash8>.<extension>`, hashed over the photo ids
/// and the full-precision generation time.
pub fn report_file_name(document: &ReportDocument, extension: &str) -> String {
    let mut hasher = Sha256::new();
    for id in &document.photo_ids {
        hasher.update(id.as_bytes());
        hasher.update(b"\n");
    }
    hasher.update(
        document
            .generated_at
            .to_rfc3339_opts(SecondsFormat::Nanos, true)
            .as_bytes(),
    );
    let digest = hex::encode(hasher.finalize());

    format!(
        "{}_{}_{}.{}",
        document.kind.file_prefix(),
        document.generated_at.format("%Y-%m-%d_%H%M%S"),
        &digest[..8],
        extension
    )
}

pub struct ReportService {
    session: SharedSessionStore,
    renderer: Arc<dyn DocumentRenderer + Send + Sync>,
    output_dir: Option<PathBuf>,
}

impl ReportService {
    pub fn new(
        session: SharedSessionStore,
        renderer: Arc<dyn DocumentRenderer + Send + Sync>,
        output_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            session,
            renderer,
            output_dir,
        }
    }

    pub async fn document_batch(&self) -> Result<ReportDocument> {
        let store = self.session.read().await;
        if store.photos().is_empty() {
            return Err(AppError::ValidationError(
                "no photos to generate report".to_string(),
            ));
        }
        Ok(build_batch_report(
            store.photos(),
            &store.compute_stats(),
            Utc::now(),
        ))
    }

    pub async fn document_photo(&self, photo_id: &str) -> Result<ReportDocument> {
        let store = self.session.read().await;
        let photo = store
            .get(photo_id)
            .ok_or_else(|| AppError::NotFound(format!("photo {}", photo_id)))?;
        Ok(build_single_report(photo, Utc::now()))
    }

    pub async fn export_batch(&self) -> Result<RenderedReport> {
        let document = self.document_batch().await?;
        self.render(document).await
    }

    pub async fn export_photo(&self, photo_id: &str) -> Result<RenderedReport> {
        let document = self.document_photo(photo_id).await?;
        self.render(document).await
    }

    async fn render(&self, document: ReportDocument) -> Result<RenderedReport> {
        let file_name = report_file_name(&document, self.renderer.extension());
        let content_type = self.renderer.content_type();
        let renderer = self.renderer.clone();

        let rendered = tokio::task::spawn_blocking(move || renderer.render(&document))
            .await
            .map_err(|e| AppError::Synthesis(format!("render task failed: {}", e)))?;

        let bytes = rendered.map_err(|e| {
            error!(file_name = %file_name, error = %e, "Report rendering failed");
            match e {
                AppError::Synthesis(_) => e,
                other => AppError::Synthesis(other.to_string()),
            }
        })?;

        if let Some(dir) = &self.output_dir {
            let path = storage::save_report(dir, &file_name, &bytes)?;
            info!(path = %path.display(), "Report saved");
        }

        info!(file_name = %file_name, bytes = bytes.len(), "Report generated");
        Ok(RenderedReport {
            file_name,
            content_type,
            bytes,
        })
    }
}
