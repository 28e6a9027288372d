use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::inspection::RiskLevel;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    SinglePhoto,
    Batch,
}

impl ReportKind {
    /// Fixed file-name prefix for rendered reports of this kind.
    pub fn file_prefix(&self) -> &'static str {
        match self {
            ReportKind::SinglePhoto => "Photo_Report",
            ReportKind::Batch => "Safety_Report",
        }
    }
}

/// Style hint attached to text; renderers map it to a colour.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    #[default]
    Neutral,
    Muted,
    Success,
    Warning,
    Danger,
}

impl Tone {
    pub fn for_risk(risk: RiskLevel) -> Self {
        match risk {
            RiskLevel::High => Tone::Danger,
            RiskLevel::Medium => Tone::Warning,
            RiskLevel::Low => Tone::Success,
        }
    }

    pub fn for_safety_score(score: u8) -> Self {
        if score >= 70 {
            Tone::Success
        } else if score >= 40 {
            Tone::Warning
        } else {
            Tone::Danger
        }
    }

    pub fn for_confidence(confidence: u8) -> Self {
        if confidence >= 80 {
            Tone::Danger
        } else {
            Tone::Warning
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableCell {
    pub text: String,
    #[serde(default)]
    pub tone: Tone,
}

impl TableCell {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tone: Tone::Neutral,
        }
    }

    pub fn toned(text: impl Into<String>, tone: Tone) -> Self {
        Self {
            text: text.into(),
            tone,
        }
    }
}

/// One typed block of report content, in reading order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Heading {
        text: String,
        level: u8,
    },
    KeyValueTable {
        rows: Vec<(String, String)>,
    },
    Table {
        columns: Vec<String>,
        /// Relative column widths in percent; empty means evenly split.
        #[serde(default)]
        column_widths: Vec<u8>,
        rows: Vec<Vec<TableCell>>,
    },
    Paragraph {
        text: String,
        #[serde(default)]
        tone: Tone,
    },
}

impl ContentBlock {
    pub fn heading(text: impl Into<String>) -> Self {
        ContentBlock::Heading {
            text: text.into(),
            level: 2,
        }
    }

    pub fn subheading(text: impl Into<String>) -> Self {
        ContentBlock::Heading {
            text: text.into(),
            level: 3,
        }
    }

    pub fn paragraph(text: impl Into<String>, tone: Tone) -> Self {
        ContentBlock::Paragraph {
            text: text.into(),
            tone,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportDocument {
    pub kind: ReportKind,
    pub title: String,
    pub subtitle: String,
    pub generated_at: DateTime<Utc>,
    /// Ids of the photos the report was built from, in session order.
    pub photo_ids: Vec<String>,
    pub blocks: Vec<ContentBlock>,
}

#[cfg(test)]
impl ReportDocument {
    /// Texts of the top-level section headings, in order.
    pub fn section_titles(&self) -> Vec<&str> {
        self.blocks
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Heading { text, level: 2 } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Blocks between the named section heading and the next one.
    pub fn section(&self, title: &str) -> Option<&[ContentBlock]> {
        let start = self.blocks.iter().position(|block| {
            matches!(block, ContentBlock::Heading { text, level: 2 } if text == title)
        })? + 1;
        let end = self.blocks[start..]
            .iter()
            .position(|block| matches!(block, ContentBlock::Heading { level: 2, .. }))
            .map(|offset| start + offset)
            .unwrap_or(self.blocks.len());
        Some(&self.blocks[start..end])
    }
}

/// A report after rendering, ready to be downloaded.
#[derive(Debug, Clone)]
pub struct RenderedReport {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> ReportDocument {
        ReportDocument {
            kind: ReportKind::Batch,
            title: "T".to_string(),
            subtitle: "S".to_string(),
            generated_at: Utc::now(),
            photo_ids: vec![],
            blocks: vec![
                ContentBlock::heading("A"),
                ContentBlock::paragraph("one", Tone::Neutral),
                ContentBlock::subheading("A.1"),
                ContentBlock::heading("B"),
                ContentBlock::paragraph("two", Tone::Muted),
            ],
        }
    }

    #[test]
    fn test_section_titles_skip_subheadings() {
        assert_eq!(document().section_titles(), vec!["A", "B"]);
    }

    #[test]
    fn test_section_slices_until_next_heading() {
        let doc = document();
        assert_eq!(doc.section("A").map(|blocks| blocks.len()), Some(2));
        assert_eq!(doc.section("B").map(|blocks| blocks.len()), Some(1));
        assert!(doc.section("C").is_none());
    }

    #[test]
    fn test_tones() {
        assert_eq!(Tone::for_risk(RiskLevel::High), Tone::Danger);
        assert_eq!(Tone::for_safety_score(70), Tone::Success);
        assert_eq!(Tone::for_safety_score(40), Tone::Warning);
        assert_eq!(Tone::for_safety_score(39), Tone::Danger);
        assert_eq!(Tone::for_confidence(80), Tone::Danger);
        assert_eq!(Tone::for_confidence(79), Tone::Warning);
    }
}
