use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use tracing::debug;

use crate::domain::error::{AppError, Result};
use crate::domain::report::{ContentBlock, ReportDocument, TableCell, Tone};

/// Turns a report content tree into one downloadable document.
pub trait DocumentRenderer {
    fn render(&self, document: &ReportDocument) -> Result<Vec<u8>>;
    fn content_type(&self) -> &'static str;
    fn extension(&self) -> &'static str;
}

type Rgb = [u8; 3];

const PRIMARY: Rgb = [15, 23, 42];
const ACCENT: Rgb = [249, 115, 22];
const RED: Rgb = [239, 68, 68];
const AMBER: Rgb = [245, 158, 11];
const GREEN: Rgb = [34, 197, 94];
const MUTED: Rgb = [100, 116, 139];
const TEXT: Rgb = [30, 41, 59];
const WHITE: Rgb = [255, 255, 255];
const STRIPE: Rgb = [241, 245, 249];
const HEADER_SUBTITLE: Rgb = [203, 213, 225];

// A4 in points.
const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 40.0;
const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;
const HEADER_BAND: f32 = 80.0;
const FOOTER_TOP: f32 = 50.0;

const REGULAR: &str = "F1";
const BOLD: &str = "F2";

/// Helvetica has no metrics table here; this average keeps wrapping conservative.
const AVG_CHAR_WIDTH: f32 = 0.52;

fn tone_color(tone: Tone) -> Rgb {
    match tone {
        Tone::Neutral => TEXT,
        Tone::Muted => MUTED,
        Tone::Success => GREEN,
        Tone::Warning => AMBER,
        Tone::Danger => RED,
    }
}

/// PDF renderer built on `lopdf`, using the standard Helvetica faces.
pub struct PdfRenderer {
    product_line: String,
}

impl PdfRenderer {
    pub fn new(organization: &str) -> Self {
        Self {
            product_line: format!("{} - AI-Powered Inspection Tool", organization),
        }
    }
}

impl DocumentRenderer for PdfRenderer {
    fn render(&self, document: &ReportDocument) -> Result<Vec<u8>> {
        let mut layout = Layout::new();
        layout.header_band(&document.title, &document.subtitle);

        for block in &document.blocks {
            match block {
                ContentBlock::Heading { text, level } => layout.heading(text, *level),
                ContentBlock::KeyValueTable { rows } => layout.key_value_table(rows),
                ContentBlock::Table {
                    columns,
                    column_widths,
                    rows,
                } => layout.table(columns, column_widths, rows),
                ContentBlock::Paragraph { text, tone } => layout.paragraph(text, *tone),
            }
        }

        let pages = layout.finish(&self.product_line);
        debug!(pages = pages.len(), blocks = document.blocks.len(), "Laid out report");
        assemble(pages)
    }

    fn content_type(&self) -> &'static str {
        "application/pdf"
    }

    fn extension(&self) -> &'static str {
        "pdf"
    }
}

struct Layout {
    pages: Vec<Vec<Operation>>,
    y: f32,
}

impl Layout {
    fn new() -> Self {
        Self {
            pages: vec![Vec::new()],
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn ops(&mut self) -> &mut Vec<Operation> {
        if self.pages.is_empty() {
            self.pages.push(Vec::new());
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn new_page(&mut self) {
        self.pages.push(Vec::new());
        self.y = PAGE_HEIGHT - MARGIN;
    }

    /// Starts a new page unless `height` still fits above the footer.
    fn reserve(&mut self, height: f32) -> bool {
        if self.y - height < FOOTER_TOP {
            self.new_page();
            return true;
        }
        false
    }

    fn header_band(&mut self, title: &str, subtitle: &str) {
        let top = PAGE_HEIGHT - HEADER_BAND;
        let ops = self.ops();
        fill_rect(ops, 0.0, top, PAGE_WIDTH, HEADER_BAND, PRIMARY);
        fill_rect(ops, 0.0, top, PAGE_WIDTH, 3.0, ACCENT);
        text(ops, BOLD, 18.0, MARGIN, PAGE_HEIGHT - 38.0, title, WHITE);
        text(ops, REGULAR, 10.0, MARGIN, PAGE_HEIGHT - 58.0, subtitle, HEADER_SUBTITLE);
        self.y = top - 24.0;
    }

    fn heading(&mut self, content: &str, level: u8) {
        let (size, gap) = if level <= 2 { (14.0, 10.0) } else { (11.0, 6.0) };
        // Keep a heading together with at least a line of what follows it.
        self.reserve(size + gap + 30.0);
        self.y -= size;
        let y = self.y;
        text(self.ops(), BOLD, size, MARGIN, y, content, TEXT);
        self.y -= gap;
    }

    fn key_value_table(&mut self, rows: &[(String, String)]) {
        const ROW: f32 = 18.0;
        for (index, (label, value)) in rows.iter().enumerate() {
            self.reserve(ROW);
            let top = self.y;
            let ops = self.ops();
            if index % 2 == 0 {
                fill_rect(ops, MARGIN, top - ROW, CONTENT_WIDTH, ROW, STRIPE);
            }
            text(ops, BOLD, 10.0, MARGIN + 6.0, top - 12.5, label, MUTED);
            text(ops, REGULAR, 10.0, MARGIN + 200.0, top - 12.5, value, TEXT);
            self.y -= ROW;
        }
        self.y -= 12.0;
    }

    fn table(&mut self, columns: &[String], widths: &[u8], rows: &[Vec<TableCell>]) {
        const FONT: f32 = 8.0;
        const LINE: f32 = 10.0;
        const PAD: f32 = 4.0;

        let widths = column_widths(columns.len(), widths);
        let header_height = LINE + 2.0 * PAD;

        self.reserve(header_height + LINE + 2.0 * PAD);
        self.table_header(columns, &widths, FONT, header_height);

        for (index, row) in rows.iter().enumerate() {
            let wrapped: Vec<Vec<String>> = widths
                .iter()
                .enumerate()
                .map(|(col, width)| {
                    let cell = row.get(col).map(|c| c.text.as_str()).unwrap_or("");
                    wrap(cell, FONT, width - 2.0 * PAD)
                })
                .collect();
            let lines = wrapped.iter().map(Vec::len).max().unwrap_or(1).max(1);
            let height = lines as f32 * LINE + 2.0 * PAD;

            if self.reserve(height) {
                self.table_header(columns, &widths, FONT, header_height);
            }

            let top = self.y;
            let ops = self.ops();
            if index % 2 == 1 {
                fill_rect(ops, MARGIN, top - height, CONTENT_WIDTH, height, STRIPE);
            }
            let mut x = MARGIN;
            for (col, width) in widths.iter().enumerate() {
                let tone = row.get(col).map(|c| c.tone).unwrap_or_default();
                let font = if col == 0 { BOLD } else { REGULAR };
                for (line_no, line) in wrapped[col].iter().enumerate() {
                    let baseline = top - PAD - FONT - line_no as f32 * LINE;
                    text(ops, font, FONT, x + PAD, baseline, line, tone_color(tone));
                }
                x += width;
            }
            self.y -= height;
        }
        self.y -= 14.0;
    }

    fn table_header(&mut self, columns: &[String], widths: &[f32], font: f32, height: f32) {
        let top = self.y;
        let ops = self.ops();
        fill_rect(ops, MARGIN, top - height, CONTENT_WIDTH, height, PRIMARY);
        let mut x = MARGIN;
        for (column, width) in columns.iter().zip(widths) {
            text(ops, BOLD, font, x + 4.0, top - height + 5.5, column, WHITE);
            x += width;
        }
        self.y -= height;
    }

    fn paragraph(&mut self, content: &str, tone: Tone) {
        const FONT: f32 = 10.0;
        const LINE: f32 = 14.0;
        for line in wrap(content, FONT, CONTENT_WIDTH) {
            self.reserve(LINE);
            self.y -= LINE;
            let y = self.y;
            text(self.ops(), REGULAR, FONT, MARGIN, y + 3.0, &line, tone_color(tone));
        }
        self.y -= 10.0;
    }

    /// Adds the footer to every page and returns the page contents.
    fn finish(mut self, product_line: &str) -> Vec<Vec<Operation>> {
        let total = self.pages.len();
        for (index, ops) in self.pages.iter_mut().enumerate() {
            stroke_line(ops, MARGIN, 36.0, PAGE_WIDTH - MARGIN, 36.0, STRIPE);
            text(ops, REGULAR, 8.0, MARGIN, 24.0, product_line, MUTED);
            let page_label = format!("Page {} of {}", index + 1, total);
            text(ops, REGULAR, 8.0, PAGE_WIDTH / 2.0 - 20.0, 24.0, &page_label, MUTED);
            text(ops, REGULAR, 8.0, PAGE_WIDTH - MARGIN - 48.0, 24.0, "Confidential", MUTED);
        }
        self.pages
    }
}

/// Splits percentage widths over the content width; missing widths split evenly.
fn column_widths(count: usize, percents: &[u8]) -> Vec<f32> {
    if count == 0 {
        return Vec::new();
    }
    if percents.len() != count {
        return vec![CONTENT_WIDTH / count as f32; count];
    }
    let total: f32 = percents.iter().map(|p| *p as f32).sum::<f32>().max(1.0);
    percents
        .iter()
        .map(|p| CONTENT_WIDTH * (*p as f32) / total)
        .collect()
}

/// Greedy word wrap; words longer than a line are broken.
fn wrap(content: &str, font_size: f32, width: f32) -> Vec<String> {
    let max_chars = ((width / (font_size * AVG_CHAR_WIDTH)).floor() as usize).max(1);
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in content.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(max_chars);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        let word: String = word.into_iter().collect();
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

/// Standard fonts cover Latin-1 only; map the rest to close ASCII.
fn pdf_text(content: &str) -> String {
    content
        .chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2013}' | '\u{2014}' => '-',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '?',
        })
        .collect()
}

fn rgb(color: Rgb) -> Vec<Object> {
    color.iter().map(|c| Object::from(*c as f32 / 255.0)).collect()
}

fn text(ops: &mut Vec<Operation>, font: &str, size: f32, x: f32, y: f32, content: &str, color: Rgb) {
    ops.push(Operation::new("rg", rgb(color)));
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new("Tf", vec![font.into(), size.into()]));
    ops.push(Operation::new("Td", vec![x.into(), y.into()]));
    ops.push(Operation::new(
        "Tj",
        vec![Object::string_literal(pdf_text(content))],
    ));
    ops.push(Operation::new("ET", vec![]));
}

fn fill_rect(ops: &mut Vec<Operation>, x: f32, y: f32, width: f32, height: f32, color: Rgb) {
    ops.push(Operation::new("rg", rgb(color)));
    ops.push(Operation::new(
        "re",
        vec![x.into(), y.into(), width.into(), height.into()],
    ));
    ops.push(Operation::new("f", vec![]));
}

fn stroke_line(ops: &mut Vec<Operation>, x1: f32, y1: f32, x2: f32, y2: f32, color: Rgb) {
    ops.push(Operation::new("RG", rgb(color)));
    ops.push(Operation::new("w", vec![0.5f32.into()]));
    ops.push(Operation::new("m", vec![x1.into(), y1.into()]));
    ops.push(Operation::new("l", vec![x2.into(), y2.into()]));
    ops.push(Operation::new("S", vec![]));
}

fn synthesis_error(err: impl std::fmt::Display) -> AppError {
    AppError::Synthesis(format!("Failed to build PDF: {}", err))
}

fn assemble(pages: Vec<Vec<Operation>>) -> Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            REGULAR => regular_id,
            BOLD => bold_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for operations in pages {
        let content = Content { operations };
        let stream = Stream::new(dictionary! {}, content.encode().map_err(synthesis_error)?);
        let content_id = doc.add_object(stream);
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.0f32.into(), 0.0f32.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).map_err(synthesis_error)?;
    Ok(bytes)
}
