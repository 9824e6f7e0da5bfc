//! Minimal PDF writer for conclusion documents.
//!
//! Uses the standard Type1 fonts (no embedding) on A4 pages. Output depends
//! only on the input and the configured logo.

use std::fmt::Write as _;
use std::path::Path;

use tracing::warn;

use super::jpeg::{parse_jpeg, JpegInfo};
use super::{ArtifactError, ArtifactInput, ArtifactRenderer};
use crate::config::ArtifactConfig;
use crate::report::FindingDraft;

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 50.0;
const FOOTER_SPACE: f32 = 30.0;
const LOGO_WIDTH: f32 = 90.0;
const BODY_CHARS: usize = 92;
const TABLE_CHARS: usize = 90;
const SEVERITY_COL: usize = 10;
const CODE_COL: usize = 26;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Font {
    Regular,
    Bold,
    Mono,
}

impl Font {
    fn resource(&self) -> &'static str {
        match self {
            Font::Regular => "/F1",
            Font::Bold => "/F2",
            Font::Mono => "/F3",
        }
    }
}

#[derive(Debug, Clone)]
enum Line {
    Text { font: Font, size: f32, text: String },
    Gap(f32),
}

impl Line {
    fn text(font: Font, size: f32, text: impl Into<String>) -> Self {
        Line::Text {
            font,
            size,
            text: text.into(),
        }
    }

    fn height(&self) -> f32 {
        match self {
            Line::Text { size, .. } => size * 1.4,
            Line::Gap(h) => *h,
        }
    }
}

struct Logo {
    info: JpegInfo,
    data: Vec<u8>,
}

/// PDF renderer for conclusion documents.
pub struct PdfRenderer {
    title: String,
    organization: Option<String>,
    max_pages: usize,
    logo: Option<Logo>,
}

impl PdfRenderer {
    pub fn new(config: &ArtifactConfig) -> Self {
        let logo = config.logo_path.as_deref().and_then(load_logo);
        Self {
            title: config.title.clone(),
            organization: config.organization.clone(),
            max_pages: config.max_pages,
            logo,
        }
    }

    pub fn has_logo(&self) -> bool {
        self.logo.is_some()
    }

    fn layout(&self, input: &ArtifactInput<'_>) -> Vec<Line> {
        let mut lines = Vec::new();

        lines.push(Line::text(Font::Bold, 18.0, self.title.clone()));
        if let Some(ref org) = self.organization {
            lines.push(Line::text(Font::Regular, 10.0, org.clone()));
        }
        lines.push(Line::Gap(12.0));

        let metadata = [
            ("Report", input.report_id.to_string()),
            ("Tenant", input.tenant_id.to_string()),
            ("Document", input.filename.to_string()),
            ("Uploaded by", input.uploaded_by.to_string()),
            (
                "Uploaded at",
                input.uploaded_at.format("%Y-%m-%d %H:%M UTC").to_string(),
            ),
            (
                "Analysis",
                format!("{} {}", input.engine, input.engine_version),
            ),
        ];
        for (label, value) in metadata {
            for (i, chunk) in wrap(&value, BODY_CHARS - 14).into_iter().enumerate() {
                let label = if i == 0 { label } else { "" };
                lines.push(Line::text(
                    Font::Regular,
                    10.0,
                    format!("{:<14}{}", label, chunk),
                ));
            }
        }
        lines.push(Line::Gap(14.0));

        lines.push(Line::text(Font::Bold, 13.0, "Summary"));
        lines.push(Line::text(
            Font::Bold,
            11.0,
            format!("Score: {}/100", input.score),
        ));
        for chunk in wrap(input.summary, BODY_CHARS) {
            lines.push(Line::text(Font::Regular, 10.0, chunk));
        }
        lines.push(Line::Gap(14.0));

        lines.push(Line::text(Font::Bold, 13.0, "Findings"));
        if input.findings.is_empty() {
            lines.push(Line::text(Font::Regular, 10.0, "No findings."));
        } else {
            lines.push(Line::text(
                Font::Mono,
                9.0,
                format!(
                    "{:<sev$}{:<code$}{}",
                    "SEVERITY",
                    "CODE",
                    "MESSAGE",
                    sev = SEVERITY_COL,
                    code = CODE_COL
                ),
            ));
            lines.push(Line::text(Font::Mono, 9.0, "-".repeat(TABLE_CHARS)));
            for finding in input.findings {
                table_rows(finding, &mut lines);
            }
        }

        lines
    }

    fn paginate(&self, lines: Vec<Line>) -> Vec<Vec<Line>> {
        let usable = PAGE_HEIGHT - 2.0 * MARGIN - FOOTER_SPACE;
        let mut pages = vec![Vec::new()];
        let mut used = 0.0;
        for line in lines {
            let h = line.height();
            if used + h > usable && used > 0.0 {
                pages.push(Vec::new());
                used = 0.0;
                if matches!(line, Line::Gap(_)) {
                    continue;
                }
            }
            used += h;
            if let Some(page) = pages.last_mut() {
                page.push(line);
            }
        }
        pages
    }

    fn page_content(&self, lines: &[Line], page_no: usize, page_count: usize) -> String {
        let mut out = String::new();

        if page_no == 1 {
            if let Some(ref logo) = self.logo {
                let h = LOGO_WIDTH * logo.info.height as f32 / logo.info.width as f32;
                let x = PAGE_WIDTH - MARGIN - LOGO_WIDTH;
                let y = PAGE_HEIGHT - MARGIN - h;
                let _ = writeln!(
                    out,
                    "q {:.2} 0 0 {:.2} {:.2} {:.2} cm /Im1 Do Q",
                    LOGO_WIDTH, h, x, y
                );
            }
        }

        let mut y = PAGE_HEIGHT - MARGIN;
        for line in lines {
            y -= line.height();
            if let Line::Text { font, size, text } = line {
                let _ = writeln!(
                    out,
                    "BT {} {:.1} Tf {:.2} {:.2} Td ({}) Tj ET",
                    font.resource(),
                    size,
                    MARGIN,
                    y,
                    escape_text(text)
                );
            }
        }

        let _ = writeln!(
            out,
            "BT /F1 8.0 Tf {:.2} {:.2} Td (Page {} of {}) Tj ET",
            MARGIN,
            MARGIN - 10.0,
            page_no,
            page_count
        );
        out
    }
}

fn load_logo(path: &Path) -> Option<Logo> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            warn!("Logo {} could not be read, rendering without it: {}", path.display(), e);
            return None;
        }
    };
    match parse_jpeg(&data) {
        Some(info) => Some(Logo { info, data }),
        None => {
            warn!("Logo {} is not a supported JPEG, rendering without it", path.display());
            None
        }
    }
}

fn table_rows(finding: &FindingDraft, lines: &mut Vec<Line>) {
    let message_width = TABLE_CHARS - SEVERITY_COL - CODE_COL;
    let indent = " ".repeat(SEVERITY_COL + CODE_COL);
    let code: String = finding.code.chars().take(CODE_COL - 1).collect();

    for (i, chunk) in wrap(&finding.message, message_width).into_iter().enumerate() {
        let text = if i == 0 {
            format!(
                "{:<sev$}{:<code_w$}{}",
                finding.severity.as_str(),
                code,
                chunk,
                sev = SEVERITY_COL,
                code_w = CODE_COL
            )
        } else {
            format!("{}{}", indent, chunk)
        };
        lines.push(Line::text(Font::Mono, 9.0, text));
    }
    for (label, extra) in [("fix: ", &finding.suggestion), ("evidence: ", &finding.evidence)] {
        if let Some(extra) = extra {
            for chunk in wrap(&format!("{}{}", label, extra), message_width) {
                lines.push(Line::text(Font::Mono, 9.0, format!("{}{}", indent, chunk)));
            }
        }
    }
}

/// Greedy word wrap on character counts. Words longer than `width` are split.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > width {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                let rest = word.split_off(width);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            let word: String = word.into_iter().collect();
            let needed = if current.is_empty() {
                word.chars().count()
            } else {
                current.chars().count() + 1 + word.chars().count()
            };
            if needed > width && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&word);
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Escape a string for a PDF literal, mapping Latin-1 to WinAnsi octal codes.
fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            ' '..='~' => out.push(c),
            '\u{a0}'..='\u{ff}' => {
                let _ = write!(out, "\\{:03o}", c as u32);
            }
            _ => out.push('?'),
        }
    }
    out
}

/// Collects numbered objects and writes the xref table.
struct PdfWriter {
    buf: Vec<u8>,
    offsets: Vec<usize>,
}

impl PdfWriter {
    fn new() -> Self {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");
        Self {
            buf,
            offsets: Vec::new(),
        }
    }

    /// Objects must be written in id order starting at 1.
    fn object(&mut self, id: usize, body: &str) {
        debug_assert_eq!(id, self.offsets.len() + 1);
        self.offsets.push(self.buf.len());
        self.buf
            .extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", id, body).as_bytes());
    }

    fn stream(&mut self, id: usize, dict: &str, data: &[u8]) {
        debug_assert_eq!(id, self.offsets.len() + 1);
        self.offsets.push(self.buf.len());
        let head = if dict.is_empty() {
            format!("{} 0 obj\n<< /Length {} >>\nstream\n", id, data.len())
        } else {
            format!(
                "{} 0 obj\n<< {} /Length {} >>\nstream\n",
                id,
                dict,
                data.len()
            )
        };
        self.buf.extend_from_slice(head.as_bytes());
        self.buf.extend_from_slice(data);
        self.buf.extend_from_slice(b"\nendstream\nendobj\n");
    }

    fn finish(mut self, root: usize, info: usize) -> Vec<u8> {
        let xref_at = self.buf.len();
        let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", self.offsets.len() + 1);
        for offset in &self.offsets {
            let _ = writeln!(xref, "{:010} 00000 n ", offset);
        }
        let _ = write!(
            xref,
            "trailer\n<< /Size {} /Root {} 0 R /Info {} 0 R >>\nstartxref\n{}\n%%EOF\n",
            self.offsets.len() + 1,
            root,
            info,
            xref_at
        );
        self.buf.extend_from_slice(xref.as_bytes());
        self.buf
    }
}

const CATALOG_ID: usize = 1;
const PAGES_ID: usize = 2;
const INFO_ID: usize = 6;
const LOGO_ID: usize = 7;

impl ArtifactRenderer for PdfRenderer {
    fn content_type(&self) -> &'static str {
        "application/pdf"
    }

    fn extension(&self) -> &'static str {
        "pdf"
    }

    fn render(&self, input: &ArtifactInput<'_>) -> Result<Vec<u8>, ArtifactError> {
        let pages = self.paginate(self.layout(input));
        if pages.len() > self.max_pages {
            return Err(ArtifactError::TooManyPages {
                pages: pages.len(),
                max: self.max_pages,
            });
        }

        let first_page_id = if self.logo.is_some() {
            LOGO_ID + 1
        } else {
            LOGO_ID
        };
        let page_ids: Vec<usize> = (0..pages.len()).map(|i| first_page_id + 2 * i).collect();

        let mut w = PdfWriter::new();
        w.object(CATALOG_ID, &format!("<< /Type /Catalog /Pages {} 0 R >>", PAGES_ID));
        let kids: Vec<String> = page_ids.iter().map(|id| format!("{} 0 R", id)).collect();
        w.object(
            PAGES_ID,
            &format!(
                "<< /Type /Pages /Kids [{}] /Count {} >>",
                kids.join(" "),
                pages.len()
            ),
        );
        for (id, base) in [(3, "Helvetica"), (4, "Helvetica-Bold"), (5, "Courier")] {
            w.object(
                id,
                &format!(
                    "<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>",
                    base
                ),
            );
        }
        w.object(
            INFO_ID,
            &format!(
                "<< /Title ({}) /Subject (Report {}) /Producer (inspectra) >>",
                escape_text(&self.title),
                escape_text(input.report_id)
            ),
        );

        let mut xobjects = String::new();
        if let Some(ref logo) = self.logo {
            w.stream(
                LOGO_ID,
                &format!(
                    "/Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace {} /BitsPerComponent {} /Filter /DCTDecode",
                    logo.info.width,
                    logo.info.height,
                    logo.info.color_space(),
                    logo.info.bits_per_component
                ),
                &logo.data,
            );
            xobjects = format!(" /XObject << /Im1 {} 0 R >>", LOGO_ID);
        }

        let page_count = pages.len();
        for (i, lines) in pages.iter().enumerate() {
            let page_id = page_ids[i];
            w.object(
                page_id,
                &format!(
                    "<< /Type /Page /Parent {} 0 R /MediaBox [0 0 {} {}] /Resources << /Font << /F1 3 0 R /F2 4 0 R /F3 5 0 R >>{} >> /Contents {} 0 R >>",
                    PAGES_ID,
                    PAGE_WIDTH as u32,
                    PAGE_HEIGHT as u32,
                    xobjects,
                    page_id + 1
                ),
            );
            let content = self.page_content(lines, i + 1, page_count);
            w.stream(page_id + 1, "", content.as_bytes());
        }

        Ok(w.finish(CATALOG_ID, INFO_ID))
    }
}
