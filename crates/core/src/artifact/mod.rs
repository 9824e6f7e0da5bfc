//! Conclusion document rendering.

mod jpeg;
mod pdf;

pub use jpeg::{JpegInfo, parse_jpeg};
pub use pdf::PdfRenderer;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::report::FindingDraft;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("document needs {pages} pages, limit is {max}")]
    TooManyPages { pages: usize, max: usize },

    #[error("render failed: {0}")]
    Render(String),
}

/// Everything drawn into a conclusion document. Rendering the same input
/// always yields the same bytes.
#[derive(Debug, Clone)]
pub struct ArtifactInput<'a> {
    pub report_id: &'a str,
    pub tenant_id: &'a str,
    pub filename: &'a str,
    pub uploaded_by: &'a str,
    pub uploaded_at: DateTime<Utc>,
    pub engine: &'a str,
    pub engine_version: &'a str,
    pub score: u8,
    pub summary: &'a str,
    pub findings: &'a [FindingDraft],
}

/// Renders conclusion documents.
pub trait ArtifactRenderer: Send + Sync {
    /// MIME type of the rendered bytes.
    fn content_type(&self) -> &'static str;

    /// File extension used in object keys.
    fn extension(&self) -> &'static str;

    fn render(&self, input: &ArtifactInput<'_>) -> Result<Vec<u8>, ArtifactError>;
}
