//! Text extraction from uploaded source documents.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("unsupported document type: {0}")]
    Unsupported(String),

    #[error("document contains no extractable text")]
    Empty,

    #[error("document is not valid text: {0}")]
    Malformed(String),
}

/// Turns the bytes of a source document into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Whether this extractor handles files with the given name.
    fn supports(&self, filename: &str) -> bool;

    async fn extract(&self, filename: &str, bytes: &[u8]) -> Result<String, ExtractionError>;
}

/// Extractor for UTF-8 text formats (`.txt`, `.md`, `.csv`).
pub struct PlainTextExtractor {
    extensions: Vec<String>,
}

impl PlainTextExtractor {
    pub fn new(extensions: Vec<String>) -> Self {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }
}

impl Default for PlainTextExtractor {
    fn default() -> Self {
        Self::new(vec!["txt".to_string(), "md".to_string(), "csv".to_string()])
    }
}

/// Lowercased extension of `filename`, if any.
pub fn file_extension(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    fn supports(&self, filename: &str) -> bool {
        file_extension(filename).is_some_and(|ext| self.extensions.contains(&ext))
    }

    async fn extract(&self, filename: &str, bytes: &[u8]) -> Result<String, ExtractionError> {
        if !self.supports(filename) {
            return Err(ExtractionError::Unsupported(
                file_extension(filename).unwrap_or_else(|| filename.to_string()),
            ));
        }

        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        if bytes.contains(&0) {
            return Err(ExtractionError::Malformed("binary content".to_string()));
        }
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ExtractionError::Malformed(e.to_string()))?;

        if text.trim().is_empty() {
            return Err(ExtractionError::Empty);
        }

        Ok(text.replace("\r\n", "\n"))
    }
}
