use std::path::Path;

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Unsupported file format: {0}")]
    Unsupported(String),

    #[error("Failed to extract text from PDF file: {0}")]
    Pdf(String),

    #[error("Unable to extract text from resume file")]
    Empty,
}

/// Turns an uploaded document into plain text. Implementations are synchronous and may be
/// CPU-heavy; callers run them on the blocking pool.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, file_name: &str, bytes: &[u8]) -> Result<String, ExtractionError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract(&self, file_name: &str, bytes: &[u8]) -> Result<String, ExtractionError> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if extension != "pdf" {
            return Err(ExtractionError::Unsupported(extension));
        }

        let text = pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| ExtractionError::Pdf(e.to_string()))?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ExtractionError::Empty);
        }

        debug!(file_name, chars = text.len(), "Extracted resume text");
        Ok(text.to_string())
    }
}
