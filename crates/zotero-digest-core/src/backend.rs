use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to open PDF: {0}")]
    OpenError(String),
    #[error("failed to extract text: {0}")]
    ExtractionError(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for PDF text extraction backends.
///
/// Implementors return raw per-page text; cleanup and token truncation
/// happen in [`crate::text`] and [`crate::tokens`].
pub trait PdfBackend: Send + Sync {
    /// Extract the text of at most `max_pages` pages, one string per page.
    fn extract_pages(&self, path: &Path, max_pages: usize) -> Result<Vec<String>, BackendError>;
}
