use std::path::Path;

use mupdf::{Document, TextPageFlags};

use zotero_digest_core::{BackendError, PdfBackend};

/// MuPDF-based implementation of [`PdfBackend`].
///
/// The mupdf dependency is AGPL-3.0; keeping it in this crate means the rest
/// of the workspace only sees the trait.
#[derive(Debug, Default, Clone, Copy)]
pub struct MupdfBackend;

impl MupdfBackend {
    pub fn new() -> Self {
        Self
    }
}

fn extraction(e: impl std::fmt::Display) -> BackendError {
    BackendError::ExtractionError(e.to_string())
}

impl PdfBackend for MupdfBackend {
    fn extract_pages(&self, path: &Path, max_pages: usize) -> Result<Vec<String>, BackendError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| BackendError::OpenError("invalid path encoding".into()))?;

        let document =
            Document::open(path_str).map_err(|e| BackendError::OpenError(e.to_string()))?;
        tracing::debug!(path = path_str, max_pages, "reading PDF");

        let mut pages = Vec::new();
        for page in document.pages().map_err(extraction)?.take(max_pages) {
            let page = page.map_err(extraction)?;
            let text_page = page
                .to_text_page(TextPageFlags::empty())
                .map_err(extraction)?;

            let mut text = String::new();
            for block in text_page.blocks() {
                for line in block.lines() {
                    text.extend(line.chars().map(|c| c.char().unwrap_or('\u{FFFD}')));
                    text.push('\n');
                }
            }
            pages.push(text);
        }

        tracing::debug!(path = path_str, pages = pages.len(), "extracted PDF pages");
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = MupdfBackend::new()
            .extract_pages(&dir.path().join("absent.pdf"), 5)
            .unwrap_err();
        assert!(matches!(err, BackendError::OpenError(_)));
    }

    #[test]
    fn non_pdf_bytes_fail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a.pdf");
        std::fs::write(&path, b"plain text, not a PDF").unwrap();
        assert!(MupdfBackend::new().extract_pages(&path, 5).is_err());
    }
}
