//! Text extraction from deposited documents.

use std::path::Path;

use lopdf::Document;
use tracing::debug;

use crate::error::ProcessError;

/// Capability trait for turning a document on disk into plain text.
pub trait TextExtractor: Send + Sync {
    /// Full concatenated text of the document.
    ///
    /// Pages with no extractable text contribute an empty string. Fails with
    /// [`ProcessError::Unreadable`] when the container cannot be opened or
    /// parsed, or has zero pages.
    fn extract(&self, path: &Path) -> Result<String, ProcessError>;
}

/// PDF text extraction via lopdf.
#[derive(Debug, Default)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract(&self, path: &Path) -> Result<String, ProcessError> {
        let doc = Document::load(path).map_err(|e| ProcessError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let pages = doc.get_pages();
        if pages.is_empty() {
            return Err(ProcessError::Unreadable {
                path: path.to_path_buf(),
                reason: "document has no pages".to_string(),
            });
        }

        let mut text = String::new();
        for &page_number in pages.keys() {
            // A page without a text stream is not an error for the document.
            match doc.extract_text(&[page_number]) {
                Ok(page_text) => text.push_str(&page_text),
                Err(e) => {
                    debug!(page = page_number, error = %e, "No extractable text on page");
                }
            }
        }

        Ok(text)
    }
}
