//! PDF to plain text.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use lopdf::Document;
use tracing::debug;

use crate::error::LoadError;

/// Text of a report plus how many pages it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedReport {
    pub text: String,
    pub pages: usize,
}

/// Extract the text of every page, in page order, concatenated as-is.
///
/// A document with no pages, or with no extractable text, yields an empty
/// string rather than an error.
pub fn load(bytes: &[u8]) -> Result<String, LoadError> {
    load_report(bytes).map(|report| report.text)
}

/// Read a PDF from disk and extract its text.
pub fn load_path(path: impl AsRef<Path>) -> Result<String, LoadError> {
    let bytes = std::fs::read(path)?;
    load(&bytes)
}

pub fn load_report(bytes: &[u8]) -> Result<LoadedReport, LoadError> {
    if bytes.is_empty() {
        return Err(LoadError::Malformed("empty file".to_string()));
    }

    // lopdf can panic on sufficiently broken input; a bad upload is still just a bad upload.
    panic::catch_unwind(AssertUnwindSafe(|| extract(bytes))).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "parser panicked".to_string());
        Err(LoadError::Malformed(message))
    })
}

fn extract(bytes: &[u8]) -> Result<LoadedReport, LoadError> {
    let doc = Document::load_mem(bytes).map_err(|e| LoadError::Malformed(e.to_string()))?;

    if doc.is_encrypted() {
        return Err(LoadError::Encrypted);
    }

    // BTreeMap keyed by page number, so iteration is already in page order.
    let pages = doc.get_pages();
    let mut text = String::new();
    for &page in pages.keys() {
        let page_text = doc.extract_text(&[page]).map_err(|e| LoadError::Page {
            page,
            message: e.to_string(),
        })?;
        text.push_str(&page_text);
    }

    if text.trim().is_empty() {
        text.clear();
    }

    debug!(pages = pages.len(), chars = text.len(), "extracted report text");

    Ok(LoadedReport {
        text,
        pages: pages.len(),
    })
}
