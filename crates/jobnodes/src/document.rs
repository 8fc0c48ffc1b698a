//! Resume text extraction from PDF and plain-text files.

use crate::adapter::DocumentTextExtraction;
use crate::model::DocumentHandle;
use async_trait::async_trait;
use jobcore::AdapterError;
use std::path::Path;

const PAGE_BREAK: char = '\x0c';

fn unreadable(path: &Path, reason: impl std::fmt::Display) -> AdapterError {
    AdapterError::Unreadable(format!("{}: {reason}", path.display()))
}

/// Trim each page, drop blank ones and join the rest in order.
fn join_pages<'a>(
    document: &DocumentHandle,
    pages: impl IntoIterator<Item = &'a str>,
) -> Result<String, AdapterError> {
    let pages: Vec<&str> = pages
        .into_iter()
        .map(str::trim)
        .filter(|page| !page.is_empty())
        .collect();
    if pages.is_empty() {
        return Err(unreadable(&document.path, "contains no text"));
    }

    tracing::debug!(pages = pages.len(), document = %document.name(), "document read");
    Ok(pages.join("\n"))
}

/// Reads UTF-8 text documents. Form feeds mark page boundaries.
#[derive(Debug, Default, Clone)]
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DocumentTextExtraction for PlainTextExtractor {
    async fn extract_text(&self, document: &DocumentHandle) -> Result<String, AdapterError> {
        let raw = tokio::fs::read_to_string(&document.path)
            .await
            .map_err(|e| unreadable(&document.path, e))?;
        join_pages(document, raw.split(PAGE_BREAK))
    }
}

/// Reads the text layer of a PDF, page by page.
#[derive(Debug, Default, Clone)]
pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self {
        Self
    }
}

fn read_pdf_pages(path: &Path) -> Result<Vec<String>, AdapterError> {
    let pdf = lopdf::Document::load(path).map_err(|e| unreadable(path, e))?;
    // page numbers are 1-based and come back sorted
    pdf.get_pages()
        .into_keys()
        .map(|page| pdf.extract_text(&[page]).map_err(|e| unreadable(path, e)))
        .collect()
}

#[async_trait]
impl DocumentTextExtraction for PdfExtractor {
    async fn extract_text(&self, document: &DocumentHandle) -> Result<String, AdapterError> {
        let path = document.path.clone();
        let pages = tokio::task::spawn_blocking(move || read_pdf_pages(&path))
            .await
            .map_err(|e| unreadable(&document.path, e))??;
        join_pages(document, pages.iter().map(String::as_str))
    }
}

/// Picks an extractor by file extension: `.pdf` goes to [`PdfExtractor`],
/// anything else is read as plain text.
#[derive(Debug, Default, Clone)]
pub struct ResumeDocumentExtractor {
    pdf: PdfExtractor,
    text: PlainTextExtractor,
}

impl ResumeDocumentExtractor {
    pub fn new() -> Self {
        Self::default()
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

#[async_trait]
impl DocumentTextExtraction for ResumeDocumentExtractor {
    async fn extract_text(&self, document: &DocumentHandle) -> Result<String, AdapterError> {
        if is_pdf(&document.path) {
            self.pdf.extract_text(document).await
        } else {
            self.text.extract_text(document).await
        }
    }
}
