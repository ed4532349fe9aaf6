//! PDF text extraction and normalization.
//!
//! The extractor is the first pipeline stage that touches document bytes. It
//! validates the `%PDF` signature, refuses encrypted files (password-protected
//! PDFs are not supported), extracts text with `pdf-extract`, and normalizes
//! line endings before handing the text to the chunker. Extraction fails when
//! the usable text is shorter than [`MIN_EXTRACTED_CHARS`] characters.

use thiserror::Error;

/// Leading bytes every accepted document must carry.
pub const PDF_SIGNATURE: &[u8; 4] = b"%PDF";

/// Minimum trimmed text length considered usable content.
pub const MIN_EXTRACTED_CHARS: usize = 10;

/// Errors raised while extracting text from a document.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Content does not begin with the PDF signature.
    #[error("content does not start with the %PDF signature")]
    MissingSignature,
    /// Document is encrypted and no password handling is supported.
    #[error("document is password-protected")]
    Encrypted,
    /// The underlying PDF parser rejected the document.
    #[error("failed to parse PDF: {0}")]
    Parse(String),
    /// Extraction succeeded but produced no usable text.
    #[error("extracted text too short to index ({chars} chars, minimum {MIN_EXTRACTED_CHARS})")]
    NoUsableText {
        /// Number of characters left after trimming.
        chars: usize,
    },
}

/// Normalized text extracted from a document, with the page count observed.
#[derive(Debug, Clone)]
pub struct ExtractedText {
    /// Plain text with normalized line endings.
    pub text: String,
    /// Number of page objects found in the document.
    pub page_count: usize,
}

/// Extract normalized plain text from PDF bytes.
pub fn extract_pdf(bytes: &[u8]) -> Result<ExtractedText, ExtractionError> {
    if !has_pdf_signature(bytes) {
        return Err(ExtractionError::MissingSignature);
    }
    if is_encrypted(bytes) {
        return Err(ExtractionError::Encrypted);
    }

    let raw = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|error| ExtractionError::Parse(error.to_string()))?;
    let text = normalize_text(&raw);

    let usable = text.trim().chars().count();
    if usable < MIN_EXTRACTED_CHARS {
        return Err(ExtractionError::NoUsableText { chars: usable });
    }

    let page_count = count_pages(bytes);
    tracing::debug!(pages = page_count, chars = text.len(), "Extracted document text");

    Ok(ExtractedText { text, page_count })
}

/// Check whether the buffer begins with the 4-byte PDF signature.
pub fn has_pdf_signature(bytes: &[u8]) -> bool {
    bytes.len() >= PDF_SIGNATURE.len() && &bytes[..PDF_SIGNATURE.len()] == PDF_SIGNATURE
}

fn is_encrypted(bytes: &[u8]) -> bool {
    contains_subslice(bytes, b"/Encrypt")
}

/// Normalize extracted text: CRLF to LF and runs of blank lines collapsed to one
/// paragraph break, so downstream chunking sees consistent boundaries.
fn normalize_text(raw: &str) -> String {
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(unified.len());
    let mut newline_run = 0usize;

    for ch in unified.chars() {
        if ch == '\n' {
            newline_run += 1;
            if newline_run <= 2 {
                out.push(ch);
            }
        } else {
            newline_run = 0;
            out.push(ch);
        }
    }

    out.trim_matches('\n').to_string()
}

/// Count `/Type /Page` objects, excluding the `/Pages` tree nodes.
fn count_pages(bytes: &[u8]) -> usize {
    let mut count = 0;
    let mut offset = 0;
    while let Some(pos) = find_subslice(&bytes[offset..], b"/Type") {
        let mut cursor = offset + pos + b"/Type".len();
        while cursor < bytes.len() && bytes[cursor].is_ascii_whitespace() {
            cursor += 1;
        }
        if bytes[cursor..].starts_with(b"/Pages") {
            // interior node of the page tree
        } else if bytes[cursor..].starts_with(b"/Page") {
            count += 1;
        }
        offset = offset + pos + 1;
    }
    count
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    find_subslice(haystack, needle).is_some()
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
