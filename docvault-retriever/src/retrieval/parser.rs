//! Plain-text extraction for uploaded files.
//!
//! Binary formats (PDF, DOCX, XLSX) are handled by other parsers; this module
//! defines the seam and ships the text-based one. Following the convention of
//! the upload path, a parser never fails: problems come back as a short
//! description in place of the document text, and [`DocumentParser::supports`]
//! lets callers skip files up front.

/// Turns raw file bytes into plain text.
pub trait DocumentParser: Send + Sync {
    /// Whether `extension` (with or without the leading dot) is handled.
    fn supports(&self, extension: &str) -> bool;

    /// Extract text from `bytes`; failures are described in the returned text.
    fn parse(&self, bytes: &[u8], extension: &str) -> String;
}

/// Parser for text-based formats: `.txt`, `.md`, `.csv` and `.json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextParser;

impl PlainTextParser {
    pub const EXTENSIONS: [&'static str; 4] = ["txt", "md", "csv", "json"];
}

fn normalize(extension: &str) -> String {
    extension.trim_start_matches('.').to_lowercase()
}

impl DocumentParser for PlainTextParser {
    fn supports(&self, extension: &str) -> bool {
        Self::EXTENSIONS.contains(&normalize(extension).as_str())
    }

    fn parse(&self, bytes: &[u8], extension: &str) -> String {
        if !self.supports(extension) {
            return format!("Unsupported file type: .{}", normalize(extension));
        }
        String::from_utf8_lossy(bytes).trim().to_string()
    }
}
