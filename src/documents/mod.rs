//! Plain-text extraction from uploaded documents.
//!
//! Supports PDF, DOCX and plain-text files. The extracted text is tagged with
//! material-science categories and trimmed to an excerpt for the response.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use std::fmt;
use std::io::{Cursor, Read};
use std::path::Path;
use thiserror::Error;
use zip::ZipArchive;

/// Static category keyword table
pub mod categories;

pub use categories::{categorize, excerpt, Category, CategoryMatch};

const DOCX_BODY: &str = "word/document.xml";

/// Default cap on the decompressed DOCX body, in bytes
pub const DEFAULT_MAX_TEXT_BYTES: u64 = 50 * 1024 * 1024;

static DOCX_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</w:p>|<w:br\s*/>|<w:cr\s*/>").expect("valid regex"));
static DOCX_TAB: Lazy<Regex> = Lazy::new(|| Regex::new(r"<w:tab\s*/>").expect("valid regex"));
static XML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static XML_NUMERIC_ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&#(x?)([0-9a-fA-F]+);").expect("valid regex"));

/// File formats the extractor understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    /// Portable Document Format
    Pdf,
    /// Office Open XML word-processing document
    Docx,
    /// UTF-8 plain text, Markdown, CSV or logs
    Text,
}

impl DocumentFormat {
    /// Detects the format from the file extension, case-insensitively
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let extension = Path::new(file_name)
            .extension()?
            .to_str()?
            .to_ascii_lowercase();
        match extension.as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "txt" | "md" | "markdown" | "csv" | "log" => Some(Self::Text),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Text => "text",
        };
        f.write_str(name)
    }
}

/// Why a document produced no text
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The extension is not one of the supported formats
    #[error("不支持的文件格式: {0}")]
    UnsupportedFormat(String),
    /// The file claims a supported format but could not be parsed
    #[error("无法读取 {format} 文件: {reason}")]
    Unreadable {
        /// Detected format
        format: DocumentFormat,
        /// Parser error
        reason: String,
    },
    /// Parsing succeeded but yielded no text
    #[error("文件中没有可提取的文本: {0}")]
    Empty(String),
}

/// Text recovered from one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    /// Detected format
    pub format: DocumentFormat,
    /// Extracted text
    pub text: String,
}

/// Turns a named byte buffer into plain text
pub trait DocumentTextExtractor: Send + Sync {
    /// Extracts text, classifying unsupported or broken input
    fn extract(&self, file_name: &str, bytes: &[u8]) -> Result<ExtractedDocument, ExtractionError>;
}

/// Extractor backed by `pdf-extract`, the DOCX zip container and UTF-8 decoding
#[derive(Debug, Clone, Copy)]
pub struct FileTextExtractor {
    max_text_bytes: u64,
}

impl FileTextExtractor {
    /// Creates a new extractor with the default decompression cap
    pub fn new() -> Self {
        Self::with_max_text_bytes(DEFAULT_MAX_TEXT_BYTES)
    }

    /// Creates an extractor that rejects DOCX bodies larger than `max_text_bytes`
    pub fn with_max_text_bytes(max_text_bytes: u64) -> Self {
        Self { max_text_bytes }
    }
}

impl Default for FileTextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentTextExtractor for FileTextExtractor {
    fn extract(&self, file_name: &str, bytes: &[u8]) -> Result<ExtractedDocument, ExtractionError> {
        let format = DocumentFormat::from_file_name(file_name)
            .ok_or_else(|| ExtractionError::UnsupportedFormat(file_name.to_string()))?;

        let text = match format {
            DocumentFormat::Pdf => extract_pdf(bytes)?,
            DocumentFormat::Docx => extract_docx(bytes, self.max_text_bytes)?,
            DocumentFormat::Text => extract_plain(bytes)?,
        };

        if text.trim().is_empty() {
            return Err(ExtractionError::Empty(file_name.to_string()));
        }
        Ok(ExtractedDocument { format, text })
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractionError> {
    let unreadable = |reason: String| ExtractionError::Unreadable {
        format: DocumentFormat::Pdf,
        reason,
    };

    // pdf-extract panics on some malformed cross-reference tables
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(unreadable(e.to_string())),
        Err(_) => Err(unreadable("parser panicked".to_string())),
    }
}

fn extract_docx(bytes: &[u8], max_text_bytes: u64) -> Result<String, ExtractionError> {
    let unreadable = |reason: String| ExtractionError::Unreadable {
        format: DocumentFormat::Docx,
        reason,
    };
    let too_large = || unreadable(format!("{} exceeds {} bytes", DOCX_BODY, max_text_bytes));

    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| unreadable(e.to_string()))?;
    let body = archive
        .by_name(DOCX_BODY)
        .map_err(|e| unreadable(format!("{}: {}", DOCX_BODY, e)))?;
    if body.size() > max_text_bytes {
        return Err(too_large());
    }

    // the declared size may lie, so cap the stream as well
    let mut xml = String::new();
    body.take(max_text_bytes + 1)
        .read_to_string(&mut xml)
        .map_err(|e| unreadable(e.to_string()))?;
    if xml.len() as u64 > max_text_bytes {
        return Err(too_large());
    }

    Ok(docx_xml_to_text(&xml))
}

fn extract_plain(bytes: &[u8]) -> Result<String, ExtractionError> {
    if content_inspector::inspect(bytes).is_binary() {
        return Err(ExtractionError::Unreadable {
            format: DocumentFormat::Text,
            reason: "binary content".to_string(),
        });
    }
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

/// Converts the body XML of a DOCX file into paragraphs of plain text
pub fn docx_xml_to_text(xml: &str) -> String {
    let with_breaks = DOCX_BREAK.replace_all(xml, "\n");
    let with_tabs = DOCX_TAB.replace_all(&with_breaks, "\t");
    let stripped = XML_TAG.replace_all(&with_tabs, "");
    let text = unescape_xml(&stripped);

    text.lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn unescape_xml(text: &str) -> String {
    let numeric = XML_NUMERIC_ENTITY.replace_all(text, |caps: &Captures| {
        let radix = if caps[1].is_empty() { 10 } else { 16 };
        u32::from_str_radix(&caps[2], radix)
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });
    numeric
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Summary of an uploaded document returned to the caller
#[derive(Debug, Clone, Serialize)]
pub struct DocumentAnalysis {
    /// Name of the uploaded file
    pub file_name: String,
    /// Detected format
    pub format: DocumentFormat,
    /// Number of characters in the extracted text
    pub char_count: usize,
    /// Number of whitespace-separated words
    pub word_count: usize,
    /// Matched categories, strongest first
    pub categories: Vec<CategoryMatch>,
    /// Category names, or `general` when nothing matched
    pub tags: Vec<String>,
    /// Leading part of the text
    pub excerpt: String,
    /// When the analysis was produced
    pub processed_at: DateTime<Utc>,
}

impl DocumentAnalysis {
    /// Categorizes extracted text and cuts the excerpt
    pub fn new(file_name: &str, document: &ExtractedDocument, excerpt_chars: usize) -> Self {
        let categories = categorize(&document.text);
        let tags = if categories.is_empty() {
            vec!["general".to_string()]
        } else {
            categories.iter().map(|m| m.category.to_string()).collect()
        };

        Self {
            file_name: file_name.to_string(),
            format: document.format,
            char_count: document.text.chars().count(),
            word_count: document.text.split_whitespace().count(),
            categories,
            tags,
            excerpt: excerpt(&document.text, excerpt_chars),
            processed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn docx_with_body(body_xml: &str) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file(DOCX_BODY, FileOptions::default()).unwrap();
        writer.write_all(body_xml.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(DocumentFormat::from_file_name("report.PDF"), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_file_name("spec.docx"), Some(DocumentFormat::Docx));
        assert_eq!(DocumentFormat::from_file_name("notes.md"), Some(DocumentFormat::Text));
        assert_eq!(DocumentFormat::from_file_name("image.png"), None);
        assert_eq!(DocumentFormat::from_file_name("README"), None);
    }

    #[test]
    fn test_plain_text_extraction() {
        let extracted = FileTextExtractor::new()
            .extract("notes.txt", "\u{feff}铝合金密度低".as_bytes())
            .unwrap();
        assert_eq!(extracted.format, DocumentFormat::Text);
        assert_eq!(extracted.text, "铝合金密度低");
    }

    #[test]
    fn test_binary_text_is_unreadable() {
        let result = FileTextExtractor::new().extract("data.txt", &[0u8, 159, 146, 150, 0, 1]);
        assert!(matches!(
            result,
            Err(ExtractionError::Unreadable { format: DocumentFormat::Text, .. })
        ));
    }

    #[test]
    fn test_unsupported_and_empty() {
        let extractor = FileTextExtractor::new();
        assert!(matches!(
            extractor.extract("photo.jpg", b"\xff\xd8"),
            Err(ExtractionError::UnsupportedFormat(name)) if name == "photo.jpg"
        ));
        assert!(matches!(extractor.extract("blank.txt", b"  \n "), Err(ExtractionError::Empty(_))));
    }

    #[test]
    fn test_docx_extraction() {
        let body = r#"<?xml version="1.0"?><w:document><w:body><w:p><w:r><w:t>304 不锈钢</w:t></w:r></w:p><w:p><w:r><w:t>Cr</w:t></w:r><w:r><w:tab/><w:t>18% &amp; Ni&#x9;8%</w:t></w:r></w:p></w:body></w:document>"#;
        let extracted = FileTextExtractor::new()
            .extract("steel.docx", &docx_with_body(body))
            .unwrap();

        assert_eq!(extracted.format, DocumentFormat::Docx);
        assert_eq!(extracted.text, "304 不锈钢\nCr\t18% & Ni\t8%");
    }

    #[test]
    fn test_docx_body_over_limit_is_rejected() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        writer.start_file(DOCX_BODY, options).unwrap();
        let chunk = vec![b'a'; 64 * 1024];
        for _ in 0..32 {
            writer.write_all(&chunk).unwrap();
        }
        let bytes = writer.finish().unwrap().into_inner();
        assert!(bytes.len() < 64 * 1024);

        let result = FileTextExtractor::with_max_text_bytes(1024 * 1024).extract("bomb.docx", &bytes);
        match result {
            Err(ExtractionError::Unreadable { format, reason }) => {
                assert_eq!(format, DocumentFormat::Docx);
                assert!(reason.contains("exceeds"), "{}", reason);
            }
            other => panic!("expected size rejection, got {:?}", other),
        }

        let small = docx_with_body("<w:p><w:t>钛合金</w:t></w:p>");
        let extracted = FileTextExtractor::with_max_text_bytes(1024).extract("small.docx", &small).unwrap();
        assert_eq!(extracted.text, "钛合金");
    }

    #[test]
    fn test_corrupt_docx_and_pdf() {
        let extractor = FileTextExtractor::new();
        assert!(matches!(
            extractor.extract("broken.docx", b"not a zip"),
            Err(ExtractionError::Unreadable { format: DocumentFormat::Docx, .. })
        ));
        assert!(matches!(
            extractor.extract("broken.pdf", b"not a pdf"),
            Err(ExtractionError::Unreadable { format: DocumentFormat::Pdf, .. })
        ));
    }

    #[test]
    fn test_analysis_tags() {
        let document = ExtractedDocument {
            format: DocumentFormat::Text,
            text: "Polymer resin with glass fiber".to_string(),
        };
        let analysis = DocumentAnalysis::new("a.txt", &document, 10);

        assert_eq!(analysis.word_count, 5);
        assert_eq!(analysis.tags[0], "polymers");
        assert_eq!(analysis.excerpt, "Polymer re…");

        let plain = ExtractedDocument {
            format: DocumentFormat::Text,
            text: "hello world".to_string(),
        };
        assert_eq!(DocumentAnalysis::new("b.txt", &plain, 50).tags, vec!["general"]);
    }
}
