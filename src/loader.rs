//! Document loaders that turn an uploaded file into ordered raw-text segments.
//!
//! PDFs yield one segment per page with readable text, Word packages and plain text yield a
//! single segment. Loading is synchronous; [`load_upload`] stages the bytes in a temporary
//! file and runs the parser on the blocking pool.

use lopdf::Document as PdfDocument;
use regex::Regex;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::LazyLock;
use thiserror::Error;

/// Extensions accepted by the upload endpoint, in the order they are advertised.
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["pdf", "docx", "doc", "txt"];

/// Errors raised while identifying or parsing an uploaded document.
#[derive(Debug, Error)]
pub enum LoadError {
    /// File extension is not one of [`ALLOWED_EXTENSIONS`].
    #[error("File type not supported. Allowed: {}", ALLOWED_EXTENSIONS.join(", "))]
    UnsupportedFileType(String),
    /// Staging or reading the file failed.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// PDF structure could not be parsed.
    #[error("failed to parse PDF: {0}")]
    Pdf(String),
    /// Word package could not be opened or lacked a document body.
    #[error("failed to parse Word document: {0}")]
    Word(String),
    /// Parsing succeeded but produced no readable text.
    #[error("document contains no extractable text")]
    NoText,
    /// Blocking loader task panicked or was cancelled.
    #[error("loader task failed: {0}")]
    Task(String),
}

/// File formats understood by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// Portable Document Format.
    Pdf,
    /// Office Open XML word processing package (`.docx`, also attempted for `.doc`).
    Word,
    /// Plain text.
    Text,
}

impl DocumentFormat {
    /// Classify a filename by its extension, case-insensitively.
    pub fn from_filename(filename: &str) -> Result<Self, LoadError> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "pdf" => Ok(Self::Pdf),
            "docx" | "doc" => Ok(Self::Word),
            "txt" => Ok(Self::Text),
            _ => Err(LoadError::UnsupportedFileType(extension)),
        }
    }
}

/// One contiguous block of text taken from the source file (a PDF page, or the whole body).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSegment {
    /// Zero-based position of the segment within the source file.
    pub index: usize,
    /// Text content as produced by the format parser.
    pub text: String,
}

/// Ordered raw text of an uploaded file, discarded once chunked.
#[derive(Debug, Clone)]
pub struct RawDocument {
    /// Original filename supplied by the client.
    pub source: String,
    /// Segments in reading order.
    pub segments: Vec<RawSegment>,
}

impl RawDocument {
    /// Total number of characters across all segments.
    pub fn char_count(&self) -> usize {
        self.segments
            .iter()
            .map(|segment| segment.text.chars().count())
            .sum()
    }
}

/// Parse a file on disk according to the format implied by `filename`.
pub fn load_document(path: &Path, filename: &str) -> Result<RawDocument, LoadError> {
    let format = DocumentFormat::from_filename(filename)?;
    let segments = match format {
        DocumentFormat::Pdf => load_pdf(path)?,
        DocumentFormat::Word => vec![RawSegment {
            index: 0,
            text: load_word(path)?,
        }],
        DocumentFormat::Text => {
            let bytes = std::fs::read(path)?;
            vec![RawSegment {
                index: 0,
                text: String::from_utf8_lossy(&bytes).into_owned(),
            }]
        }
    };

    if segments.iter().all(|segment| segment.text.trim().is_empty()) {
        return Err(LoadError::NoText);
    }

    tracing::debug!(
        filename,
        format = ?format,
        segments = segments.len(),
        "Document loaded"
    );

    Ok(RawDocument {
        source: filename.to_string(),
        segments,
    })
}

/// Stage uploaded bytes in a temporary file and parse them on the blocking pool.
///
/// The temporary file is removed when this function returns, whatever the outcome.
pub async fn load_upload(filename: String, bytes: Vec<u8>) -> Result<RawDocument, LoadError> {
    let format = DocumentFormat::from_filename(&filename)?;
    tokio::task::spawn_blocking(move || {
        let suffix = match format {
            DocumentFormat::Pdf => ".pdf",
            DocumentFormat::Word => ".docx",
            DocumentFormat::Text => ".txt",
        };
        let mut staged = tempfile::Builder::new()
            .prefix("docqa-upload-")
            .suffix(suffix)
            .tempfile()?;
        staged.write_all(&bytes)?;
        staged.flush()?;
        load_document(staged.path(), &filename)
    })
    .await
    .map_err(|error| LoadError::Task(error.to_string()))?
}

fn load_pdf(path: &Path) -> Result<Vec<RawSegment>, LoadError> {
    let document = PdfDocument::load(path).map_err(|error| LoadError::Pdf(error.to_string()))?;

    let pages = document
        .get_pages()
        .into_keys()
        .map(|page_no| (page_no, document.extract_text(&[page_no])));
    Ok(readable_pages(pages))
}

/// Keep pages with text, in page order. Pages whose text cannot be decoded are skipped.
fn readable_pages<E: std::fmt::Display>(
    pages: impl IntoIterator<Item = (u32, Result<String, E>)>,
) -> Vec<RawSegment> {
    let mut segments = Vec::new();
    for (index, (page_no, text)) in pages.into_iter().enumerate() {
        match text {
            Ok(text) if !text.trim().is_empty() => segments.push(RawSegment { index, text }),
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(page = page_no, error = %error, "Skipping unreadable PDF page");
            }
        }
    }
    segments
}

fn load_word(path: &Path) -> Result<String, LoadError> {
    let file = std::fs::File::open(path)?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|error| LoadError::Word(error.to_string()))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|error| LoadError::Word(error.to_string()))?
        .read_to_string(&mut xml)?;
    Ok(word_xml_to_text(&xml))
}

static WORD_MARKUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>|<w:tab/>|<w:br/>|</w:p>")
        .expect("word markup pattern is valid")
});

/// Flatten `word/document.xml` into text: runs are concatenated, paragraphs end with a newline.
fn word_xml_to_text(xml: &str) -> String {
    let mut text = String::with_capacity(xml.len() / 4);
    for capture in WORD_MARKUP.captures_iter(xml) {
        match capture.get(1) {
            Some(run) => text.push_str(&unescape_xml(run.as_str())),
            None => match &capture[0] {
                "<w:tab/>" => text.push('\t'),
                _ => text.push('\n'),
            },
        }
    }
    text.trim_end().to_string()
}

fn unescape_xml(raw: &str) -> String {
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
