//! PDF and plain-text parsing

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::types::FileType;

/// Seconds to wait for pdf-extract before giving up on a document
const PDF_EXTRACT_TIMEOUT_SECS: u64 = 60;

/// Parsed document with extracted text
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    /// File type
    pub file_type: FileType,
    /// Full extracted text, pages joined by blank lines
    pub content: String,
    /// SHA-256 of `content`, used to detect re-uploads
    pub content_hash: String,
    /// Total pages (if applicable)
    pub total_pages: Option<u32>,
    /// Page-level content
    pub pages: Vec<PageContent>,
}

/// Content from a single page
#[derive(Debug, Clone, PartialEq)]
pub struct PageContent {
    /// Page number (1-indexed), unknown when the text could not be split by page
    pub page_number: Option<u32>,
    /// Text content of the page
    pub content: String,
}

/// File parser
pub struct FileParser;

impl FileParser {
    /// Parse a file based on its extension
    pub fn parse(filename: &str, data: &[u8]) -> Result<ParsedDocument> {
        let file_type = FileType::from_filename(filename);

        match file_type {
            FileType::Pdf => Self::parse_pdf(filename, data),
            FileType::Txt | FileType::Markdown => Self::parse_text(filename, data, file_type),
            FileType::Unknown => Err(Error::UnsupportedFileType(filename.to_string())),
        }
    }

    /// Parse a PDF page by page, falling back to whole-document extraction
    fn parse_pdf(filename: &str, data: &[u8]) -> Result<ParsedDocument> {
        let (pages, total_pages) = match Self::extract_pages(data) {
            Ok((pages, total)) if !pages.is_empty() => (pages, Some(total)),
            Ok((_, total)) => {
                tracing::debug!("{}: no text via lopdf, trying pdf-extract", filename);
                (Self::split_pages(&Self::extract_with_timeout(filename, data)?, Some(total)), Some(total))
            }
            Err(e) => {
                tracing::warn!("{}: lopdf failed ({}), trying pdf-extract", filename, e);
                (Self::split_pages(&Self::extract_with_timeout(filename, data)?, None), None)
            }
        };

        if pages.is_empty() {
            return Err(Error::file_parse(
                filename,
                "No text content could be extracted from PDF",
            ));
        }

        Ok(Self::assemble(FileType::Pdf, pages, total_pages))
    }

    /// Per-page text via lopdf. Pages without text are skipped.
    fn extract_pages(data: &[u8]) -> std::result::Result<(Vec<PageContent>, u32), lopdf::Error> {
        let doc = lopdf::Document::load_mem(data)?;
        let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
        let total = page_numbers.len() as u32;

        let mut pages = Vec::new();
        for number in page_numbers {
            match doc.extract_text(&[number]) {
                Ok(text) => {
                    let content = cleanup_text(&text);
                    if !content.is_empty() {
                        pages.push(PageContent {
                            page_number: Some(number),
                            content,
                        });
                    }
                }
                Err(e) => tracing::debug!("Could not extract text from page {}: {}", number, e),
            }
        }

        Ok((pages, total))
    }

    /// Whole-document text via pdf-extract on a worker thread, bounded by a timeout
    fn extract_with_timeout(filename: &str, data: &[u8]) -> Result<String> {
        use std::sync::mpsc;
        use std::thread;
        use std::time::Duration;

        let data_vec = data.to_vec();
        let (tx, rx) = mpsc::channel();

        let handle = thread::spawn(move || {
            let result = pdf_extract::extract_text_from_mem(&data_vec);
            let _ = tx.send(result);
        });

        match rx.recv_timeout(Duration::from_secs(PDF_EXTRACT_TIMEOUT_SECS)) {
            Ok(Ok(text)) => {
                let _ = handle.join();
                Ok(text)
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(Error::file_parse(filename, e.to_string()))
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                // The thread cannot be killed; it is left to finish on its own.
                tracing::error!("{}: PDF extraction timed out after {}s", filename, PDF_EXTRACT_TIMEOUT_SECS);
                Err(Error::file_parse(filename, "PDF extraction timed out"))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(Error::file_parse(filename, "PDF extraction thread crashed"))
            }
        }
    }

    /// Split pdf-extract output on form feeds.
    ///
    /// Page numbers are only assigned when the split matches the page count.
    fn split_pages(text: &str, total_pages: Option<u32>) -> Vec<PageContent> {
        let pieces: Vec<String> = text.split('\x0c').map(cleanup_text).collect();
        let numbered = total_pages == Some(pieces.len() as u32);

        pieces
            .into_iter()
            .enumerate()
            .filter(|(_, content)| !content.is_empty())
            .map(|(i, content)| PageContent {
                page_number: numbered.then_some(i as u32 + 1),
                content,
            })
            .collect()
    }

    /// Parse plain text or markdown
    fn parse_text(filename: &str, data: &[u8], file_type: FileType) -> Result<ParsedDocument> {
        let content = cleanup_text(&String::from_utf8_lossy(data));
        if content.is_empty() {
            return Err(Error::file_parse(filename, "File is empty"));
        }

        let pages = vec![PageContent {
            page_number: None,
            content,
        }];
        Ok(Self::assemble(file_type, pages, None))
    }

    fn assemble(file_type: FileType, pages: Vec<PageContent>, total_pages: Option<u32>) -> ParsedDocument {
        let content = pages
            .iter()
            .map(|p| p.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        ParsedDocument {
            file_type,
            content_hash: hash_content(&content),
            content,
            total_pages,
            pages,
        }
    }
}

/// Drop NUL bytes, trim lines and remove blank ones
fn cleanup_text(text: &str) -> String {
    text.replace('\0', "")
        .replace('\u{00A0}', " ")
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Hash content for deduplication
fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
