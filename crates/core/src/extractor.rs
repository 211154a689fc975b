use crate::error::IngestError;
use crate::models::{DocumentMetadata, TocEntry};
use crate::toc_match::normalize_text;
use lopdf::{Dictionary, Document, Object};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// Everything the conversion pipeline needs from one PDF.
#[derive(Debug, Clone)]
pub struct ExtractedPdf {
    pub pages: Vec<PageText>,
    pub toc: Vec<TocEntry>,
    pub metadata: DocumentMetadata,
}

pub trait PdfExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractedPdf, IngestError>;
}

#[derive(Default)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractedPdf, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let page_numbers = document.get_pages().keys().copied().collect::<Vec<_>>();
        let mut pages = Vec::new();
        for page_no in &page_numbers {
            let text = document
                .extract_text(&[*page_no])
                .map_err(|error| IngestError::PdfParse(error.to_string()))?;

            if !text.trim().is_empty() {
                pages.push(PageText {
                    number: *page_no,
                    text,
                });
            }
        }

        if pages.is_empty() {
            return Err(IngestError::PdfParse(format!(
                "pdf had no readable page text: {}",
                path.display()
            )));
        }

        let toc = read_toc(&document);
        if toc.is_empty() {
            return Err(IngestError::MissingToc(path.display().to_string()));
        }

        let mut metadata = read_info(&document);
        metadata.page_count = page_numbers.len() as u32;
        metadata.toc = toc.clone();

        Ok(ExtractedPdf {
            pages,
            toc,
            metadata,
        })
    }
}

fn read_toc(document: &Document) -> Vec<TocEntry> {
    match document.get_toc() {
        Ok(toc) => {
            for error in &toc.errors {
                tracing::debug!(%error, "outline entry skipped");
            }
            toc.toc
                .into_iter()
                .map(|entry| TocEntry {
                    level: entry.level as u32,
                    title: entry.title.trim().to_string(),
                    page: entry.page as u32,
                })
                .collect()
        }
        Err(error) => {
            tracing::warn!(%error, "pdf outline could not be read");
            Vec::new()
        }
    }
}

fn read_info(document: &Document) -> DocumentMetadata {
    let info = document
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|object| document.dereference(object).ok())
        .and_then(|(_, object)| object.as_dict().ok());

    let Some(info) = info else {
        return DocumentMetadata::default();
    };

    DocumentMetadata {
        title: info_string(info, b"Title"),
        author: info_string(info, b"Author"),
        subject: info_string(info, b"Subject"),
        keywords: info_string(info, b"Keywords"),
        creator: info_string(info, b"Creator"),
        producer: info_string(info, b"Producer"),
        ..DocumentMetadata::default()
    }
}

fn info_string(info: &Dictionary, key: &[u8]) -> Option<String> {
    info.get(key)
        .ok()
        .and_then(|object| match object {
            Object::String(bytes, _) => Some(decode_pdf_string(bytes)),
            _ => None,
        })
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Decodes a PDF text string: UTF-16BE when it carries a byte order mark,
/// otherwise single-byte.
pub fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect::<Vec<_>>();
        return String::from_utf16_lossy(&units);
    }

    bytes.iter().map(|byte| *byte as char).collect()
}

/// Builds the markdown export of a manual. Output starts at the page of the
/// first ToC entry; a line equal to the title of an entry pointing at its page
/// becomes a heading at that entry's level. Each entry yields one heading.
pub fn render_markdown(pages: &[PageText], toc: &[TocEntry]) -> String {
    let first_page = toc.first().map(|entry| entry.page).unwrap_or(1);
    let normalized_titles = toc
        .iter()
        .map(|entry| normalize_text(&entry.title))
        .collect::<Vec<_>>();
    let mut used = vec![false; toc.len()];
    let mut markdown = String::new();

    for page in pages.iter().filter(|page| page.number >= first_page) {
        for line in page.text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                markdown.push('\n');
                continue;
            }

            let normalized = normalize_text(trimmed);
            let heading = toc.iter().enumerate().position(|(index, entry)| {
                !used[index] && entry.page == page.number && normalized_titles[index] == normalized
            });

            match heading {
                Some(index) => {
                    used[index] = true;
                    let level = toc[index].level.max(1) as usize;
                    if !markdown.is_empty() && !markdown.ends_with('\n') {
                        markdown.push('\n');
                    }
                    markdown.push_str(&"#".repeat(level));
                    markdown.push(' ');
                    markdown.push_str(trimmed);
                    markdown.push('\n');
                }
                None => {
                    markdown.push_str(trimmed);
                    markdown.push('\n');
                }
            }
        }
    }

    markdown
}
