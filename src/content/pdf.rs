//! PDF text extraction
//!
//! Extracts per-page text from PDF documents using pdf-extract.

use anyhow::{Context, Result};

/// PDF content extractor
pub struct PdfExtractor;

impl PdfExtractor {
    /// Extract text from PDF bytes.
    ///
    /// Pages keep their order; replacement characters become `?`, blank pages
    /// are dropped and the rest are joined with a blank line.
    pub fn extract(bytes: &[u8]) -> Result<String> {
        let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
            .context("Failed to extract text from PDF")?;
        Ok(Self::join_pages(pages.iter().map(String::as_str)))
    }

    /// Clean and join page texts
    pub fn join_pages<'a>(pages: impl IntoIterator<Item = &'a str>) -> String {
        pages
            .into_iter()
            .map(|page| Self::clean_text(&page.replace('\u{FFFD}', "?")))
            .filter(|page| !page.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Clean up common PDF extraction artifacts
    fn clean_text(text: &str) -> String {
        text.lines()
            .map(|l| l.trim())
            // Keep single paragraph breaks, drop runs of blank lines
            .fold(Vec::new(), |mut acc, line| {
                if line.is_empty() {
                    if acc.last().map(|l: &String| !l.is_empty()).unwrap_or(false) {
                        acc.push(String::new());
                    }
                } else {
                    acc.push(line.to_string());
                }
                acc
            })
            .join("\n")
            .trim()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text() {
        let dirty = "  Line 1  \n\n\n  Line 2  \n  \n  Line 3  ";
        let cleaned = PdfExtractor::clean_text(dirty);
        assert_eq!(cleaned, "Line 1\n\nLine 2\n\nLine 3");
    }

    #[test]
    fn test_join_pages_preserves_order_and_drops_blank_pages() {
        let joined = PdfExtractor::join_pages(["First page", "   \n ", "Second \u{FFFD} page"]);
        assert_eq!(joined, "First page\n\nSecond ? page");
    }

    #[test]
    fn test_garbage_bytes_are_an_error() {
        assert!(PdfExtractor::extract(b"definitely not a pdf").is_err());
    }
}
