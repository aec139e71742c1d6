use crate::error::{RagError, Result};
use log::{debug, info, warn};
use mime_guess::from_path;
use pdf_extract::extract_text_from_mem_by_pages;
use std::fs;
use std::path::Path;

/// Raw content of one uploaded PDF
#[derive(Debug, Clone)]
pub struct PdfUpload {
    /// The file name shown in messages
    pub name: String,
    /// The unparsed PDF bytes
    pub bytes: Vec<u8>,
}

/// How pages with no extractable text are treated.
///
/// Blank pages normalize to an empty string, so both filters produce the same
/// text; they differ only in how many pages are counted as appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageFilter {
    /// Append every page's text, even when it is empty
    KeepAll,
    /// Drop pages that produced no text
    SkipEmpty,
}

impl PdfUpload {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        PdfUpload {
            name: name.into(),
            bytes,
        }
    }

    /// Read an upload from a file path
    pub fn from_path<P: AsRef<Path>>(file_path: P) -> Result<Self> {
        let path = file_path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| path.display().to_string());

        let bytes = fs::read(path).map_err(|e| RagError::Extraction {
            file: name.clone(),
            message: e.to_string(),
        })?;
        debug!("Read {} bytes from {}", bytes.len(), path.display());

        Ok(PdfUpload { name, bytes })
    }

    /// Extract the text of every page, in page order
    pub fn extract_pages(&self) -> Result<Vec<String>> {
        let pages =
            extract_text_from_mem_by_pages(&self.bytes).map_err(|e| RagError::Extraction {
                file: self.name.clone(),
                message: e.to_string(),
            })?;

        Ok(pages.iter().map(|page| normalize_whitespace(page)).collect())
    }
}

/// Check whether a path looks like a PDF by its extension
pub fn is_pdf_path<P: AsRef<Path>>(file_path: P) -> bool {
    let mime = from_path(file_path.as_ref()).first_or_octet_stream();
    mime.essence_str() == "application/pdf"
}

/// Extract and concatenate the text of all uploads
pub fn extract_text(uploads: &[PdfUpload], filter: PageFilter) -> Result<String> {
    let mut text = String::new();

    for upload in uploads {
        info!("Processing PDF document: {}", upload.name);
        let pages = upload.extract_pages()?;
        let page_count = pages.len();
        let appended = concat_pages(&mut text, pages, filter);
        debug!(
            "{}: kept {} of {} pages",
            upload.name, appended, page_count
        );
    }

    if text.trim().is_empty() {
        warn!("Extracted PDF content is empty or contains only whitespace");
    }

    Ok(text)
}

/// Append page texts to `text`, returning how many pages were appended
fn concat_pages(text: &mut String, pages: Vec<String>, filter: PageFilter) -> usize {
    let mut appended = 0;
    for page in pages {
        if filter == PageFilter::SkipEmpty && page.is_empty() {
            continue;
        }
        text.push_str(&page);
        appended += 1;
    }
    appended
}

/// Normalize whitespace in text (remove multiple consecutive spaces, newlines, etc.)
fn normalize_whitespace(text: &str) -> String {
    let result = text.replace('\r', "");

    // Collapse runs of newlines to at most a paragraph break
    let mut prev_char = ' ';
    let mut newline_count = 0;
    let mut normalized = String::with_capacity(result.len());

    for c in result.chars() {
        if c == '\n' {
            newline_count += 1;
        } else {
            if newline_count > 0 {
                if newline_count >= 2 {
                    normalized.push_str("\n\n");
                } else {
                    normalized.push('\n');
                }
                newline_count = 0;
            }

            if !(c == ' ' && prev_char == ' ') {
                normalized.push(c);
            }

            prev_char = c;
        }
    }

    // Pages are glued together later, so keep one separator at the end
    if !normalized.trim().is_empty() {
        let trimmed = normalized.trim().to_string();
        return format!("{}\n", trimmed);
    }

    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        let text = "This  has   multiple    spaces.\n\n\nAnd multiple newlines.\r\nAnd Windows line endings.";
        let expected =
            "This has multiple spaces.\n\nAnd multiple newlines.\nAnd Windows line endings.\n";
        assert_eq!(normalize_whitespace(text), expected);
    }

    #[test]
    fn test_blank_page_normalizes_to_empty() {
        assert_eq!(normalize_whitespace(" \n\n \r\n"), "");
    }

    #[test]
    fn test_skip_empty_drops_blank_pages() {
        let pages = vec!["first\n".to_string(), String::new(), "third\n".to_string()];

        let mut kept = String::new();
        assert_eq!(concat_pages(&mut kept, pages.clone(), PageFilter::SkipEmpty), 2);
        assert_eq!(kept, "first\nthird\n");

        let mut all = String::new();
        assert_eq!(concat_pages(&mut all, pages, PageFilter::KeepAll), 3);
        assert_eq!(all, "first\nthird\n");
    }

    /// Build a minimal PDF with one Helvetica text line per page; "" makes a blank page
    fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
        let mut objects = vec![
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            String::new(),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        ];

        let mut kids = Vec::new();
        for text in pages {
            let page_id = objects.len() + 1;
            kids.push(format!("{} 0 R", page_id));
            objects.push(format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
                 /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
                page_id + 1
            ));

            let stream = if text.is_empty() {
                "BT /F1 12 Tf ET".to_string()
            } else {
                format!("BT /F1 12 Tf 72 720 Td ({}) Tj ET", text)
            };
            objects.push(format!(
                "<< /Length {} >>\nstream\n{}\nendstream",
                stream.len(),
                stream
            ));
        }
        objects[1] = format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            pages.len()
        );

        let mut pdf = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(pdf.len());
            pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
        }

        let xref_start = pdf.len();
        let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
        for offset in offsets {
            xref.push_str(&format!("{:010} 00000 n \n", offset));
        }
        pdf.extend_from_slice(xref.as_bytes());
        pdf.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
                objects.len() + 1,
                xref_start
            )
            .as_bytes(),
        );
        pdf
    }

    #[test]
    fn test_extracts_pages_across_documents() {
        let first = PdfUpload::new(
            "first.pdf",
            pdf_with_pages(&["Hello first page", "", "Third page"]),
        );
        let second = PdfUpload::new("second.pdf", pdf_with_pages(&["Second doc"]));

        let pages = first.extract_pages().unwrap();
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[1], "");

        let uploads = [first, second];
        let expected = "Hello first page\nThird page\nSecond doc\n";
        assert_eq!(extract_text(&uploads, PageFilter::SkipEmpty).unwrap(), expected);
        assert_eq!(extract_text(&uploads, PageFilter::KeepAll).unwrap(), expected);
    }

    #[test]
    fn test_is_pdf_path() {
        assert!(is_pdf_path("report.pdf"));
        assert!(is_pdf_path("/tmp/UPPER.PDF"));
        assert!(!is_pdf_path("notes.txt"));
        assert!(!is_pdf_path("no_extension"));
    }

    #[test]
    fn test_corrupt_pdf_is_an_extraction_error() {
        let upload = PdfUpload::new("broken.pdf", b"definitely not a pdf".to_vec());
        match extract_text(&[upload], PageFilter::SkipEmpty) {
            Err(RagError::Extraction { file, .. }) => assert_eq!(file, "broken.pdf"),
            other => panic!("expected extraction error, got {:?}", other),
        }
    }

    #[test]
    fn test_no_uploads_yield_empty_text() {
        assert_eq!(extract_text(&[], PageFilter::KeepAll).unwrap(), "");
    }

    #[test]
    fn test_missing_file_is_an_extraction_error() {
        let result = PdfUpload::from_path("/definitely/not/here.pdf");
        assert!(matches!(result, Err(RagError::Extraction { .. })));
    }
}
