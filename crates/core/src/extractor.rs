use crate::error::ExtractionError;
use lopdf::Document;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>, ExtractionError>;
}

#[derive(Default)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>, ExtractionError> {
        let document =
            Document::load_mem(bytes).map_err(|error| ExtractionError::PdfParse(error.to_string()))?;

        if document.is_encrypted() {
            return Err(ExtractionError::Encrypted(
                "document requires a password".to_string(),
            ));
        }

        let mut pages = Vec::new();
        for (page_number, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_number])
                .map_err(|error| ExtractionError::PdfParse(error.to_string()))?;

            if !text.trim().is_empty() {
                pages.push(PageText {
                    number: page_number,
                    text,
                });
            }
        }

        if pages.is_empty() {
            return Err(ExtractionError::NoTextLayer(
                "no page produced readable text".to_string(),
            ));
        }

        Ok(pages)
    }
}

/// Extracts the full document text as one string, pages in order.
pub fn extract_document_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    let pages = LopdfExtractor.extract_pages(bytes)?;

    let mut text = String::new();
    for page in pages {
        if !text.is_empty() {
            text.push_str("\n\n");
        }
        text.push_str(page.text.trim());
    }

    Ok(text)
}
