// src/extract/pdf.rs

use crate::error::{Error, Result};
use lopdf::Document;
use tracing::{info, warn};

/// Fewer non-whitespace characters than this and the PDF counts as scanned.
const MIN_TEXT_CHARS: usize = 30;

/// Share of image-only pages above which the whole file counts as scanned.
const SCANNED_PAGE_RATIO: f64 = 0.8;

fn scanned() -> Error {
    Error::extraction("PDF is scanned; upload it as an image instead")
}

/// Text of a price list PDF, or an extraction error saying why there is none.
///
/// lopdf decides whether the pages carry fonts at all before pdf-extract
/// reads the text; a file that yields almost no text counts as scanned too.
pub fn pdf_text(pdf_bytes: &[u8]) -> Result<String> {
    let doc = Document::load_mem(pdf_bytes)
        .map_err(|e| Error::extraction(format!("not a readable PDF: {e}")))?;
    if looks_like_scanned(&doc) {
        return Err(scanned());
    }

    let text = pdf_extract::extract_text_from_mem(pdf_bytes).map_err(|e| {
        warn!(error = %e, "pdf-extract could not read the price list");
        scanned()
    })?;
    let chars = text.chars().filter(|c| !c.is_whitespace()).count();
    if chars < MIN_TEXT_CHARS {
        info!(chars, "Too little text in PDF");
        return Err(scanned());
    }
    info!(chars, "Price list text read");
    Ok(text)
}

/// A page with XObject images but no fonts is a scanned page.
fn looks_like_scanned(doc: &Document) -> bool {
    let pages = doc.get_pages();
    if pages.is_empty() {
        return false;
    }

    let resource = |page_dict: &lopdf::Dictionary, key: &[u8]| -> bool {
        page_dict
            .get(b"Resources")
            .ok()
            .and_then(|r| doc.dereference(r).ok())
            .and_then(|(_, resolved)| resolved.as_dict().ok())
            .and_then(|res| res.get(key).ok())
            .and_then(|o| doc.dereference(o).ok())
            .and_then(|(_, resolved)| resolved.as_dict().ok())
            .is_some_and(|d| !d.is_empty())
    };

    let image_only_pages = pages
        .values()
        .filter_map(|id| doc.get_object(*id).ok())
        .filter_map(|obj| obj.as_dict().ok())
        .filter(|page| resource(page, b"XObject") && !resource(page, b"Font"))
        .count();

    let ratio = image_only_pages as f64 / pages.len() as f64;
    info!(
        total_pages = pages.len(),
        image_only = image_only_pages,
        ratio = format!("{ratio:.2}"),
        "Scanned-page analysis"
    );
    ratio >= SCANNED_PAGE_RATIO
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_bytes_are_an_extraction_error() {
        let err = pdf_text(b"this is not a pdf").unwrap_err();
        assert!(matches!(err, Error::Extraction(msg) if msg.starts_with("not a readable PDF")));
    }

    #[test]
    fn test_truncated_header_is_an_extraction_error() {
        assert!(matches!(pdf_text(b"%PDF-garbage"), Err(Error::Extraction(_))));
    }
}
