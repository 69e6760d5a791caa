// src/extract/mod.rs

//! Turning an uploaded price list into `(product, price)` pairs.

mod heuristics;
mod llm;
mod pdf;

pub use heuristics::HeuristicExtractor;
pub use llm::LlmExtractor;
pub use pdf::pdf_text;

use crate::config::{LlmBackend, LlmSection};
use crate::error::{Error, Result};
use crate::model::{PriceEntry, is_valid_price};
use async_trait::async_trait;
use std::path::Path;
use tracing::{Instrument, info, info_span, warn};

pub const MIME_PDF: &str = "application/pdf";

const IMAGE_TYPES: [&str; 4] = ["image/png", "image/jpeg", "image/webp", "image/gif"];

/// An uploaded file: raw bytes plus MIME type.
#[derive(Debug, Clone)]
pub struct Document {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl Document {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    /// Read a file, guessing the MIME type from its extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mime_type = mime_for_path(path).ok_or_else(|| {
            Error::extraction(format!("unsupported file type: {}", path.display()))
        })?;
        let bytes = std::fs::read(path)?;
        Ok(Self::new(bytes, mime_type))
    }

    pub fn is_pdf(&self) -> bool {
        self.mime_type == MIME_PDF
    }

    pub fn is_image(&self) -> bool {
        IMAGE_TYPES.contains(&self.mime_type.as_str())
    }
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some(MIME_PDF),
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

#[async_trait]
pub trait PriceExtractor: Send + Sync {
    /// Raw entries as the backend saw them; callers go through
    /// [`extract_document`] for validation.
    async fn extract(&self, document: &Document) -> Result<Vec<PriceEntry>>;

    fn name(&self) -> &'static str;
}

/// Build the extractor selected in the `[llm]` config section.
pub fn extractor_for(llm: &LlmSection) -> Result<Box<dyn PriceExtractor>> {
    match llm.backend {
        LlmBackend::Heuristics => Ok(Box::new(HeuristicExtractor)),
        _ => Ok(Box::new(LlmExtractor::from_config(llm)?)),
    }
}

/// Trim names and drop entries that are not usable.
pub fn sanitize_entries(entries: Vec<PriceEntry>) -> Vec<PriceEntry> {
    entries
        .into_iter()
        .filter_map(|mut entry| {
            entry.product = entry.product.trim().to_string();
            if entry.product.is_empty() || !is_valid_price(entry.price) {
                warn!(product = %entry.product, price = entry.price, "Dropping extracted entry");
                return None;
            }
            Some(entry)
        })
        .collect()
}

/// Run `extractor` on `document` and validate what comes back.
pub async fn extract_document(
    extractor: &dyn PriceExtractor,
    document: &Document,
) -> Result<Vec<PriceEntry>> {
    if !document.is_pdf() && !document.is_image() {
        return Err(Error::extraction(format!(
            "unsupported MIME type {}",
            document.mime_type
        )));
    }

    let span = info_span!(
        "extract",
        backend = extractor.name(),
        mime = %document.mime_type,
        bytes = document.bytes.len()
    );
    async {
        let raw = extractor.extract(document).await?;
        let found = raw.len();
        let entries = sanitize_entries(raw);
        info!(found, kept = entries.len(), "Price list extracted");
        Ok::<_, Error>(entries)
    }
    .instrument(span)
    .await
}
