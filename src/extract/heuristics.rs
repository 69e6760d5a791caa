// src/extract/heuristics.rs

use super::{Document, PriceExtractor, pdf};
use crate::error::{Error, Result};
use crate::manual::parse_price;
use crate::model::PriceEntry;
use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info};

/// Regex line parser over PDF text. No network, no model.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicExtractor;

#[async_trait]
impl PriceExtractor for HeuristicExtractor {
    async fn extract(&self, document: &Document) -> Result<Vec<PriceEntry>> {
        if !document.is_pdf() {
            return Err(Error::extraction(
                "the heuristics backend reads PDF text only; use an LLM backend for images",
            ));
        }
        let text = pdf::pdf_text(&document.bytes)?;
        let entries = parse_price_lines(&text);
        info!(lines = text.lines().count(), entries = entries.len(), "Heuristic parse done");
        Ok(entries)
    }

    fn name(&self) -> &'static str {
        "heuristics"
    }
}

// ---------------------------------------------------------------------------
// Line parser
// ---------------------------------------------------------------------------

/// One entry per line that ends in a price (`Tomaten 5kg   12,50 €`).
/// Sum, tax and header lines are skipped.
pub fn parse_price_lines(text: &str) -> Vec<PriceEntry> {
    let Some(line_re) = Regex::new(
        r"^(?P<name>.*?\S)[\s.:]*\s(?:€\s*)?(?P<price>\d{1,3}(?:\.\d{3})+,\d{2}|\d+,\d{2}|\d+\.\d{2})\s*(?:€|EUR)?$",
    )
    .ok() else {
        return Vec::new();
    };
    let Some(skip_re) =
        Regex::new(r"(?i)\b(zwischensumme|summe|gesamt|total|mwst|ust|rabatt|skonto|seite)\b").ok()
    else {
        return Vec::new();
    };

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !skip_re.is_match(line))
        .filter_map(|line| {
            let caps = line_re.captures(line)?;
            let name = caps["name"].trim();
            if !name.chars().any(char::is_alphabetic) {
                return None;
            }
            let price = parse_price(&caps["price"]).ok()?;
            debug!(product = %name, price, "Price line");
            Some(PriceEntry::new(name, price))
        })
        .collect()
}
