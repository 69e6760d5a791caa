// src/reconcile.rs

//! Turn a reviewed batch of extracted (local name, price) entries into
//! mapping, price, catalog and supplier updates.

use crate::config::{ConflictPolicy, PriceListMode, ReconcileSettings};
use crate::error::{Error, Result};
use crate::mapping::{Ambiguity, MappingStore};
use crate::model::{PriceEntry, SupplierId, is_valid_price};
use crate::state::{Changes, Collection, Snapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{info, warn};

/// The reviewer's choice for one extracted entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "canonical", rename_all = "snake_case")]
pub enum Decision {
    /// Use the extracted local name as a new canonical name.
    CreateNew,
    /// Map to this canonical name. An empty name means `CreateNew`.
    Assign(String),
}

impl Decision {
    pub fn assign(canonical: impl Into<String>) -> Self {
        Self::Assign(canonical.into())
    }

    /// The canonical name this decision resolves to for `local_name`.
    pub fn canonical_for<'a>(&'a self, local_name: &'a str) -> &'a str {
        match self {
            Decision::Assign(name) if !name.trim().is_empty() => name.trim(),
            _ => local_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewedItem {
    #[serde(flatten)]
    pub entry: PriceEntry,
    pub decision: Decision,
}

impl ReviewedItem {
    pub fn new(entry: PriceEntry, decision: Decision) -> Self {
        Self { entry, decision }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    pub supplier: SupplierId,
    pub applied: usize,
    /// Master products created by this batch.
    pub created: Vec<String>,
    /// Prices dropped beforehand in replace mode.
    pub cleared_prices: usize,
    pub ambiguities: Vec<Ambiguity>,
}

/// Prefill decisions for a fresh upload from what the supplier's local names
/// were mapped to before.
pub fn suggest_decisions(
    snapshot: &Snapshot,
    supplier: &SupplierId,
    entries: &[PriceEntry],
) -> Vec<ReviewedItem> {
    entries
        .iter()
        .map(|entry| {
            let decision = snapshot
                .mappings
                .get(supplier, &entry.product)
                .map_or(Decision::CreateNew, Decision::assign);
            ReviewedItem::new(entry.clone(), decision)
        })
        .collect()
}

fn validate_batch(snapshot: &Snapshot, supplier: &SupplierId, items: &[ReviewedItem]) -> Result<()> {
    snapshot.require_supplier(supplier)?;
    for (idx, item) in items.iter().enumerate() {
        if item.entry.product.trim().is_empty() {
            return Err(Error::validation(format!("item {idx}: product name is empty")));
        }
        if !is_valid_price(item.entry.price) {
            return Err(Error::validation(format!(
                "item {idx} ('{}'): price {} is not a non-negative number",
                item.entry.product, item.entry.price
            )));
        }
    }
    Ok(())
}

/// Collect ambiguities for `canonicals` under `supplier` and apply `policy`.
pub(crate) fn check_ambiguities<'a>(
    mappings: &MappingStore,
    supplier: &SupplierId,
    canonicals: impl IntoIterator<Item = &'a str>,
    policy: ConflictPolicy,
) -> Result<Vec<Ambiguity>> {
    let found: Vec<Ambiguity> = canonicals
        .into_iter()
        .filter_map(|canonical| mappings.ambiguity(supplier, canonical))
        .collect();

    if let (ConflictPolicy::Reject, Some(first)) = (policy, found.first()) {
        return Err(Error::AmbiguousMapping(first.clone()));
    }
    for ambiguity in &found {
        warn!(
            supplier = %ambiguity.supplier,
            canonical = %ambiguity.canonical,
            local_names = ?ambiguity.local_names,
            "Ambiguous mapping: price lookup uses the first local name"
        );
    }
    Ok(found)
}

/// Apply `items` for `supplier` to `snapshot`.
///
/// Items are processed in order, so a local name that appears twice ends up
/// with its last decision and price. The snapshot may be left half-edited on
/// error; the coordinator discards it in that case.
pub fn apply_batch(
    snapshot: &mut Snapshot,
    supplier: &SupplierId,
    items: &[ReviewedItem],
    settings: &ReconcileSettings,
    today: &str,
) -> Result<(ReconcileOutcome, Changes)> {
    validate_batch(snapshot, supplier, items)?;
    if items.is_empty() && settings.price_list_mode == PriceListMode::Replace {
        return Err(Error::validation(
            "refusing to replace a price list with an empty one",
        ));
    }

    let cleared_prices = match settings.price_list_mode {
        PriceListMode::Replace => snapshot.prices.clear_supplier(supplier),
        PriceListMode::Merge => 0,
    };

    let mut created = Vec::new();
    let mut touched = BTreeSet::new();
    for item in items {
        let local_name = item.entry.product.trim();
        let canonical = item.decision.canonical_for(local_name);

        if snapshot.catalog.ensure(canonical) {
            created.push(canonical.to_string());
        }
        snapshot.mappings.upsert(supplier, local_name, canonical);
        snapshot.prices.upsert(supplier, local_name, item.entry.price);
        touched.insert(canonical);
    }

    let ambiguities = check_ambiguities(
        &snapshot.mappings,
        supplier,
        touched.iter().copied(),
        settings.mapping_conflicts,
    )?;

    for s in snapshot.suppliers.iter_mut().filter(|s| &s.id == supplier) {
        s.last_update = Some(today.to_string());
    }

    info!(
        supplier = %supplier,
        items = items.len(),
        created = created.len(),
        cleared_prices,
        mode = ?settings.price_list_mode,
        "Batch reconciled"
    );

    let outcome = ReconcileOutcome {
        supplier: supplier.clone(),
        applied: items.len(),
        created,
        cleared_prices,
        ambiguities,
    };
    let changes = Changes::from(Collection::ALL);
    Ok((outcome, changes))
}
