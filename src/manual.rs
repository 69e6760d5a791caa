// src/manual.rs

use crate::config::ReconcileSettings;
use crate::error::{Error, Result};
use crate::mapping::Ambiguity;
use crate::model::{SupplierId, is_valid_price};
use crate::reconcile::check_ambiguities;
use crate::state::{Changes, Collection, Snapshot};
use serde::Serialize;
use tracing::info;

/// A single product typed in by hand.
#[derive(Debug, Clone, PartialEq)]
pub struct ManualEntry {
    pub canonical: String,
    /// Name on the supplier's list; empty means "same as canonical".
    pub local_name: String,
    pub price: f64,
    pub supplier: SupplierId,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManualOutcome {
    pub supplier: SupplierId,
    pub canonical: String,
    pub local_name: String,
    pub price: f64,
    pub created: bool,
    pub ambiguities: Vec<Ambiguity>,
}

/// Parse a price as written by a person or printed on a list. Accepts
/// `12.50`, `12,50`, German thousands like `1.234,50` and a trailing
/// `€`/`EUR`.
pub fn parse_price(input: &str) -> Result<f64> {
    let cleaned = input
        .trim()
        .trim_end_matches("EUR")
        .trim_end_matches('€')
        .trim();
    // with a decimal comma, dots can only group thousands
    let normalized = if cleaned.contains(',') {
        cleaned.replace('.', "").replace(',', ".")
    } else {
        cleaned.to_string()
    };
    let price: f64 = normalized
        .parse()
        .map_err(|_| Error::validation(format!("'{input}' is not a price")))?;
    if !is_valid_price(price) {
        return Err(Error::validation(format!(
            "'{input}' is not a non-negative finite price"
        )));
    }
    Ok(price)
}

/// Add one mapping and one price, creating the master product if needed.
pub fn add_manual(
    snapshot: &mut Snapshot,
    entry: &ManualEntry,
    settings: &ReconcileSettings,
) -> Result<(ManualOutcome, Changes)> {
    let canonical = entry.canonical.trim();
    if canonical.is_empty() {
        return Err(Error::validation("master product name must not be empty"));
    }
    if !is_valid_price(entry.price) {
        return Err(Error::validation(format!(
            "price {} is not a non-negative finite number",
            entry.price
        )));
    }
    snapshot.require_supplier(&entry.supplier)?;

    let local_name = match entry.local_name.trim() {
        "" => canonical,
        name => name,
    };

    let created = snapshot.catalog.ensure(canonical);
    snapshot.mappings.upsert(&entry.supplier, local_name, canonical);
    snapshot.prices.upsert(&entry.supplier, local_name, entry.price);

    let ambiguities = check_ambiguities(
        &snapshot.mappings,
        &entry.supplier,
        [canonical],
        settings.mapping_conflicts,
    )?;

    info!(
        supplier = %entry.supplier,
        canonical = %canonical,
        local_name = %local_name,
        price = entry.price,
        created,
        "Manual entry added"
    );

    let outcome = ManualOutcome {
        supplier: entry.supplier.clone(),
        canonical: canonical.to_string(),
        local_name: local_name.to_string(),
        price: entry.price,
        created,
        ambiguities,
    };
    let changes = Changes::from([
        Collection::Prices,
        Collection::Mappings,
        Collection::MasterProducts,
    ]);
    Ok((outcome, changes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::resolve_price;
    use crate::config::ConflictPolicy;
    use crate::model::Supplier;

    fn snapshot() -> Snapshot {
        Snapshot {
            suppliers: vec![Supplier {
                id: "metro".into(),
                name: "Metro".to_string(),
                last_update: None,
            }],
            ..Snapshot::default()
        }
    }

    fn entry(canonical: &str, local_name: &str, price: f64, supplier: &str) -> ManualEntry {
        ManualEntry {
            canonical: canonical.to_string(),
            local_name: local_name.to_string(),
            price,
            supplier: supplier.into(),
        }
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price("12.50").unwrap(), 12.5);
        assert_eq!(parse_price(" 12,50 € ").unwrap(), 12.5);
        assert_eq!(parse_price("3 EUR").unwrap(), 3.0);
        assert_eq!(parse_price("1.234,50").unwrap(), 1234.5);
        assert_eq!(parse_price("1.234,50 €").unwrap(), 1234.5);
        assert!(matches!(parse_price("1,2,3"), Err(Error::Validation(_))));
        assert!(matches!(parse_price("zwölf"), Err(Error::Validation(_))));
        assert!(matches!(parse_price("NaN"), Err(Error::Validation(_))));
        assert!(matches!(parse_price("-1"), Err(Error::Validation(_))));
        assert!(matches!(parse_price(""), Err(Error::Validation(_))));
    }

    #[test]
    fn test_empty_local_name_defaults_to_canonical() {
        let mut snap = snapshot();
        let (outcome, _) = add_manual(
            &mut snap,
            &entry("Basilikum", "", 1.29, "metro"),
            &ReconcileSettings::default(),
        )
        .unwrap();

        assert!(outcome.created);
        assert_eq!(outcome.local_name, "Basilikum");
        assert_eq!(snap.mappings.get(&"metro".into(), "Basilikum"), Some("Basilikum"));
        assert_eq!(resolve_price(&snap, &"metro".into(), "Basilikum"), Some(1.29));
    }

    #[test]
    fn test_existing_master_product_is_reused() {
        let mut snap = snapshot();
        snap.catalog.ensure("Basilikum");
        snap.catalog.set_favorite("Basilikum", true);

        let (outcome, _) = add_manual(
            &mut snap,
            &entry("Basilikum", "Basilikum Topf", 1.49, "metro"),
            &ReconcileSettings::default(),
        )
        .unwrap();
        assert!(!outcome.created);
        assert!(snap.catalog.get("Basilikum").unwrap().is_favorite);
    }

    #[test]
    fn test_validation_failures() {
        let settings = ReconcileSettings::default();
        let mut snap = snapshot();

        let err = add_manual(&mut snap, &entry("Basilikum", "", f64::NAN, "metro"), &settings);
        assert!(matches!(err, Err(Error::Validation(_))));

        let err = add_manual(&mut snap, &entry("  ", "x", 1.0, "metro"), &settings);
        assert!(matches!(err, Err(Error::Validation(_))));

        let err = add_manual(&mut snap, &entry("Basilikum", "", 1.0, "aldi"), &settings);
        assert!(matches!(err, Err(Error::UnknownSupplier(_))));

        assert!(snap.catalog.is_empty());
    }

    #[test]
    fn test_reject_policy_blocks_second_synonym() {
        let settings = ReconcileSettings {
            mapping_conflicts: ConflictPolicy::Reject,
            ..ReconcileSettings::default()
        };
        let mut snap = snapshot();
        add_manual(&mut snap, &entry("Basilikum", "Basilikum Topf", 1.49, "metro"), &settings).unwrap();
        let err = add_manual(&mut snap, &entry("Basilikum", "Basilikum Bund", 0.99, "metro"), &settings);
        assert!(matches!(err, Err(Error::AmbiguousMapping(_))));
    }
}
