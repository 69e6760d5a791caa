// src/prices.rs

use crate::model::{SupplierId, is_valid_price};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per supplier: local product name → price.
///
/// Independent of the mapping store; a price can exist for a local name that
/// nobody has reviewed yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<SupplierId, BTreeMap<String, f64>>")]
#[serde(into = "BTreeMap<SupplierId, BTreeMap<String, f64>>")]
pub struct PriceTable {
    by_supplier: BTreeMap<SupplierId, BTreeMap<String, f64>>,
}

impl PriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, supplier: &SupplierId, local_name: &str) -> Option<f64> {
        self.by_supplier.get(supplier)?.get(local_name).copied()
    }

    /// Insert or overwrite one price. Callers validate the price first.
    pub fn upsert(&mut self, supplier: &SupplierId, local_name: &str, price: f64) -> Option<f64> {
        self.by_supplier
            .entry(supplier.clone())
            .or_default()
            .insert(local_name.to_string(), price)
    }

    /// All prices of one supplier, ascending by local name.
    pub fn for_supplier<'a>(&'a self, supplier: &SupplierId) -> impl Iterator<Item = (&'a str, f64)> + 'a {
        self.by_supplier
            .get(supplier)
            .into_iter()
            .flat_map(|list| list.iter().map(|(name, price)| (name.as_str(), *price)))
    }

    /// Drop the whole price list of `supplier`. Returns how many prices went.
    pub fn clear_supplier(&mut self, supplier: &SupplierId) -> usize {
        self.by_supplier
            .remove(supplier)
            .map_or(0, |list| list.len())
    }

    pub fn len(&self) -> usize {
        self.by_supplier.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TryFrom<BTreeMap<SupplierId, BTreeMap<String, f64>>> for PriceTable {
    type Error = String;

    fn try_from(by_supplier: BTreeMap<SupplierId, BTreeMap<String, f64>>) -> Result<Self, Self::Error> {
        for (supplier, list) in &by_supplier {
            if let Some((name, price)) = list.iter().find(|(_, p)| !is_valid_price(**p)) {
                return Err(format!(
                    "supplier '{supplier}': invalid price {price} for '{name}'"
                ));
            }
        }
        Ok(Self { by_supplier })
    }
}

impl From<PriceTable> for BTreeMap<SupplierId, BTreeMap<String, f64>> {
    fn from(table: PriceTable) -> Self {
        table.by_supplier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_and_get() {
        let mut table = PriceTable::new();
        let metro = SupplierId::from("metro");
        assert_eq!(table.upsert(&metro, "Tomaten 5kg", 12.5), None);
        assert_eq!(table.upsert(&metro, "Tomaten 5kg", 11.0), Some(12.5));
        assert_eq!(table.get(&metro, "Tomaten 5kg"), Some(11.0));
        assert_eq!(table.get(&"selgros".into(), "Tomaten 5kg"), None);
    }

    #[test]
    fn test_clear_supplier() {
        let mut table = PriceTable::new();
        let metro = SupplierId::from("metro");
        table.upsert(&metro, "a", 1.0);
        table.upsert(&metro, "b", 2.0);
        table.upsert(&"selgros".into(), "a", 3.0);

        assert_eq!(table.clear_supplier(&metro), 2);
        assert_eq!(table.for_supplier(&metro).count(), 0);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_negative_price_rejected_on_read() {
        let json = serde_json::json!({"metro": {"Tomaten": -1.0}});
        assert!(serde_json::from_value::<PriceTable>(json).is_err());

        let json = serde_json::json!({"metro": {"Tomaten": 12.5}});
        let table: PriceTable = serde_json::from_value(json).unwrap();
        assert_eq!(table.get(&"metro".into(), "Tomaten"), Some(12.5));
    }
}
