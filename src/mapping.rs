// src/mapping.rs

//! The mapping store: (supplier, local product name) → canonical name.
//!
//! A true map, so every key has at most one canonical name and later writes
//! win. Several local names of one supplier may point at the same canonical
//! name; [`MappingStore::ambiguities`] reports those cases because the price
//! lookup then depends on enumeration order.

use crate::model::{MappingKey, SupplierId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Serialized form of one mapping. The composite key is stored as two
/// fields, never as a delimited string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub supplier_id: SupplierId,
    pub local_name: String,
    pub canonical: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<MappingEntry>", into = "Vec<MappingEntry>")]
pub struct MappingStore {
    entries: BTreeMap<MappingKey, String>,
}

/// More than one local name of a supplier maps to the same canonical name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ambiguity {
    pub supplier: SupplierId,
    pub canonical: String,
    /// In lookup order; the first one is the one prices are read from.
    pub local_names: Vec<String>,
}

impl fmt::Display for Ambiguity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "supplier '{}' maps {} local names to '{}': {}",
            self.supplier,
            self.local_names.len(),
            self.canonical,
            self.local_names.join(", ")
        )
    }
}

impl MappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, supplier: &SupplierId, local_name: &str) -> Option<&str> {
        self.entries
            .get(&MappingKey::new(supplier.clone(), local_name))
            .map(String::as_str)
    }

    /// Insert or overwrite. Returns the previous canonical name, if any.
    pub fn upsert(
        &mut self,
        supplier: &SupplierId,
        local_name: &str,
        canonical: &str,
    ) -> Option<String> {
        self.entries.insert(
            MappingKey::new(supplier.clone(), local_name),
            canonical.to_string(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MappingKey, &str)> {
        self.entries.iter().map(|(k, v)| (k, v.as_str()))
    }

    /// All (local name, canonical) pairs of one supplier, ascending by local name.
    pub fn for_supplier<'a>(
        &'a self,
        supplier: &'a SupplierId,
    ) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.entries
            .range(MappingKey::new(supplier.clone(), String::new())..)
            .take_while(move |(k, _)| &k.supplier == supplier)
            .map(|(k, v)| (k.local_name.as_str(), v.as_str()))
    }

    /// Local names of `supplier` that map to `canonical`, in lookup order.
    pub fn local_names_for<'a>(&'a self, supplier: &'a SupplierId, canonical: &str) -> Vec<&'a str> {
        self.for_supplier(supplier)
            .filter(|(_, c)| *c == canonical)
            .map(|(local, _)| local)
            .collect()
    }

    /// The local name the price lookup uses for (supplier, canonical).
    ///
    /// First match in store order (ascending local name). Deterministic, but
    /// only meaningful while the pair is unambiguous.
    pub fn first_local_name<'a>(&'a self, supplier: &'a SupplierId, canonical: &str) -> Option<&'a str> {
        self.for_supplier(supplier)
            .find(|(_, c)| *c == canonical)
            .map(|(local, _)| local)
    }

    /// Point every mapping whose value is in `names` at `target`.
    /// Returns how many entries changed.
    pub fn rewrite_targets(&mut self, names: &BTreeSet<String>, target: &str) -> usize {
        let mut changed = 0;
        for canonical in self.entries.values_mut() {
            if names.contains(canonical.as_str()) && canonical.as_str() != target {
                *canonical = target.to_string();
                changed += 1;
            }
        }
        changed
    }

    /// Drop every mapping keyed to `supplier`. Returns the number removed.
    pub fn remove_supplier(&mut self, supplier: &SupplierId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|k, _| &k.supplier != supplier);
        before - self.entries.len()
    }

    /// The ambiguity for one (supplier, canonical) pair, if there is one.
    pub fn ambiguity(&self, supplier: &SupplierId, canonical: &str) -> Option<Ambiguity> {
        let local_names = self.local_names_for(supplier, canonical);
        (local_names.len() > 1).then(|| Ambiguity {
            supplier: supplier.clone(),
            canonical: canonical.to_string(),
            local_names: local_names.into_iter().map(str::to_string).collect(),
        })
    }

    /// Every (supplier, canonical) pair reached from more than one local name.
    pub fn ambiguities(&self) -> Vec<Ambiguity> {
        let mut grouped: BTreeMap<(&SupplierId, &str), Vec<String>> = BTreeMap::new();
        for (key, canonical) in &self.entries {
            grouped
                .entry((&key.supplier, canonical.as_str()))
                .or_default()
                .push(key.local_name.clone());
        }

        grouped
            .into_iter()
            .filter(|(_, locals)| locals.len() > 1)
            .map(|((supplier, canonical), local_names)| Ambiguity {
                supplier: supplier.clone(),
                canonical: canonical.to_string(),
                local_names,
            })
            .collect()
    }
}

impl TryFrom<Vec<MappingEntry>> for MappingStore {
    type Error = String;

    fn try_from(list: Vec<MappingEntry>) -> Result<Self, Self::Error> {
        let mut store = MappingStore::new();
        for entry in list {
            if entry.local_name.is_empty() || entry.canonical.is_empty() {
                return Err(format!(
                    "mapping for supplier '{}' has an empty name",
                    entry.supplier_id
                ));
            }
            let key = MappingKey::new(entry.supplier_id, entry.local_name);
            if store.entries.insert(key.clone(), entry.canonical).is_some() {
                return Err(format!(
                    "duplicate mapping for supplier '{}', product '{}'",
                    key.supplier, key.local_name
                ));
            }
        }
        Ok(store)
    }
}

impl From<MappingStore> for Vec<MappingEntry> {
    fn from(store: MappingStore) -> Self {
        store
            .entries
            .into_iter()
            .map(|(key, canonical)| MappingEntry {
                supplier_id: key.supplier,
                local_name: key.local_name,
                canonical,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metro() -> SupplierId {
        SupplierId::from("metro")
    }

    #[test]
    fn test_upsert_is_last_write_wins() {
        let mut store = MappingStore::new();
        assert_eq!(store.upsert(&metro(), "Tomaten 5kg", "Tomate"), None);
        assert_eq!(
            store.upsert(&metro(), "Tomaten 5kg", "Tomaten").as_deref(),
            Some("Tomate")
        );
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&metro(), "Tomaten 5kg"), Some("Tomaten"));
    }

    #[test]
    fn test_for_supplier_stays_within_supplier() {
        let mut store = MappingStore::new();
        store.upsert(&"a".into(), "x", "X");
        store.upsert(&metro(), "b", "B");
        store.upsert(&metro(), "a", "A");
        store.upsert(&"zeta".into(), "a", "A");

        let supplier = metro();
        let got: Vec<_> = store.for_supplier(&supplier).collect();
        assert_eq!(got, vec![("a", "A"), ("b", "B")]);
    }

    #[test]
    fn test_delimiter_in_names_is_harmless() {
        let mut store = MappingStore::new();
        store.upsert(&"a|b".into(), "c", "one");
        store.upsert(&"a".into(), "b|c", "two");

        assert_eq!(store.get(&"a|b".into(), "c"), Some("one"));
        assert_eq!(store.get(&"a".into(), "b|c"), Some("two"));
    }

    #[test]
    fn test_ambiguities_reported_in_lookup_order() {
        let mut store = MappingStore::new();
        store.upsert(&metro(), "Tomate rund", "Tomaten");
        store.upsert(&metro(), "Rispentomate", "Tomaten");
        store.upsert(&"selgros".into(), "Tomaten", "Tomaten");

        let found = store.ambiguities();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].supplier, metro());
        assert_eq!(found[0].local_names, vec!["Rispentomate", "Tomate rund"]);
        assert_eq!(store.first_local_name(&metro(), "Tomaten"), Some("Rispentomate"));
        assert!(store.ambiguity(&"selgros".into(), "Tomaten").is_none());
    }

    #[test]
    fn test_rewrite_and_remove_supplier() {
        let mut store = MappingStore::new();
        store.upsert(&metro(), "a", "Tomate");
        store.upsert(&metro(), "b", "Tomaten");
        store.upsert(&"selgros".into(), "c", "Tomate");

        let names: BTreeSet<String> = ["Tomate", "Tomaten"].iter().map(|s| s.to_string()).collect();
        assert_eq!(store.rewrite_targets(&names, "Tomaten"), 2);
        assert!(store.iter().all(|(_, c)| c == "Tomaten"));

        assert_eq!(store.remove_supplier(&metro()), 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_serde_uses_explicit_fields() {
        let mut store = MappingStore::new();
        store.upsert(&metro(), "Tomaten 5kg", "Tomaten");

        let json = serde_json::to_value(&store).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"supplier_id": "metro", "local_name": "Tomaten 5kg", "canonical": "Tomaten"}
            ])
        );
        let back: MappingStore = serde_json::from_value(json).unwrap();
        assert_eq!(back, store);
    }

    #[test]
    fn test_duplicate_keys_rejected_on_read() {
        let json = serde_json::json!([
            {"supplier_id": "metro", "local_name": "a", "canonical": "A"},
            {"supplier_id": "metro", "local_name": "a", "canonical": "B"}
        ]);
        assert!(serde_json::from_value::<MappingStore>(json).is_err());
    }
}
