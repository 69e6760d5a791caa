// src/merge.rs

use crate::error::{Error, Result};
use crate::mapping::Ambiguity;
use crate::state::{Changes, Collection, Snapshot};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct MergeOutcome {
    pub target: String,
    /// Master products that no longer exist.
    pub removed: Vec<String>,
    pub created_target: bool,
    pub is_favorite: bool,
    /// Mapping entries now pointing at the target.
    pub rewritten: usize,
    pub ambiguities: Vec<Ambiguity>,
}

/// Collapse `names` into `target`.
///
/// Catalog records for the merged-away names are dropped, the target record
/// is created if needed and inherits the favorite flag of any dropped record,
/// and every mapping that pointed at one of `names` now points at `target`.
/// Running the same merge twice changes nothing the second time.
pub fn merge(
    snapshot: &mut Snapshot,
    names: &BTreeSet<String>,
    target: &str,
) -> Result<(MergeOutcome, Changes)> {
    let target = target.trim();
    if target.is_empty() {
        return Err(Error::validation("merge target must not be empty"));
    }
    if names.len() < 2 {
        return Err(Error::validation(format!(
            "merge needs at least two names, got {}",
            names.len()
        )));
    }

    let mut changes = Changes::new();
    let mut removed = Vec::new();
    let mut inherit_favorite = false;
    for name in names.iter().filter(|n| n.as_str() != target) {
        if let Some(product) = snapshot.catalog.remove(name) {
            inherit_favorite |= product.is_favorite;
            removed.push(product.name);
        }
    }

    let created_target = snapshot.catalog.ensure(target);
    let was_favorite = snapshot.catalog.get(target).is_some_and(|p| p.is_favorite);
    if inherit_favorite && !was_favorite {
        snapshot.catalog.set_favorite(target, true);
    }
    if !removed.is_empty() || created_target || (inherit_favorite && !was_favorite) {
        changes.insert(Collection::MasterProducts);
    }

    let rewritten = snapshot.mappings.rewrite_targets(names, target);
    if rewritten > 0 {
        changes.insert(Collection::Mappings);
    }

    let suppliers: BTreeSet<_> = snapshot
        .mappings
        .iter()
        .filter(|(_, canonical)| *canonical == target)
        .map(|(key, _)| key.supplier.clone())
        .collect();
    let ambiguities: Vec<Ambiguity> = suppliers
        .iter()
        .filter_map(|supplier| snapshot.mappings.ambiguity(supplier, target))
        .collect();
    for ambiguity in &ambiguities {
        warn!(
            supplier = %ambiguity.supplier,
            canonical = %ambiguity.canonical,
            local_names = ?ambiguity.local_names,
            "Merge left several local names on one product"
        );
    }

    info!(
        target = %target,
        removed = removed.len(),
        rewritten,
        created_target,
        "Master products merged"
    );

    let outcome = MergeOutcome {
        target: target.to_string(),
        removed,
        created_target,
        is_favorite: snapshot.catalog.get(target).is_some_and(|p| p.is_favorite),
        rewritten,
        ambiguities,
    };
    Ok((outcome, changes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::resolve_price;
    use crate::model::{MappingKey, SupplierId};

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    /// Metro sells "Tomaten", Selgros sells "Tomate".
    fn two_spellings() -> Snapshot {
        let mut snap = Snapshot::default();
        let metro = SupplierId::from("metro");
        let selgros = SupplierId::from("selgros");
        snap.catalog.ensure("Tomaten");
        snap.catalog.ensure("Tomate");
        snap.catalog.ensure("Gurke");
        snap.mappings.upsert(&metro, "Tomaten 5kg", "Tomaten");
        snap.mappings.upsert(&selgros, "Tomate lose", "Tomate");
        snap.mappings.upsert(&selgros, "Gurke", "Gurke");
        snap.prices.upsert(&metro, "Tomaten 5kg", 12.5);
        snap.prices.upsert(&selgros, "Tomate lose", 11.9);
        snap
    }

    #[test]
    fn test_merge_into_existing_name() {
        let mut snap = two_spellings();
        let (outcome, changes) = merge(&mut snap, &names(&["Tomaten", "Tomate"]), "Tomaten").unwrap();

        assert_eq!(outcome.removed, vec!["Tomate"]);
        assert!(!outcome.created_target);
        assert_eq!(outcome.rewritten, 1);
        assert_eq!(
            changes,
            Changes::from([Collection::Mappings, Collection::MasterProducts])
        );

        assert!(snap.catalog.contains("Tomaten"));
        assert!(!snap.catalog.contains("Tomate"));
        assert!(
            snap.mappings
                .iter()
                .filter(|(_, c)| c.starts_with("Tomate"))
                .all(|(_, c)| c == "Tomaten")
        );
    }

    #[test]
    fn test_merge_preserves_price_reachability() {
        let mut snap = two_spellings();
        let before: Vec<(MappingKey, Option<f64>)> = snap
            .mappings
            .iter()
            .filter(|(_, c)| *c == "Tomaten" || *c == "Tomate")
            .map(|(k, c)| (k.clone(), resolve_price(&snap, &k.supplier, c)))
            .collect();

        merge(&mut snap, &names(&["Tomaten", "Tomate"]), "Tomaten").unwrap();

        for (key, price) in before {
            assert_eq!(snap.mappings.get(&key.supplier, &key.local_name), Some("Tomaten"));
            assert_eq!(resolve_price(&snap, &key.supplier, "Tomaten"), price);
        }
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut snap = two_spellings();
        merge(&mut snap, &names(&["Tomaten", "Tomate"]), "Tomaten").unwrap();
        let once = snap.clone();

        let (outcome, changes) = merge(&mut snap, &names(&["Tomaten", "Tomate"]), "Tomaten").unwrap();
        assert!(changes.is_empty());
        assert_eq!(outcome.rewritten, 0);
        assert_eq!(snap, once);
    }

    #[test]
    fn test_merge_into_new_name_inherits_favorite() {
        let mut snap = two_spellings();
        snap.catalog.set_favorite("Tomate", true);

        let (outcome, _) = merge(&mut snap, &names(&["Tomaten", "Tomate"]), "Strauchtomaten").unwrap();
        assert!(outcome.created_target);
        assert!(outcome.is_favorite);
        assert_eq!(outcome.removed.len(), 2);
        assert_eq!(snap.catalog.len(), 2);
        assert_eq!(resolve_price(&snap, &"metro".into(), "Strauchtomaten"), Some(12.5));
    }

    #[test]
    fn test_target_favorite_is_preserved() {
        let mut snap = two_spellings();
        snap.catalog.set_favorite("Tomaten", true);
        merge(&mut snap, &names(&["Tomaten", "Tomate"]), "Tomaten").unwrap();
        assert!(snap.catalog.get("Tomaten").unwrap().is_favorite);
    }

    #[test]
    fn test_merge_reports_new_ambiguity() {
        let mut snap = two_spellings();
        snap.mappings.upsert(&"metro".into(), "Tomate Stk", "Tomate");

        let (outcome, _) = merge(&mut snap, &names(&["Tomaten", "Tomate"]), "Tomaten").unwrap();
        assert_eq!(outcome.ambiguities.len(), 1);
        assert_eq!(outcome.ambiguities[0].supplier, SupplierId::from("metro"));
    }

    #[test]
    fn test_merge_needs_two_names_and_a_target() {
        let mut snap = two_spellings();
        assert!(matches!(
            merge(&mut snap, &names(&["Tomaten"]), "Tomaten"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            merge(&mut snap, &names(&["Tomaten", "Tomate"]), " "),
            Err(Error::Validation(_))
        ));
    }
}
