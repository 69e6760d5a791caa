// src/compare.rs

//! Read-only projections over a [`Snapshot`]: price lookup, row minimum,
//! catalog filtering and the comparison table.

use crate::model::{MasterProduct, PriceEntry, SupplierId};
use crate::state::Snapshot;
use serde::Serialize;
use std::cmp::Ordering;

/// Price `supplier` charges for `canonical`, if any.
///
/// Goes through the supplier's mappings in store order (ascending local
/// name), takes the first local name mapped to `canonical` and looks that up
/// in the supplier's price list.
pub fn resolve_price(snapshot: &Snapshot, supplier: &SupplierId, canonical: &str) -> Option<f64> {
    let local_name = snapshot.mappings.first_local_name(supplier, canonical)?;
    snapshot.prices.get(supplier, local_name)
}

/// Lowest resolved price over `suppliers`, `None` if nobody has one.
pub fn row_minimum(snapshot: &Snapshot, canonical: &str, suppliers: &[SupplierId]) -> Option<f64> {
    suppliers
        .iter()
        .filter_map(|s| resolve_price(snapshot, s, canonical))
        .reduce(f64::min)
}

/// Every supplier whose price equals the row minimum.
pub fn best_suppliers(snapshot: &Snapshot, canonical: &str, suppliers: &[SupplierId]) -> Vec<SupplierId> {
    let Some(min) = row_minimum(snapshot, canonical, suppliers) else {
        return Vec::new();
    };
    suppliers
        .iter()
        .filter(|s| resolve_price(snapshot, s, canonical) == Some(min))
        .cloned()
        .collect()
}

/// Sort key that puts accented Latin letters next to their base letter and
/// ignores case, roughly what a German collation does.
pub fn collation_key(s: &str) -> String {
    let mut key = String::with_capacity(s.len());
    for c in s.chars().flat_map(char::to_lowercase) {
        match c {
            'ä' | 'á' | 'à' | 'â' | 'å' | 'ã' => key.push('a'),
            'é' | 'è' | 'ê' | 'ë' => key.push('e'),
            'í' | 'ì' | 'î' | 'ï' => key.push('i'),
            'ö' | 'ó' | 'ò' | 'ô' | 'õ' | 'ø' => key.push('o'),
            'ü' | 'ú' | 'ù' | 'û' => key.push('u'),
            'ç' => key.push('c'),
            'ñ' => key.push('n'),
            'ß' => key.push_str("ss"),
            other => key.push(other),
        }
    }
    key
}

pub(crate) fn compare_names(a: &str, b: &str) -> Ordering {
    collation_key(a)
        .cmp(&collation_key(b))
        .then_with(|| a.cmp(b))
}

/// Products whose name contains `query` (case-insensitive), favorites first,
/// then by name.
pub fn filter_and_sort<'a>(
    products: impl IntoIterator<Item = &'a MasterProduct>,
    query: &str,
) -> Vec<&'a MasterProduct> {
    let needle = query.to_lowercase();
    let mut hits: Vec<&MasterProduct> = products
        .into_iter()
        .filter(|p| !p.name.is_empty() && p.name.to_lowercase().contains(&needle))
        .collect();
    hits.sort_by(|a, b| {
        b.is_favorite
            .cmp(&a.is_favorite)
            .then_with(|| compare_names(&a.name, &b.name))
    });
    hits
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupplierPrice {
    pub supplier: SupplierId,
    pub price: Option<f64>,
    /// Price equals the row minimum.
    pub best: bool,
}

/// One line of the comparison table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub name: String,
    pub is_favorite: bool,
    pub minimum: Option<f64>,
    /// Same order as the supplier list the row was built for.
    pub prices: Vec<SupplierPrice>,
}

impl ComparisonRow {
    pub fn build(snapshot: &Snapshot, product: &MasterProduct, suppliers: &[SupplierId]) -> Self {
        let resolved: Vec<(SupplierId, Option<f64>)> = suppliers
            .iter()
            .map(|s| (s.clone(), resolve_price(snapshot, s, &product.name)))
            .collect();
        let minimum = resolved.iter().filter_map(|(_, p)| *p).reduce(f64::min);
        let prices = resolved
            .into_iter()
            .map(|(supplier, price)| SupplierPrice {
                best: price.is_some() && price == minimum,
                supplier,
                price,
            })
            .collect();
        Self {
            name: product.name.clone(),
            is_favorite: product.is_favorite,
            minimum,
            prices,
        }
    }

    pub fn resolved(&self) -> impl Iterator<Item = f64> + '_ {
        self.prices.iter().filter_map(|p| p.price)
    }

    /// At least two prices and they are not all the same.
    pub fn has_difference(&self) -> bool {
        let mut prices = self.resolved();
        let Some(first) = prices.next() else {
            return false;
        };
        prices.any(|p| p != first)
    }

    pub fn maximum(&self) -> Option<f64> {
        self.resolved().reduce(f64::max)
    }

    pub fn price_of(&self, supplier: &SupplierId) -> Option<f64> {
        self.prices
            .iter()
            .find(|p| &p.supplier == supplier)
            .and_then(|p| p.price)
    }
}

/// The main comparison view: filtered, sorted products against all suppliers.
pub fn comparison_table(snapshot: &Snapshot, query: &str) -> Vec<ComparisonRow> {
    let suppliers = snapshot.supplier_ids();
    filter_and_sort(snapshot.catalog.iter(), query)
        .into_iter()
        .map(|product| ComparisonRow::build(snapshot, product, &suppliers))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailLine {
    pub supplier: SupplierId,
    pub supplier_name: String,
    /// Every local name of this supplier mapped to the product.
    pub local_names: Vec<String>,
    pub price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductDetail {
    pub name: String,
    pub is_favorite: bool,
    pub suppliers: Vec<DetailLine>,
}

/// How each supplier names `canonical` on its list. `None` if the product is
/// not in the catalog and nothing maps to it.
pub fn product_detail(snapshot: &Snapshot, canonical: &str) -> Option<ProductDetail> {
    let lines: Vec<DetailLine> = snapshot
        .suppliers
        .iter()
        .filter_map(|s| {
            let local_names = snapshot.mappings.local_names_for(&s.id, canonical);
            (!local_names.is_empty()).then(|| DetailLine {
                supplier: s.id.clone(),
                supplier_name: s.name.clone(),
                local_names: local_names.into_iter().map(str::to_string).collect(),
                price: resolve_price(snapshot, &s.id, canonical),
            })
        })
        .collect();

    let product = snapshot.catalog.get(canonical);
    if product.is_none() && lines.is_empty() {
        return None;
    }
    Some(ProductDetail {
        name: canonical.to_string(),
        is_favorite: product.is_some_and(|p| p.is_favorite),
        suppliers: lines,
    })
}

/// Prices of `supplier` whose local name nobody has mapped yet.
pub fn pending_prices(snapshot: &Snapshot, supplier: &SupplierId) -> Vec<PriceEntry> {
    snapshot
        .prices
        .for_supplier(supplier)
        .filter(|(local, _)| snapshot.mappings.get(supplier, local).is_none())
        .map(|(local, price)| PriceEntry::new(local, price))
        .collect()
}
