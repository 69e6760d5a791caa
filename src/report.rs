// src/report.rs

//! Savings report data: what each supplier would save you compared with the
//! most expensive selected supplier.

use crate::compare::{ComparisonRow, compare_names};
use crate::model::SupplierId;
use crate::state::Snapshot;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq)]
pub struct ReportOptions {
    /// Empty selects every supplier.
    pub suppliers: Vec<SupplierId>,
    pub only_differences: bool,
    pub sort_by_savings: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            suppliers: Vec::new(),
            only_differences: true,
            sort_by_savings: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportLine {
    pub product: String,
    pub price: f64,
    pub saving: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupplierReport {
    pub supplier: SupplierId,
    pub name: String,
    pub lines: Vec<ReportLine>,
    pub total: f64,
    pub savings_total: f64,
}

fn selected(snapshot: &Snapshot, options: &ReportOptions) -> Vec<SupplierId> {
    if options.suppliers.is_empty() {
        return snapshot.supplier_ids();
    }
    // keep the supplier list order, drop unknown ids
    snapshot
        .suppliers
        .iter()
        .filter(|s| options.suppliers.contains(&s.id))
        .map(|s| s.id.clone())
        .collect()
}

fn rows(snapshot: &Snapshot, suppliers: &[SupplierId], only_differences: bool) -> Vec<ComparisonRow> {
    let mut products: Vec<_> = snapshot
        .catalog
        .iter()
        .filter(|p| !p.name.is_empty())
        .collect();
    products.sort_by(|a, b| compare_names(&a.name, &b.name));
    products
        .into_iter()
        .map(|p| ComparisonRow::build(snapshot, p, suppliers))
        .filter(|row| !only_differences || row.has_difference())
        .collect()
}

/// One group per selected supplier that has at least one line.
pub fn grouped_report(snapshot: &Snapshot, options: &ReportOptions) -> Vec<SupplierReport> {
    let suppliers = selected(snapshot, options);
    let rows = rows(snapshot, &suppliers, options.only_differences);

    snapshot
        .suppliers
        .iter()
        .filter(|s| suppliers.contains(&s.id))
        .filter_map(|supplier| {
            let mut lines: Vec<ReportLine> = rows
                .iter()
                .filter_map(|row| {
                    let price = row.price_of(&supplier.id)?;
                    let max = row.maximum()?;
                    Some(ReportLine {
                        product: row.name.clone(),
                        price,
                        saving: max - price,
                    })
                })
                .collect();
            if lines.is_empty() {
                return None;
            }
            if options.sort_by_savings {
                lines.sort_by(|a, b| b.saving.total_cmp(&a.saving));
            }
            Some(SupplierReport {
                supplier: supplier.id.clone(),
                name: supplier.name.clone(),
                total: lines.iter().map(|l| l.price).sum(),
                savings_total: lines.iter().map(|l| l.saving).sum(),
                lines,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatrixReport {
    pub suppliers: Vec<SupplierId>,
    pub rows: Vec<ComparisonRow>,
}

/// Product by supplier matrix over the selected suppliers. Without
/// `only_differences` every catalog product is listed, priced or not.
pub fn matrix_report(snapshot: &Snapshot, options: &ReportOptions) -> MatrixReport {
    let suppliers = selected(snapshot, options);
    let rows = rows(snapshot, &suppliers, options.only_differences);
    MatrixReport { suppliers, rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Supplier;

    fn snapshot() -> Snapshot {
        let mut snap = Snapshot {
            suppliers: ["metro", "selgros", "aldi"]
                .into_iter()
                .map(|id| Supplier {
                    id: id.into(),
                    name: id.to_uppercase(),
                    last_update: None,
                })
                .collect(),
            ..Snapshot::default()
        };
        for (s, product, price) in [
            ("metro", "Tomaten", 12.0),
            ("selgros", "Tomaten", 10.0),
            ("aldi", "Tomaten", 11.0),
            ("metro", "Basilikum", 2.0),
            ("selgros", "Basilikum", 1.0),
            ("metro", "Gurke", 0.5),
            ("aldi", "Gurke", 0.5),
            ("aldi", "Mehl", 0.9),
        ] {
            let s = SupplierId::from(s);
            snap.catalog.ensure(product);
            snap.mappings.upsert(&s, product, product);
            snap.prices.upsert(&s, product, price);
        }
        snap
    }

    #[test]
    fn test_grouped_report_only_differences() {
        let snap = snapshot();
        let report = grouped_report(&snap, &ReportOptions::default());

        let names: Vec<&str> = report.iter().map(|g| g.supplier.as_str()).collect();
        assert_eq!(names, vec!["metro", "selgros", "aldi"]);

        let metro = &report[0];
        let products: Vec<&str> = metro.lines.iter().map(|l| l.product.as_str()).collect();
        assert_eq!(products, vec!["Basilikum", "Tomaten"]);
        assert_eq!(metro.total, 14.0);
        assert_eq!(metro.savings_total, 0.0);

        let selgros = &report[1];
        assert_eq!(selgros.savings_total, 3.0);

        // Gurke costs the same everywhere, Mehl has one price only
        let aldi = &report[2];
        assert_eq!(aldi.lines.len(), 1);
        assert_eq!(aldi.lines[0].saving, 1.0);
    }

    #[test]
    fn test_grouped_report_all_products_sorted_by_savings() {
        let snap = snapshot();
        let options = ReportOptions {
            suppliers: vec!["selgros".into(), "metro".into()],
            only_differences: false,
            sort_by_savings: true,
        };
        let report = grouped_report(&snap, &options);
        assert_eq!(report.len(), 2);

        let selgros = &report[1];
        assert_eq!(selgros.supplier, SupplierId::from("selgros"));
        let savings: Vec<f64> = selgros.lines.iter().map(|l| l.saving).collect();
        assert_eq!(savings, vec![2.0, 1.0]);

        let metro = &report[0];
        assert_eq!(metro.lines.len(), 3);
        assert!(metro.lines.iter().any(|l| l.product == "Gurke"));
    }

    #[test]
    fn test_selection_changes_the_maximum() {
        let snap = snapshot();
        let options = ReportOptions {
            suppliers: vec!["selgros".into(), "aldi".into()],
            ..ReportOptions::default()
        };
        let report = grouped_report(&snap, &options);
        let selgros = report.iter().find(|g| g.supplier.as_str() == "selgros").unwrap();
        assert_eq!(selgros.lines.len(), 1);
        assert_eq!(selgros.lines[0].saving, 1.0);
    }

    #[test]
    fn test_matrix_report() {
        let snap = snapshot();
        let matrix = matrix_report(&snap, &ReportOptions::default());
        assert_eq!(matrix.suppliers.len(), 3);
        let names: Vec<&str> = matrix.rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Basilikum", "Tomaten"]);
        assert_eq!(matrix.rows[1].minimum, Some(10.0));
        assert!(matrix.rows[1].prices[1].best);
    }

    #[test]
    fn test_matrix_report_keeps_unpriced_products() {
        let mut snap = snapshot();
        snap.catalog.ensure("Zucchini");
        let options = ReportOptions {
            only_differences: false,
            ..ReportOptions::default()
        };

        let matrix = matrix_report(&snap, &options);
        assert_eq!(matrix.rows.len(), snap.catalog.len());
        let zucchini = matrix.rows.iter().find(|r| r.name == "Zucchini").unwrap();
        assert_eq!(zucchini.minimum, None);
        assert!(zucchini.prices.iter().all(|p| p.price.is_none() && !p.best));

        // grouped lines still need a price of their own
        let report = grouped_report(&snap, &options);
        assert!(report.iter().flat_map(|g| &g.lines).all(|l| l.product != "Zucchini"));
    }
}
