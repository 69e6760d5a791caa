// src/state.rs

//! Application state: one snapshot of the four collections, owned by a
//! single [`Coordinator`].
//!
//! Every mutation clones the current snapshot, edits the clone, commits the
//! collections it touched in one transaction and only then publishes the
//! clone. Readers hold an `Arc<Snapshot>` and never see a half-applied edit.

use crate::catalog::MasterCatalog;
use crate::config::ReconcileSettings;
use crate::document_db::{DocumentStore, DocumentWrite};
use crate::error::{Error, Result};
use crate::manual::{self, ManualEntry, ManualOutcome};
use crate::mapping::MappingStore;
use crate::merge::{self, MergeOutcome};
use crate::model::{Supplier, SupplierId};
use crate::prices::PriceTable;
use crate::reconcile::{self, ReconcileOutcome, ReviewedItem};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{info, info_span};

/// The named collections kept per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Collection {
    Suppliers,
    Prices,
    Mappings,
    MasterProducts,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Suppliers,
        Collection::Prices,
        Collection::Mappings,
        Collection::MasterProducts,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Collection::Suppliers => "suppliers",
            Collection::Prices => "prices",
            Collection::Mappings => "mappings",
            Collection::MasterProducts => "master_products",
        }
    }
}

/// Collections an operation modified.
pub type Changes = BTreeSet<Collection>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub suppliers: Vec<Supplier>,
    pub prices: PriceTable,
    pub mappings: MappingStore,
    pub catalog: MasterCatalog,
}

/// What a supplier deletion took with it.
#[derive(Debug, Clone, Serialize)]
pub struct SupplierRemoval {
    pub supplier: Supplier,
    pub prices_removed: usize,
    pub mappings_removed: usize,
}

impl Snapshot {
    pub fn supplier(&self, id: &SupplierId) -> Option<&Supplier> {
        self.suppliers.iter().find(|s| &s.id == id)
    }

    pub fn require_supplier(&self, id: &SupplierId) -> Result<&Supplier> {
        self.supplier(id)
            .ok_or_else(|| Error::UnknownSupplier(id.clone()))
    }

    pub fn supplier_ids(&self) -> Vec<SupplierId> {
        self.suppliers.iter().map(|s| s.id.clone()).collect()
    }

    pub fn add_supplier(&mut self, name: &str, id: SupplierId) -> Result<(Supplier, Changes)> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("supplier name must not be empty"));
        }
        if self.supplier(&id).is_some() {
            return Err(Error::validation(format!("supplier id '{id}' already exists")));
        }
        let supplier = Supplier {
            id,
            name: name.to_string(),
            last_update: None,
        };
        self.suppliers.push(supplier.clone());
        Ok((supplier, Changes::from([Collection::Suppliers])))
    }

    /// Remove a supplier with its prices and mappings. Master products stay.
    pub fn remove_supplier(&mut self, id: &SupplierId) -> Result<(SupplierRemoval, Changes)> {
        let pos = self
            .suppliers
            .iter()
            .position(|s| &s.id == id)
            .ok_or_else(|| Error::UnknownSupplier(id.clone()))?;
        let supplier = self.suppliers.remove(pos);
        let prices_removed = self.prices.clear_supplier(id);
        let mappings_removed = self.mappings.remove_supplier(id);

        let removal = SupplierRemoval {
            supplier,
            prices_removed,
            mappings_removed,
        };
        let changes = Changes::from([
            Collection::Suppliers,
            Collection::Prices,
            Collection::Mappings,
        ]);
        Ok((removal, changes))
    }

    pub fn toggle_favorite(&mut self, name: &str) -> Result<(bool, Changes)> {
        let favorite = self
            .catalog
            .toggle_favorite(name)
            .ok_or_else(|| Error::validation(format!("unknown master product '{name}'")))?;
        Ok((favorite, Changes::from([Collection::MasterProducts])))
    }

    fn encode(&self, collection: Collection) -> Result<String> {
        let encoded = match collection {
            Collection::Suppliers => serde_json::to_string(&self.suppliers),
            Collection::Prices => serde_json::to_string(&self.prices),
            Collection::Mappings => serde_json::to_string(&self.mappings),
            Collection::MasterProducts => serde_json::to_string(&self.catalog),
        };
        encoded.map_err(|source| Error::MalformedDocument {
            collection: collection.name(),
            source,
        })
    }

    /// Replace one collection with its stored JSON, validating the shape.
    fn decode(&mut self, collection: Collection, json: &str) -> Result<()> {
        let malformed = |source: serde_json::Error| Error::MalformedDocument {
            collection: collection.name(),
            source,
        };
        match collection {
            Collection::Suppliers => {
                let suppliers: Vec<Supplier> = serde_json::from_str(json).map_err(malformed)?;
                validate_suppliers(&suppliers).map_err(malformed)?;
                self.suppliers = suppliers;
            }
            Collection::Prices => self.prices = serde_json::from_str(json).map_err(malformed)?,
            Collection::Mappings => self.mappings = serde_json::from_str(json).map_err(malformed)?,
            Collection::MasterProducts => {
                self.catalog = serde_json::from_str(json).map_err(malformed)?
            }
        }
        Ok(())
    }

    fn reset(&mut self, collection: Collection) {
        match collection {
            Collection::Suppliers => self.suppliers.clear(),
            Collection::Prices => self.prices = PriceTable::default(),
            Collection::Mappings => self.mappings = MappingStore::default(),
            Collection::MasterProducts => self.catalog = MasterCatalog::default(),
        }
    }
}

fn validate_suppliers(suppliers: &[Supplier]) -> std::result::Result<(), serde_json::Error> {
    use serde::de::Error as _;

    let mut seen = HashSet::new();
    for supplier in suppliers {
        if supplier.name.trim().is_empty() {
            return Err(serde_json::Error::custom(format!(
                "supplier '{}' has an empty name",
                supplier.id
            )));
        }
        if !seen.insert(&supplier.id) {
            return Err(serde_json::Error::custom(format!(
                "duplicate supplier id '{}'",
                supplier.id
            )));
        }
    }
    Ok(())
}

/// Today's date as stored in `Supplier::last_update`.
pub fn today() -> String {
    OffsetDateTime::now_utc().date().to_string()
}

/// Owns the snapshot for one user and is the only way to change it.
pub struct Coordinator {
    db: DocumentStore,
    user: String,
    settings: ReconcileSettings,
    snapshot: Arc<Snapshot>,
    versions: BTreeMap<Collection, u64>,
    publisher: watch::Sender<Arc<Snapshot>>,
}

impl Coordinator {
    /// Load all collections of `user` from `db`.
    pub fn open(db: DocumentStore, user: &str, settings: ReconcileSettings) -> Result<Self> {
        let initial = Arc::new(Snapshot::default());
        let (publisher, _) = watch::channel(Arc::clone(&initial));
        let mut coordinator = Self {
            db,
            user: user.to_string(),
            settings,
            snapshot: initial,
            versions: Collection::ALL.iter().map(|c| (*c, 0)).collect(),
            publisher,
        };
        coordinator.refresh()?;
        info!(
            user = %coordinator.user,
            suppliers = coordinator.snapshot.suppliers.len(),
            master_products = coordinator.snapshot.catalog.len(),
            mappings = coordinator.snapshot.mappings.len(),
            prices = coordinator.snapshot.prices.len(),
            "Snapshot loaded"
        );
        Ok(coordinator)
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn settings(&self) -> &ReconcileSettings {
        &self.settings
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot)
    }

    /// Receiver that holds the current snapshot and sees every later one.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.publisher.subscribe()
    }

    /// Reload collections whose stored version moved since we last saw them.
    ///
    /// Returns true if a new snapshot was published.
    pub fn refresh(&mut self) -> Result<bool> {
        let mut next = (*self.snapshot).clone();
        let mut seen = BTreeMap::new();

        for collection in Collection::ALL {
            let known = self.versions.get(&collection).copied().unwrap_or(0);
            match self.db.load(&self.user, collection.name())? {
                Some(doc) if doc.version != known => {
                    next.decode(collection, &doc.value)?;
                    seen.insert(collection, doc.version);
                }
                None if known != 0 => {
                    next.reset(collection);
                    seen.insert(collection, 0);
                }
                _ => {}
            }
        }

        if seen.is_empty() {
            return Ok(false);
        }
        self.versions.extend(seen);
        self.publish(next);
        Ok(true)
    }

    fn publish(&mut self, next: Snapshot) {
        let next = Arc::new(next);
        self.snapshot = Arc::clone(&next);
        self.publisher.send_replace(next);
    }

    /// Run `op` against a copy of the snapshot and commit what it touched.
    ///
    /// On any error the copy is dropped; neither the store nor readers see it.
    fn apply<T>(
        &mut self,
        label: &str,
        op: impl FnOnce(&mut Snapshot) -> Result<(T, Changes)>,
    ) -> Result<T> {
        let span = info_span!("apply", op = label, user = %self.user);
        let _guard = span.enter();

        let mut next = (*self.snapshot).clone();
        let (value, changes) = op(&mut next)?;
        if changes.is_empty() {
            info!("Nothing to write");
            return Ok(value);
        }

        let writes = changes
            .iter()
            .map(|collection| {
                Ok(DocumentWrite {
                    collection: collection.name(),
                    value: next.encode(*collection)?,
                    base_version: self.versions.get(collection).copied().unwrap_or(0),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let versions = self.db.commit(&self.user, &writes)?;
        for (collection, version) in changes.iter().zip(versions) {
            self.versions.insert(*collection, version);
        }
        self.publish(next);
        Ok(value)
    }

    pub fn add_supplier(&mut self, name: &str) -> Result<Supplier> {
        let id = SupplierId::generate(name.trim(), OffsetDateTime::now_utc().unix_timestamp_nanos());
        self.apply("add_supplier", |s| s.add_supplier(name, id))
    }

    pub fn delete_supplier(&mut self, id: &SupplierId) -> Result<SupplierRemoval> {
        self.apply("delete_supplier", |s| s.remove_supplier(id))
    }

    pub fn toggle_favorite(&mut self, name: &str) -> Result<bool> {
        self.apply("toggle_favorite", |s| s.toggle_favorite(name))
    }

    /// Apply a reviewed upload for `supplier`.
    pub fn reconcile(
        &mut self,
        supplier: &SupplierId,
        items: &[ReviewedItem],
    ) -> Result<ReconcileOutcome> {
        let settings = self.settings;
        let today = today();
        self.apply("reconcile", |s| {
            reconcile::apply_batch(s, supplier, items, &settings, &today)
        })
    }

    pub fn add_manual(&mut self, entry: &ManualEntry) -> Result<ManualOutcome> {
        let settings = self.settings;
        self.apply("add_manual", |s| manual::add_manual(s, entry, &settings))
    }

    pub fn merge(&mut self, names: &BTreeSet<String>, target: &str) -> Result<MergeOutcome> {
        self.apply("merge", |s| merge::merge(s, names, target))
    }
}
