// src/catalog.rs

use crate::model::MasterProduct;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The master catalog: canonical products, unique by exact name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<MasterProduct>", into = "Vec<MasterProduct>")]
pub struct MasterCatalog {
    products: BTreeMap<String, MasterProduct>,
}

impl MasterCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.products.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&MasterProduct> {
        self.products.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MasterProduct> {
        self.products.values()
    }

    /// Add `name` with favorite = false unless it already exists.
    /// Returns true if a record was created.
    pub fn ensure(&mut self, name: &str) -> bool {
        if self.products.contains_key(name) {
            return false;
        }
        self.products
            .insert(name.to_string(), MasterProduct::new(name));
        true
    }

    pub fn remove(&mut self, name: &str) -> Option<MasterProduct> {
        self.products.remove(name)
    }

    /// Flip the favorite flag. Returns the new value, or `None` if unknown.
    pub fn toggle_favorite(&mut self, name: &str) -> Option<bool> {
        let product = self.products.get_mut(name)?;
        product.is_favorite = !product.is_favorite;
        Some(product.is_favorite)
    }

    pub fn set_favorite(&mut self, name: &str, favorite: bool) -> bool {
        match self.products.get_mut(name) {
            Some(product) => {
                product.is_favorite = favorite;
                true
            }
            None => false,
        }
    }
}

impl TryFrom<Vec<MasterProduct>> for MasterCatalog {
    type Error = String;

    fn try_from(list: Vec<MasterProduct>) -> Result<Self, Self::Error> {
        let mut products = BTreeMap::new();
        for product in list {
            if product.name.is_empty() {
                return Err("master product with empty name".to_string());
            }
            let name = product.name.clone();
            if products.insert(name.clone(), product).is_some() {
                return Err(format!("duplicate master product '{name}'"));
            }
        }
        Ok(Self { products })
    }
}

impl From<MasterCatalog> for Vec<MasterProduct> {
    fn from(catalog: MasterCatalog) -> Self {
        catalog.products.into_values().collect()
    }
}
