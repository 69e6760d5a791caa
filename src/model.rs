// src/model.rs

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Stable supplier identifier. Generated once when the supplier is added.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupplierId(String);

impl SupplierId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive an id from the display name and the creation instant.
    ///
    /// Twelve hex chars of a SHA-256 digest; two suppliers with the same name
    /// created at different instants get different ids.
    pub fn generate(name: &str, created_at_nanos: i128) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(name.as_bytes());
        hasher.update(created_at_nanos.to_le_bytes());
        let digest = format!("{:x}", hasher.finalize());
        Self(digest[..12].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SupplierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SupplierId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supplier {
    pub id: SupplierId,
    pub name: String,
    /// Date of the last applied price list, `YYYY-MM-DD`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,
}

/// A canonical product as shown in the comparison table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterProduct {
    pub name: String,
    #[serde(default)]
    pub is_favorite: bool,
}

impl MasterProduct {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_favorite: false,
        }
    }
}

/// One (product, price) pair as returned by the extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceEntry {
    pub product: String,
    pub price: f64,
}

impl PriceEntry {
    pub fn new(product: impl Into<String>, price: f64) -> Self {
        Self {
            product: product.into(),
            price,
        }
    }
}

/// Composite key of the mapping store and the price table.
///
/// Ordered by supplier first so all entries of one supplier are contiguous.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MappingKey {
    pub supplier: SupplierId,
    pub local_name: String,
}

impl MappingKey {
    pub fn new(supplier: SupplierId, local_name: impl Into<String>) -> Self {
        Self {
            supplier,
            local_name: local_name.into(),
        }
    }
}

/// Prices must be finite and non-negative.
pub fn is_valid_price(price: f64) -> bool {
    price.is_finite() && price >= 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supplier_id_generation() {
        let a = SupplierId::generate("Metro", 1);
        let b = SupplierId::generate("Metro", 1);
        let c = SupplierId::generate("Metro", 2);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 12);
    }

    #[test]
    fn test_price_validation() {
        assert!(is_valid_price(0.0));
        assert!(is_valid_price(12.5));
        assert!(!is_valid_price(-0.01));
        assert!(!is_valid_price(f64::NAN));
        assert!(!is_valid_price(f64::INFINITY));
    }

    #[test]
    fn test_mapping_keys_group_by_supplier() {
        let a = MappingKey::new("a".into(), "zzz");
        let b = MappingKey::new("b".into(), "aaa");
        assert!(a < b);
    }
}
