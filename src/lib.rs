// src/lib.rs

//! Supplier price comparison: upload price lists, map each supplier's product
//! names onto one master catalog and compare prices per product.

pub mod catalog;
pub mod compare;
pub mod config;
pub mod document_db;
pub mod error;
pub mod extract;
pub mod manual;
pub mod mapping;
pub mod merge;
pub mod model;
pub mod prices;
pub mod reconcile;
pub mod report;
pub mod state;

pub use error::{Error, Result};
pub use state::{Coordinator, Snapshot};
