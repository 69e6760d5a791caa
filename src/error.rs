// src/error.rs

use crate::mapping::Ambiguity;
use crate::model::SupplierId;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong while extracting, reconciling or persisting.
///
/// None of these are fatal: the caller reports the message and the user may
/// retry. Writes that fail leave the stored collections untouched.
#[derive(Debug, Error)]
pub enum Error {
    /// Document unreadable, unsupported, or the extractor returned garbage.
    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("extraction request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("persistence failed: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("stored collection '{collection}' is malformed: {source}")]
    MalformedDocument {
        collection: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Another writer committed since our snapshot was taken.
    #[error(
        "write conflict on '{collection}': expected version {expected}, found {found} (refresh and retry)"
    )]
    Conflict {
        collection: &'static str,
        expected: u64,
        found: u64,
    },

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("unknown supplier: {0}")]
    UnknownSupplier(SupplierId),

    #[error("ambiguous mapping: {0}")]
    AmbiguousMapping(Ambiguity),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub(crate) fn extraction(msg: impl Into<String>) -> Self {
        Self::Extraction(msg.into())
    }
}
