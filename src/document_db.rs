// src/document_db.rs

use crate::error::{Error, Result};
use rusqlite::{Connection, OptionalExtension, Result as SqliteResult, params};
use std::path::Path;
use tracing::{debug, info};

/// Per-user JSON documents in SQLite, one row per named collection.
///
/// Every row carries a version token. Writes name the version they were
/// based on and are rejected when somebody else got there first.
pub struct DocumentStore {
    conn: Connection,
}

#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub collection: String,
    pub value: String,
    pub version: u64,
}

/// One whole-document replacement inside a commit.
#[derive(Debug, Clone)]
pub struct DocumentWrite {
    pub collection: &'static str,
    pub value: String,
    /// Version the new value was derived from; 0 for a document never written.
    pub base_version: u64,
}

impl DocumentStore {
    /// Open (or create) the document store at `db_path`
    pub fn new<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        let conn = Connection::open(db_path)?;
        Self::init(conn)
    }

    /// Throwaway store, used by tests and dry runs.
    pub fn open_in_memory() -> SqliteResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> SqliteResult<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                user TEXT NOT NULL,
                collection TEXT NOT NULL,
                value TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 0,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (user, collection)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_documents_user ON documents(user)",
            [],
        )?;

        info!("Document store initialized");
        Ok(Self { conn })
    }

    /// Load one collection document, `None` if it was never written.
    pub fn load(&self, user: &str, collection: &str) -> SqliteResult<Option<StoredDocument>> {
        self.conn
            .query_row(
                "SELECT collection, value, version FROM documents
                 WHERE user = ?1 AND collection = ?2",
                params![user, collection],
                Self::row_to_document,
            )
            .optional()
    }

    /// Current version of one collection; 0 if it does not exist yet.
    pub fn version(&self, user: &str, collection: &str) -> SqliteResult<u64> {
        Self::current_version(&self.conn, user, collection)
    }

    fn current_version(conn: &Connection, user: &str, collection: &str) -> SqliteResult<u64> {
        let version: Option<i64> = conn
            .query_row(
                "SELECT version FROM documents WHERE user = ?1 AND collection = ?2",
                params![user, collection],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version.map_or(0, |v| v as u64))
    }

    /// Apply all `writes` in one transaction.
    ///
    /// Either every document is replaced and its version bumped, or nothing
    /// changes. Returns the new versions in the order of `writes`.
    pub fn commit(&mut self, user: &str, writes: &[DocumentWrite]) -> Result<Vec<u64>> {
        let tx = self.conn.transaction()?;
        let mut versions = Vec::with_capacity(writes.len());

        for write in writes {
            let found = Self::current_version(&tx, user, write.collection)?;
            if found != write.base_version {
                // dropping `tx` rolls back the writes made so far
                return Err(Error::Conflict {
                    collection: write.collection,
                    expected: write.base_version,
                    found,
                });
            }

            let next = found + 1;
            tx.execute(
                "INSERT INTO documents (user, collection, value, version)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user, collection) DO UPDATE SET
                    value = excluded.value,
                    version = excluded.version,
                    updated_at = CURRENT_TIMESTAMP",
                params![user, write.collection, write.value, next as i64],
            )?;
            debug!(user = %user, collection = write.collection, version = next, "Document staged");
            versions.push(next);
        }

        tx.commit()?;
        info!(
            user = %user,
            collections = ?writes.iter().map(|w| w.collection).collect::<Vec<_>>(),
            "Documents committed"
        );
        Ok(versions)
    }

    /// (collection, version, bytes) for every document of `user`.
    pub fn get_counts(&self, user: &str) -> SqliteResult<Vec<(String, u64, usize)>> {
        let mut stmt = self.conn.prepare(
            "SELECT collection, version, LENGTH(value) FROM documents
             WHERE user = ?1
             ORDER BY collection",
        )?;
        let rows = stmt.query_map(params![user], |row| {
            let version: i64 = row.get(1)?;
            let bytes: i64 = row.get(2)?;
            Ok((row.get(0)?, version as u64, bytes as usize))
        })?;
        rows.collect()
    }

    fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredDocument> {
        let version: i64 = row.get(2)?;
        Ok(StoredDocument {
            collection: row.get(0)?,
            value: row.get(1)?,
            version: version as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(collection: &'static str, value: &str, base_version: u64) -> DocumentWrite {
        DocumentWrite {
            collection,
            value: value.to_string(),
            base_version,
        }
    }

    #[test]
    fn test_missing_document_is_version_zero() {
        let store = DocumentStore::open_in_memory().unwrap();
        assert!(store.load("u1", "prices").unwrap().is_none());
        assert_eq!(store.version("u1", "prices").unwrap(), 0);
    }

    #[test]
    fn test_commit_bumps_versions() {
        let mut store = DocumentStore::open_in_memory().unwrap();
        let v = store
            .commit("u1", &[write("prices", "{}", 0), write("mappings", "[]", 0)])
            .unwrap();
        assert_eq!(v, vec![1, 1]);

        let v = store.commit("u1", &[write("prices", r#"{"a":{}}"#, 1)]).unwrap();
        assert_eq!(v, vec![2]);

        let doc = store.load("u1", "prices").unwrap().unwrap();
        assert_eq!(doc.value, r#"{"a":{}}"#);
        assert_eq!(doc.version, 2);
    }

    #[test]
    fn test_stale_write_rolls_back_whole_batch() {
        let mut store = DocumentStore::open_in_memory().unwrap();
        store.commit("u1", &[write("prices", "{}", 0)]).unwrap();

        let err = store
            .commit("u1", &[write("mappings", "[]", 0), write("prices", "{}", 0)])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Conflict { collection: "prices", expected: 0, found: 1 }
        ));

        // the mappings write before the conflict must not survive
        assert!(store.load("u1", "mappings").unwrap().is_none());
    }

    #[test]
    fn test_users_are_isolated() {
        let mut store = DocumentStore::open_in_memory().unwrap();
        store.commit("u1", &[write("suppliers", "[]", 0)]).unwrap();
        assert!(store.load("u2", "suppliers").unwrap().is_none());
        assert_eq!(store.get_counts("u1").unwrap(), vec![("suppliers".to_string(), 1, 2)]);
    }
}
