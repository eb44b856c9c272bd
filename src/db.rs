use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use uuid::Uuid;

use crate::document::{merge_documents, Document};
use crate::error::StoreError;

const AUTO_ID_LEN: usize = 20;
const AUTO_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// The only thing the injector writes to.
pub trait DocumentStore {
    /// Replace the document, or merge into it when `merge` is set.
    fn write(
        &mut self,
        collection: &[String],
        id: &str,
        data: &Document,
        merge: bool,
    ) -> Result<(), StoreError>;

    fn exists(&self, collection: &[String], id: &str) -> Result<bool, StoreError>;

    /// A fresh id for a document in `collection`.
    fn new_document_id(&mut self, collection: &[String]) -> Result<String, StoreError> {
        loop {
            let id = auto_id();
            if !self.exists(collection, &id)? {
                return Ok(id);
            }
        }
    }
}

/// 20 alphanumeric characters, the shape of a Firestore auto id.
pub fn auto_id() -> String {
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    a.as_bytes()
        .iter()
        .chain(b.as_bytes().iter())
        .take(AUTO_ID_LEN)
        .map(|byte| AUTO_ID_ALPHABET[*byte as usize % AUTO_ID_ALPHABET.len()] as char)
        .collect()
}

fn collection_key(collection: &[String]) -> Result<String, StoreError> {
    if collection.is_empty() || collection.iter().any(|s| s.is_empty() || s.contains('/')) {
        return Err(StoreError::InvalidPath(collection.join("/")));
    }
    Ok(collection.join("/"))
}

fn check_id(id: &str) -> Result<(), StoreError> {
    if id.is_empty() || id.contains('/') {
        return Err(StoreError::InvalidPath(id.to_string()));
    }
    Ok(())
}

// ── SQLite ──

/// Local document store: one row per (collection path, document id),
/// document body as JSON text.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {:?}", dir))?;
        }
        let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        init_schema(&conn)?;
        Ok(SqliteStore { conn })
    }

    /// Open an existing store without changing it: no journal mode switch,
    /// no schema creation. Writes fail with `StoreError::Backend`.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .with_context(|| format!("Failed to open {:?} read-only", path))?;
        Ok(SqliteStore { conn })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(SqliteStore { conn })
    }

    #[allow(dead_code)]
    pub fn fetch(&self, collection: &[String], id: &str) -> Result<Option<Document>, StoreError> {
        let key = collection_key(collection)?;
        let text: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM documents WHERE collection_path = ?1 AND document_id = ?2",
                rusqlite::params![key, id],
                |row| row.get(0),
            )
            .optional()?;
        match text {
            Some(t) => Ok(Some(serde_json::from_str(&t)?)),
            None => Ok(None),
        }
    }

    #[allow(dead_code)]
    pub fn count(&self) -> Result<usize, StoreError> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM documents", [], |r| r.get(0))?)
    }
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS documents (
            collection_path TEXT NOT NULL,
            document_id     TEXT NOT NULL,
            data            TEXT NOT NULL,
            updated_at      TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (collection_path, document_id)
        );
        CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection_path);
        ",
    )?;
    Ok(())
}

impl DocumentStore for SqliteStore {
    fn write(
        &mut self,
        collection: &[String],
        id: &str,
        data: &Document,
        merge: bool,
    ) -> Result<(), StoreError> {
        let key = collection_key(collection)?;
        check_id(id)?;

        let tx = self.conn.unchecked_transaction()?;
        let body = if merge {
            let existing: Option<String> = tx
                .query_row(
                    "SELECT data FROM documents WHERE collection_path = ?1 AND document_id = ?2",
                    rusqlite::params![key, id],
                    |row| row.get(0),
                )
                .optional()?;
            let mut doc: Document = match existing {
                Some(t) => serde_json::from_str(&t)?,
                None => Document::new(),
            };
            merge_documents(&mut doc, data);
            serde_json::to_string(&doc)?
        } else {
            serde_json::to_string(data)?
        };
        tx.execute(
            "INSERT OR REPLACE INTO documents (collection_path, document_id, data, updated_at)
             VALUES (?1, ?2, ?3, datetime('now'))",
            rusqlite::params![key, id, body],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn exists(&self, collection: &[String], id: &str) -> Result<bool, StoreError> {
        let key = collection_key(collection)?;
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection_path = ?1 AND document_id = ?2",
            rusqlite::params![key, id],
            |r| r.get(0),
        )?;
        Ok(n > 0)
    }
}

// ── In memory ──

/// Process-local store; also stands in for the real one during dry runs
/// when no database exists yet.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: BTreeMap<(String, String), Document>,
    writes: usize,
}

#[allow(dead_code)]
impl MemoryStore {
    pub fn get(&self, collection: &str, id: &str) -> Option<&Document> {
        self.docs.get(&(collection.to_string(), id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Number of write calls accepted, including overwrites.
    pub fn write_count(&self) -> usize {
        self.writes
    }

    pub fn ids_in(&self, collection: &str) -> Vec<String> {
        self.docs
            .keys()
            .filter(|(c, _)| c == collection)
            .map(|(_, id)| id.clone())
            .collect()
    }
}

impl DocumentStore for MemoryStore {
    fn write(
        &mut self,
        collection: &[String],
        id: &str,
        data: &Document,
        merge: bool,
    ) -> Result<(), StoreError> {
        let key = (collection_key(collection)?, id.to_string());
        check_id(id)?;
        self.writes += 1;
        if merge {
            if let Some(existing) = self.docs.get_mut(&key) {
                merge_documents(existing, data);
                return Ok(());
            }
        }
        self.docs.insert(key, data.clone());
        Ok(())
    }

    fn exists(&self, collection: &[String], id: &str) -> Result<bool, StoreError> {
        Ok(self
            .docs
            .contains_key(&(collection_key(collection)?, id.to_string())))
    }
}
