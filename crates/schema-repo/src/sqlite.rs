// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SQLite persistence backend
//!
//! Default relational store for the schema repository.

use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::config::RepoConfig;
use crate::error::StoreError;
use crate::store::{
    SchemaId, SchemaStore, StoredRegistration, StoredSchema, StoredSubject, SubjectId,
};

/// Connection descriptor selecting a private in-memory database.
pub const IN_MEMORY: &str = ":memory:";

/// SQLite schema store
///
/// Thread-safe via internal Mutex (SQLite Connection is not Sync).
/// Write transactions are `IMMEDIATE`: the database writer lock is taken
/// before the first read, so two processes racing on the same subject name
/// or hash serialize instead of both inserting.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE topic (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     topic TEXT NOT NULL UNIQUE,
///     latest_schema_id INTEGER REFERENCES schema_entry(id)
/// );
/// CREATE TABLE schema_entry (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     schema_text TEXT NOT NULL,
///     hash TEXT NOT NULL UNIQUE COLLATE NOCASE
/// );
/// CREATE TABLE topic_schema_map (
///     seq INTEGER PRIMARY KEY AUTOINCREMENT,
///     topic_id INTEGER NOT NULL REFERENCES topic(id),
///     schema_id INTEGER NOT NULL REFERENCES schema_entry(id),
///     UNIQUE(topic_id, schema_id)
/// );
/// ```
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Default wait for a writer lock held by another connection.
    pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

    /// Open a file-based database, or an in-memory one for [`IN_MEMORY`].
    pub fn open(descriptor: &str, busy_timeout: Duration) -> Result<Self, StoreError> {
        let conn = if descriptor == IN_MEMORY {
            Connection::open_in_memory()?
        } else {
            Connection::open(descriptor).map_err(|e| {
                StoreError::Unavailable(format!(
                    "failed to open SQLite database at {}: {}",
                    descriptor, e
                ))
            })?
        };
        conn.busy_timeout(busy_timeout)?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create a new SQLite store with a file-based database.
    pub fn new(path: &str) -> Result<Self, StoreError> {
        Self::open(path, Self::DEFAULT_BUSY_TIMEOUT)
    }

    /// Create an in-memory SQLite store (for testing).
    pub fn new_in_memory() -> Result<Self, StoreError> {
        Self::open(IN_MEMORY, Self::DEFAULT_BUSY_TIMEOUT)
    }

    /// Open the database named by the configuration.
    pub fn from_config(config: &RepoConfig) -> Result<Self, StoreError> {
        Self::open(&config.database, config.busy_timeout())
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        // Pragmas are ignored inside a transaction.
        self.conn.lock().execute_batch("PRAGMA foreign_keys = ON;")?;

        self.write(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS topic (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    topic TEXT NOT NULL UNIQUE,
                    latest_schema_id INTEGER REFERENCES schema_entry(id)
                );

                CREATE TABLE IF NOT EXISTS schema_entry (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    schema_text TEXT NOT NULL,
                    hash TEXT NOT NULL UNIQUE COLLATE NOCASE
                );

                CREATE TABLE IF NOT EXISTS topic_schema_map (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    topic_id INTEGER NOT NULL REFERENCES topic(id),
                    schema_id INTEGER NOT NULL REFERENCES schema_entry(id),
                    UNIQUE(topic_id, schema_id)
                );",
            )?;

            // Databases created before latest was tracked.
            if conn
                .prepare("SELECT latest_schema_id FROM topic LIMIT 0")
                .is_err()
            {
                conn.execute_batch(
                    "ALTER TABLE topic
                     ADD COLUMN latest_schema_id INTEGER REFERENCES schema_entry(id);",
                )?;
            }
            Ok(())
        })
    }

    /// Run `f` inside an `IMMEDIATE` transaction.
    ///
    /// The transaction rolls back when dropped on an error path.
    fn write<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    fn count(&self, table: &str) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        let count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })?;
        Ok(count as usize)
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> parking_lot::MutexGuard<'_, Connection> {
        self.conn.lock()
    }
}

fn subject_row(conn: &Connection, name: &str) -> Result<SubjectId, StoreError> {
    conn.execute("INSERT OR IGNORE INTO topic (topic) VALUES (?1)", [name])?;
    let id = conn.query_row("SELECT id FROM topic WHERE topic = ?1", [name], |row| {
        row.get(0)
    })?;
    Ok(id)
}

fn row_to_schema(row: &rusqlite::Row) -> rusqlite::Result<StoredSchema> {
    Ok(StoredSchema {
        id: row.get(0)?,
        hash: row.get(1)?,
        text: row.get(2)?,
    })
}

fn schema_row(conn: &Connection, hash: &str, text: &str) -> Result<StoredSchema, StoreError> {
    let existing = conn
        .query_row(
            "SELECT id, hash, schema_text FROM schema_entry WHERE hash = ?1",
            [hash],
            row_to_schema,
        )
        .optional()?;
    if let Some(schema) = existing {
        return Ok(schema);
    }

    conn.execute(
        "INSERT INTO schema_entry (schema_text, hash) VALUES (?1, ?2)",
        params![text, hash],
    )?;
    Ok(StoredSchema {
        id: conn.last_insert_rowid(),
        hash: hash.to_string(),
        text: text.to_string(),
    })
}

fn link_row(conn: &Connection, subject: SubjectId, schema: SchemaId) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR IGNORE INTO topic_schema_map (topic_id, schema_id) VALUES (?1, ?2)",
        params![subject, schema],
    )?;
    Ok(())
}

impl SchemaStore for SqliteStore {
    fn get_or_create_subject(&self, name: &str) -> Result<SubjectId, StoreError> {
        self.write(|conn| subject_row(conn, name))
    }

    fn get_or_create_schema(&self, hash: &str, text: &str) -> Result<StoredSchema, StoreError> {
        self.write(|conn| schema_row(conn, hash, text))
    }

    fn ensure_link(&self, subject: SubjectId, schema: SchemaId) -> Result<(), StoreError> {
        self.write(|conn| link_row(conn, subject, schema))
    }

    fn register(
        &self,
        subject: &str,
        hash: &str,
        text: &str,
    ) -> Result<StoredRegistration, StoreError> {
        self.write(|conn| {
            let subject = subject_row(conn, subject)?;
            let schema = schema_row(conn, hash, text)?;
            if schema.text != text {
                return Err(StoreError::Conflict {
                    id: schema.id,
                    stored_hash: schema.hash,
                });
            }
            link_row(conn, subject, schema.id)?;
            conn.execute(
                "UPDATE topic SET latest_schema_id = ?1 WHERE id = ?2",
                params![schema.id, subject],
            )?;
            Ok(StoredRegistration { subject, schema })
        })
    }

    fn load_all(&self) -> Result<Vec<StoredSubject>, StoreError> {
        let mut conn = self.conn.lock();
        // Deferred transaction: one read snapshot for the whole load.
        let tx = conn.transaction()?;

        let mut subjects = {
            let mut stmt =
                tx.prepare("SELECT id, topic, latest_schema_id FROM topic ORDER BY id ASC")?;
            let rows = stmt.query_map([], |row| {
                Ok(StoredSubject {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    latest: row.get(2)?,
                    schemas: Vec::new(),
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        {
            let mut stmt = tx.prepare(
                "SELECT s.id, s.hash, s.schema_text
                 FROM topic_schema_map m
                 JOIN schema_entry s ON s.id = m.schema_id
                 WHERE m.topic_id = ?1
                 ORDER BY m.seq ASC",
            )?;
            for subject in &mut subjects {
                subject.schemas = stmt
                    .query_map([subject.id], row_to_schema)?
                    .collect::<Result<Vec<_>, _>>()?;
                subject.check_latest()?;
            }
        }

        tx.commit()?;
        Ok(subjects)
    }

    fn subject_count(&self) -> Result<usize, StoreError> {
        self.count("topic")
    }

    fn schema_count(&self) -> Result<usize, StoreError> {
        self.count("schema_entry")
    }

    fn link_count(&self) -> Result<usize, StoreError> {
        self.count("topic_schema_map")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_subject_is_idempotent() {
        let store = SqliteStore::new_in_memory().unwrap();

        let a = store.get_or_create_subject("orders").unwrap();
        let b = store.get_or_create_subject("orders").unwrap();
        let c = store.get_or_create_subject("payments").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(store.subject_count().unwrap(), 2);
    }

    #[test]
    fn test_get_or_create_schema_returns_existing_row() {
        let store = SqliteStore::new_in_memory().unwrap();

        let first = store.get_or_create_schema("abc", "{}").unwrap();
        let again = store.get_or_create_schema("abc", "{}").unwrap();

        assert_eq!(first, again);
        assert_eq!(store.schema_count().unwrap(), 1);
    }

    #[test]
    fn test_hash_lookup_ignores_case() {
        let store = SqliteStore::new_in_memory().unwrap();

        let lower = store.get_or_create_schema("abcdef", "{}").unwrap();
        let upper = store.get_or_create_schema("ABCDEF", "{}").unwrap();

        assert_eq!(lower.id, upper.id);
        assert_eq!(upper.hash, "abcdef");
        assert_eq!(store.schema_count().unwrap(), 1);
    }

    #[test]
    fn test_existing_row_is_not_overwritten() {
        let store = SqliteStore::new_in_memory().unwrap();

        store.get_or_create_schema("h1", "original").unwrap();
        let other = store.get_or_create_schema("h1", "different").unwrap();

        assert_eq!(other.text, "original");
    }

    #[test]
    fn test_ensure_link_is_idempotent() {
        let store = SqliteStore::new_in_memory().unwrap();

        let subject = store.get_or_create_subject("orders").unwrap();
        let schema = store.get_or_create_schema("h1", "{}").unwrap();
        store.ensure_link(subject, schema.id).unwrap();
        store.ensure_link(subject, schema.id).unwrap();

        assert_eq!(store.link_count().unwrap(), 1);
    }

    #[test]
    fn test_register_writes_all_three_rows() {
        let store = SqliteStore::new_in_memory().unwrap();

        let reg = store.register("orders", "h1", "{}").unwrap();
        let again = store.register("orders", "h1", "{}").unwrap();

        assert_eq!(reg, again);
        assert_eq!(store.subject_count().unwrap(), 1);
        assert_eq!(store.schema_count().unwrap(), 1);
        assert_eq!(store.link_count().unwrap(), 1);
    }

    #[test]
    fn test_register_rolls_back_on_failure() {
        let store = SqliteStore::new_in_memory().unwrap();
        store
            .connection()
            .execute_batch(
                "CREATE TRIGGER reject_link BEFORE INSERT ON topic_schema_map
                 BEGIN SELECT RAISE(ABORT, 'link rejected'); END;",
            )
            .unwrap();

        let err = store.register("orders", "h1", "{}").unwrap_err();
        assert!(matches!(err, StoreError::Sqlite(_)));

        assert_eq!(store.subject_count().unwrap(), 0);
        assert_eq!(store.schema_count().unwrap(), 0);
        assert_eq!(store.link_count().unwrap(), 0);
    }

    #[test]
    fn test_register_conflict_rolls_back() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.get_or_create_schema("h1", "original").unwrap();

        let err = store.register("orders", "H1", "different").unwrap_err();
        assert!(matches!(err, StoreError::Conflict { ref stored_hash, .. } if stored_hash == "h1"));

        assert_eq!(store.subject_count().unwrap(), 0);
        assert_eq!(store.link_count().unwrap(), 0);
    }

    #[test]
    fn test_load_all_orders_by_link_insertion() {
        let store = SqliteStore::new_in_memory().unwrap();

        // "shared" gets the lowest schema id but is linked to "orders" last.
        store.register("audit", "h-shared", "shared").unwrap();
        store.register("orders", "h-a", "a").unwrap();
        store.register("orders", "h-b", "b").unwrap();
        store.register("orders", "h-shared", "shared").unwrap();

        let subjects = store.load_all().unwrap();
        assert_eq!(subjects.len(), 2);

        let orders = subjects.iter().find(|s| s.name == "orders").unwrap();
        let texts: Vec<&str> = orders.schemas.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "shared"]);

        let audit = subjects.iter().find(|s| s.name == "audit").unwrap();
        assert_eq!(audit.schemas.len(), 1);
        assert_eq!(audit.schemas[0].id, orders.schemas[2].id);
    }

    #[test]
    fn test_register_records_latest() {
        let store = SqliteStore::new_in_memory().unwrap();

        let a = store.register("orders", "h-a", "a").unwrap();
        store.register("orders", "h-b", "b").unwrap();
        // Re-registering an older schema moves latest back without a new link.
        store.register("orders", "h-a", "a").unwrap();

        let subjects = store.load_all().unwrap();
        let orders = &subjects[0];
        assert_eq!(orders.latest, Some(a.schema.id));
        let texts: Vec<&str> = orders.schemas.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b"]);
        assert_eq!(store.link_count().unwrap(), 2);
    }

    #[test]
    fn test_unlinked_latest_fails_load() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.register("orders", "h-a", "a").unwrap();
        let other = store.get_or_create_schema("h-b", "b").unwrap();
        store
            .connection()
            .execute(
                "UPDATE topic SET latest_schema_id = ?1",
                params![other.id],
            )
            .unwrap();

        let err = store.load_all().unwrap_err();
        assert!(matches!(err, StoreError::Dangling(_)));
    }

    #[test]
    fn test_database_without_latest_column_is_upgraded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.db");
        let path = path.to_str().unwrap();
        {
            let conn = Connection::open(path).unwrap();
            conn.execute_batch(
                "CREATE TABLE topic (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    topic TEXT NOT NULL UNIQUE
                );
                CREATE TABLE schema_entry (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    schema_text TEXT NOT NULL,
                    hash TEXT NOT NULL UNIQUE COLLATE NOCASE
                );
                CREATE TABLE topic_schema_map (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    topic_id INTEGER NOT NULL REFERENCES topic(id),
                    schema_id INTEGER NOT NULL REFERENCES schema_entry(id),
                    UNIQUE(topic_id, schema_id)
                );
                INSERT INTO topic (topic) VALUES ('orders');
                INSERT INTO schema_entry (schema_text, hash) VALUES ('a', 'h-a');
                INSERT INTO topic_schema_map (topic_id, schema_id) VALUES (1, 1);",
            )
            .unwrap();
        }

        let store = SqliteStore::new(path).unwrap();
        let loaded = store.load_all().unwrap();
        assert_eq!(loaded[0].latest, None);
        assert_eq!(loaded[0].schemas.len(), 1);

        let b = store.register("orders", "h-b", "b").unwrap();
        assert_eq!(store.load_all().unwrap()[0].latest, Some(b.schema.id));
    }

    #[test]
    fn test_subject_without_schemas_is_loaded() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.get_or_create_subject("empty").unwrap();

        let subjects = store.load_all().unwrap();
        assert_eq!(subjects.len(), 1);
        assert!(subjects[0].schemas.is_empty());
    }

    #[test]
    fn test_file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repo.db");
        let path = path.to_str().unwrap();

        {
            let store = SqliteStore::new(path).unwrap();
            store.register("orders", "h1", "{}").unwrap();
        }

        let store = SqliteStore::new(path).unwrap();
        assert_eq!(store.schema_count().unwrap(), 1);
        assert_eq!(store.load_all().unwrap()[0].name, "orders");
    }
}
