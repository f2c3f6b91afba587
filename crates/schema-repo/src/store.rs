// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Persistent store abstraction
//!
//! Defines the storage port behind the repository. Backends hold three record
//! kinds: subjects (`topic`), deduplicated schema rows (`schema_entry`) and the
//! ordered subject/schema links (`topic_schema_map`).

use crate::error::StoreError;

/// Row id of a subject record.
pub type SubjectId = i64;

/// Row id of a schema record.
pub type SchemaId = i64;

/// A schema row as held by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSchema {
    pub id: SchemaId,
    /// Hash column exactly as stored (case not normalized).
    pub hash: String,
    pub text: String,
}

/// Outcome of one atomic registration unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRegistration {
    pub subject: SubjectId,
    pub schema: StoredSchema,
}

/// A subject with its linked schemas in link insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSubject {
    pub id: SubjectId,
    pub name: String,
    /// Schema written by the most recent `register`, if any.
    pub latest: Option<SchemaId>,
    pub schemas: Vec<StoredSchema>,
}

impl StoredSubject {
    /// The recorded latest schema must be one of the linked schemas.
    pub(crate) fn check_latest(&self) -> Result<(), StoreError> {
        match self.latest {
            Some(latest) if !self.schemas.iter().any(|s| s.id == latest) => {
                Err(StoreError::Dangling(format!(
                    "subject '{}' records latest schema {} which is not linked to it",
                    self.name, latest
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Storage port for the schema repository.
///
/// Every write runs in a transaction strong enough that concurrent calls with
/// identical keys, from this or another process, never create duplicate rows.
///
/// # Implementations
///
/// - `SqliteStore` -- Default, file or in-memory
/// - `MemoryStore` -- In-process, for tests and embedding
pub trait SchemaStore: Send + Sync {
    /// Return the id of the subject row named `name`, inserting it if absent.
    fn get_or_create_subject(&self, name: &str) -> Result<SubjectId, StoreError>;

    /// Return the schema row keyed by `hash`, inserting `text` if absent.
    ///
    /// An existing row is returned untouched. Callers must verify that the
    /// returned row really matches `hash` and `text`.
    fn get_or_create_schema(&self, hash: &str, text: &str) -> Result<StoredSchema, StoreError>;

    /// Link a schema to a subject. Repeated calls are no-ops.
    fn ensure_link(&self, subject: SubjectId, schema: SchemaId) -> Result<(), StoreError>;

    /// Subject, schema and link writes as one atomic unit of work.
    ///
    /// Either all three are visible afterwards or none is. The schema is
    /// recorded as the subject's latest in the same unit of work. If the row
    /// stored under `hash` holds text other than `text`, nothing is written
    /// and [`StoreError::Conflict`] is returned.
    fn register(&self, subject: &str, hash: &str, text: &str)
        -> Result<StoredRegistration, StoreError>;

    /// Load every subject with its schemas ordered by link insertion and its
    /// recorded latest schema.
    fn load_all(&self) -> Result<Vec<StoredSubject>, StoreError>;

    /// Number of subject rows.
    fn subject_count(&self) -> Result<usize, StoreError>;

    /// Number of schema rows.
    fn schema_count(&self) -> Result<usize, StoreError>;

    /// Number of subject/schema links.
    fn link_count(&self) -> Result<usize, StoreError>;
}
