// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-memory mirrors of the store.
//!
//! Caches are never authoritative: they are filled by the loader and updated
//! only after a store write succeeded.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::fingerprint::{Fingerprint, Fingerprinter};
use crate::subject::Subject;

// ---------------------------------------------------------------------------
// SchemaEntry
// ---------------------------------------------------------------------------

/// One registered schema text and its identity.
///
/// Equality compares id, hash and text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaEntry {
    id: String,
    hash: Fingerprint,
    schema: String,
}

impl SchemaEntry {
    pub fn new(id: impl Into<String>, hash: Fingerprint, schema: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            hash,
            schema: schema.into(),
        }
    }

    /// Store row id rendered as a decimal string.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn hash(&self) -> &Fingerprint {
        &self.hash
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }
}

// ---------------------------------------------------------------------------
// SchemaVersionCache
// ---------------------------------------------------------------------------

/// Per-subject schema history, indexed by hash and by id.
///
/// Both indexes point at the same `Arc`. Not synchronized: the owning
/// subject guards it.
#[derive(Debug, Default)]
pub struct SchemaVersionCache {
    by_hash: HashMap<Fingerprint, Arc<SchemaEntry>>,
    by_id: HashMap<String, Arc<SchemaEntry>>,
    ordered: Vec<Arc<SchemaEntry>>,
}

impl SchemaVersionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `entry` unless an entry with the same id is already cached.
    ///
    /// Returns the cached entry, which is the previously held one when the id
    /// was already present.
    pub fn add(&mut self, entry: SchemaEntry) -> Arc<SchemaEntry> {
        if let Some(existing) = self.by_id.get(entry.id()) {
            return Arc::clone(existing);
        }
        let entry = Arc::new(entry);
        self.by_hash.insert(entry.hash().clone(), Arc::clone(&entry));
        self.by_id.insert(entry.id().to_string(), Arc::clone(&entry));
        self.ordered.push(Arc::clone(&entry));
        entry
    }

    /// Find the entry holding exactly `schema`.
    pub fn lookup_by_schema(
        &self,
        schema: &str,
        fingerprinter: &dyn Fingerprinter,
    ) -> Option<Arc<SchemaEntry>> {
        let hash = fingerprinter.fingerprint_str(schema);
        self.by_hash
            .get(&hash)
            .filter(|entry| entry.schema() == schema)
            .cloned()
    }

    pub fn lookup_by_hash(&self, hash: &Fingerprint) -> Option<Arc<SchemaEntry>> {
        self.by_hash.get(hash).cloned()
    }

    pub fn lookup_by_id(&self, id: &str) -> Option<Arc<SchemaEntry>> {
        self.by_id.get(id).cloned()
    }

    /// Entries in registration order.
    pub fn values(&self) -> Vec<Arc<SchemaEntry>> {
        self.ordered.clone()
    }

    pub fn last(&self) -> Option<Arc<SchemaEntry>> {
        self.ordered.last().cloned()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

// ---------------------------------------------------------------------------
// SubjectCache
// ---------------------------------------------------------------------------

#[derive(Default)]
struct SubjectTable {
    by_name: HashMap<String, Arc<Subject>>,
    /// Insertion order, for deterministic enumeration.
    ordered: Vec<Arc<Subject>>,
}

/// Subjects by unique name.
///
/// The lock is held only for map access, never across store I/O.
#[derive(Default)]
pub struct SubjectCache {
    table: RwLock<SubjectTable>,
}

impl SubjectCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `subject`. Returns `false` and leaves the cache unchanged when
    /// the name is already taken.
    pub fn add(&self, subject: Arc<Subject>) -> bool {
        let mut table = self.table.write();
        if table.by_name.contains_key(subject.name()) {
            return false;
        }
        table
            .by_name
            .insert(subject.name().to_string(), Arc::clone(&subject));
        table.ordered.push(subject);
        true
    }

    /// Insert `subject` unless the name is taken; return whichever is cached.
    pub fn get_or_insert(&self, subject: Arc<Subject>) -> Arc<Subject> {
        let mut table = self.table.write();
        if let Some(existing) = table.by_name.get(subject.name()) {
            return Arc::clone(existing);
        }
        table
            .by_name
            .insert(subject.name().to_string(), Arc::clone(&subject));
        table.ordered.push(Arc::clone(&subject));
        subject
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<Subject>> {
        self.table.read().by_name.get(name).cloned()
    }

    /// Snapshot of all subjects in insertion order.
    pub fn values(&self) -> Vec<Arc<Subject>> {
        self.table.read().ordered.clone()
    }

    pub fn len(&self) -> usize {
        self.table.read().ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
