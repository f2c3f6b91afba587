// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process schema store.
//!
//! Same semantics as `SqliteStore` with every operation applied under one
//! lock. Used by tests and by embedders that do not need durability. Raw
//! rows can be seeded and write failures injected to exercise error paths.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::error::StoreError;
use crate::store::{
    SchemaId, SchemaStore, StoredRegistration, StoredSchema, StoredSubject, SubjectId,
};

#[derive(Default)]
struct Tables {
    subjects: Vec<(SubjectId, String)>,
    subject_ids: HashMap<String, SubjectId>,
    schemas: HashMap<SchemaId, StoredSchema>,
    /// Lowercased hash -> schema id.
    by_hash: HashMap<String, SchemaId>,
    /// Links in insertion order.
    links: Vec<(SubjectId, SchemaId)>,
    link_set: HashSet<(SubjectId, SchemaId)>,
    /// Schema written by the most recent `register` per subject.
    latest: HashMap<SubjectId, SchemaId>,
    next_subject: SubjectId,
    next_schema: SchemaId,
    fail_next: Option<String>,
}

impl Tables {
    fn check_available(&mut self) -> Result<(), StoreError> {
        match self.fail_next.take() {
            Some(reason) => Err(StoreError::Unavailable(reason)),
            None => Ok(()),
        }
    }

    fn subject(&mut self, name: &str) -> SubjectId {
        if let Some(id) = self.subject_ids.get(name) {
            return *id;
        }
        self.next_subject += 1;
        let id = self.next_subject;
        self.subjects.push((id, name.to_string()));
        self.subject_ids.insert(name.to_string(), id);
        id
    }

    fn existing_schema(&self, hash: &str) -> Option<&StoredSchema> {
        self.by_hash
            .get(&hash.to_ascii_lowercase())
            .and_then(|id| self.schemas.get(id))
    }

    fn schema(&mut self, hash: &str, text: &str) -> StoredSchema {
        if let Some(existing) = self.existing_schema(hash) {
            return existing.clone();
        }
        self.next_schema += 1;
        let schema = StoredSchema {
            id: self.next_schema,
            hash: hash.to_string(),
            text: text.to_string(),
        };
        self.by_hash.insert(hash.to_ascii_lowercase(), schema.id);
        self.schemas.insert(schema.id, schema.clone());
        schema
    }

    fn link(&mut self, subject: SubjectId, schema: SchemaId) {
        if self.link_set.insert((subject, schema)) {
            self.links.push((subject, schema));
        }
    }
}

/// In-memory [`SchemaStore`].
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a raw schema row without any hash check.
    ///
    /// Lets tests plant rows whose hash does not match their text.
    pub fn seed_schema(&self, hash: &str, text: &str) -> SchemaId {
        self.tables.lock().schema(hash, text).id
    }

    /// Link a raw row to a subject, creating the subject if needed.
    ///
    /// The schema id is not checked, so dangling links can be planted.
    pub fn seed_link(&self, subject: &str, schema: SchemaId) {
        let mut tables = self.tables.lock();
        let subject = tables.subject(subject);
        tables.link(subject, schema);
    }

    /// Make the next store call fail with [`StoreError::Unavailable`].
    pub fn fail_next_write(&self, reason: impl Into<String>) {
        self.tables.lock().fail_next = Some(reason.into());
    }
}

impl SchemaStore for MemoryStore {
    fn get_or_create_subject(&self, name: &str) -> Result<SubjectId, StoreError> {
        let mut tables = self.tables.lock();
        tables.check_available()?;
        Ok(tables.subject(name))
    }

    fn get_or_create_schema(&self, hash: &str, text: &str) -> Result<StoredSchema, StoreError> {
        let mut tables = self.tables.lock();
        tables.check_available()?;
        Ok(tables.schema(hash, text))
    }

    fn ensure_link(&self, subject: SubjectId, schema: SchemaId) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        tables.check_available()?;
        if !tables.schemas.contains_key(&schema)
            || !tables.subjects.iter().any(|(id, _)| *id == subject)
        {
            return Err(StoreError::Unavailable(format!(
                "link references missing rows ({}, {})",
                subject, schema
            )));
        }
        tables.link(subject, schema);
        Ok(())
    }

    fn register(
        &self,
        subject: &str,
        hash: &str,
        text: &str,
    ) -> Result<StoredRegistration, StoreError> {
        let mut tables = self.tables.lock();
        tables.check_available()?;
        if let Some(existing) = tables.existing_schema(hash) {
            if existing.text != text {
                return Err(StoreError::Conflict {
                    id: existing.id,
                    stored_hash: existing.hash.clone(),
                });
            }
        }
        let subject = tables.subject(subject);
        let schema = tables.schema(hash, text);
        tables.link(subject, schema.id);
        tables.latest.insert(subject, schema.id);
        Ok(StoredRegistration { subject, schema })
    }

    fn load_all(&self) -> Result<Vec<StoredSubject>, StoreError> {
        let mut tables = self.tables.lock();
        tables.check_available()?;

        let mut subjects = Vec::with_capacity(tables.subjects.len());
        for (id, name) in &tables.subjects {
            let schemas = tables
                .links
                .iter()
                .filter(|(subject, _)| subject == id)
                .map(|(_, schema)| {
                    tables.schemas.get(schema).cloned().ok_or_else(|| {
                        StoreError::Dangling(format!(
                            "link ({}, {}) references a missing schema row",
                            id, schema
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let subject = StoredSubject {
                id: *id,
                name: name.clone(),
                latest: tables.latest.get(id).copied(),
                schemas,
            };
            subject.check_latest()?;
            subjects.push(subject);
        }
        Ok(subjects)
    }

    fn subject_count(&self) -> Result<usize, StoreError> {
        Ok(self.tables.lock().subjects.len())
    }

    fn schema_count(&self) -> Result<usize, StoreError> {
        Ok(self.tables.lock().schemas.len())
    }

    fn link_count(&self) -> Result<usize, StoreError> {
        Ok(self.tables.lock().links.len())
    }
}
