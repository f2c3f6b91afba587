// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Subjects and the registration engine.
//!
//! # Registration
//!
//! ```text
//! register(text)
//!   validate                      (ValidationError, nothing touched)
//!   lock subject write gate
//!   hash = fingerprint(text)
//!   store.register(name, hash, text)   -- subject + schema + link, one tx
//!   verify stored row             (CorruptSchema, nothing cached)
//!   cache entry, latest = entry
//! ```
//!
//! The write gate is per subject: registrations on unrelated subjects only
//! contend on the store itself.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, warn};

use crate::cache::{SchemaEntry, SchemaVersionCache};
use crate::config::SubjectConfig;
use crate::error::{RepoError, Result, StoreError};
use crate::fingerprint::{Fingerprint, Fingerprinter};
use crate::store::{SchemaStore, StoredSchema};
use crate::validator::ValidatorChain;

/// Store and hashing strategy shared by the repository and its subjects.
#[derive(Clone)]
pub(crate) struct Backend {
    pub(crate) store: Arc<dyn SchemaStore>,
    pub(crate) fingerprinter: Arc<dyn Fingerprinter>,
}

impl Backend {
    /// Check a row read from the store and turn it into a cache entry.
    ///
    /// The stored hash must match `expected` and the stored text must hash
    /// back to it. With `text` set, the stored text must also equal it: a
    /// different text under the same hash is a fingerprint collision.
    pub(crate) fn verify(
        &self,
        expected: &Fingerprint,
        row: StoredSchema,
        text: Option<&str>,
    ) -> Result<SchemaEntry> {
        let corrupt = |expected: &Fingerprint, row: &StoredSchema| RepoError::CorruptSchema {
            id: row.id.to_string(),
            expected: expected.to_string(),
            stored: row.hash.clone(),
        };

        if !expected.matches(&row.hash) {
            error!(id = row.id, expected = %expected, stored = %row.hash, "stored hash mismatch");
            return Err(corrupt(expected, &row));
        }

        let recomputed = self.fingerprinter.fingerprint_str(&row.text);
        if !recomputed.matches(&row.hash) {
            error!(
                id = row.id,
                recomputed = %recomputed,
                stored = %row.hash,
                "stored schema text does not hash to its recorded fingerprint"
            );
            return Err(corrupt(&recomputed, &row));
        }

        if let Some(text) = text {
            if text != row.text {
                error!(id = row.id, hash = %row.hash, "fingerprint collision between distinct schemas");
                return Err(corrupt(expected, &row));
            }
        }

        Ok(SchemaEntry::new(
            row.id.to_string(),
            Fingerprint::new(&row.hash),
            row.text,
        ))
    }
}

#[derive(Default)]
struct SubjectState {
    schemas: SchemaVersionCache,
    latest: Option<Arc<SchemaEntry>>,
}

/// A named subject and its schema history.
///
/// Reads are served from the in-memory cache. Writes go through the store
/// first and reach the cache only once the store committed.
pub struct Subject {
    name: String,
    config: SubjectConfig,
    validators: ValidatorChain,
    backend: Backend,
    /// Serializes `register` and `register_if_latest` on this subject.
    write_gate: Mutex<()>,
    state: RwLock<SubjectState>,
}

impl Subject {
    pub(crate) fn new(
        name: impl Into<String>,
        config: SubjectConfig,
        validators: ValidatorChain,
        backend: Backend,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            validators,
            backend,
            write_gate: Mutex::new(()),
            state: RwLock::new(SubjectState::default()),
        }
    }

    /// Fill the cache from loaded rows, oldest first.
    ///
    /// Latest is the entry with id `latest` when recorded, otherwise the last
    /// entry.
    pub(crate) fn restore(&self, entries: Vec<SchemaEntry>, latest: Option<&str>) {
        let mut state = self.state.write();
        for entry in entries {
            state.schemas.add(entry);
        }
        let latest = latest
            .and_then(|id| state.schemas.lookup_by_id(id))
            .or_else(|| state.schemas.last());
        state.latest = latest;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &SubjectConfig {
        &self.config
    }

    /// Schema ids are store row ids, hence integral.
    pub fn integral_keys(&self) -> bool {
        true
    }

    /// Register `schema` under this subject.
    ///
    /// Identical text is stored once globally; registering it again returns
    /// the existing entry. On success the entry becomes this subject's latest.
    pub fn register(&self, schema: &str) -> Result<Arc<SchemaEntry>> {
        self.validators.validate(schema)?;
        let _gate = self.write_gate.lock();
        self.register_locked(schema)
    }

    /// Register `schema` only if `expected` is still the latest entry.
    ///
    /// `None` for `expected` means "no schema registered yet". Returns
    /// `Ok(None)` when latest moved on; the caller should re-read
    /// [`latest`](Self::latest) and retry. Nothing is written in that case.
    pub fn register_if_latest(
        &self,
        schema: &str,
        expected: Option<&SchemaEntry>,
    ) -> Result<Option<Arc<SchemaEntry>>> {
        self.validators.validate(schema)?;
        let _gate = self.write_gate.lock();

        let current = self.latest();
        let unchanged = match (expected, current.as_deref()) {
            (None, None) => true,
            (Some(expected), Some(current)) => {
                std::ptr::eq(expected, current) || expected == current
            }
            _ => false,
        };
        if !unchanged {
            warn!(
                subject = %self.name,
                expected = ?expected.map(SchemaEntry::id),
                latest = ?current.as_deref().map(SchemaEntry::id),
                "conditional registration lost: latest changed"
            );
            return Ok(None);
        }

        self.register_locked(schema).map(Some)
    }

    fn register_locked(&self, schema: &str) -> Result<Arc<SchemaEntry>> {
        let hash = self.backend.fingerprinter.fingerprint_str(schema);

        let stored = self
            .backend
            .store
            .register(&self.name, hash.as_str(), schema)
            .map_err(|e| match e {
                StoreError::Conflict { id, stored_hash } => {
                    error!(
                        subject = %self.name,
                        id,
                        hash = %hash,
                        "stored schema differs from registered text under the same hash"
                    );
                    RepoError::CorruptSchema {
                        id: id.to_string(),
                        expected: hash.to_string(),
                        stored: stored_hash,
                    }
                }
                other => {
                    warn!(subject = %self.name, error = %other, "schema registration aborted");
                    RepoError::from(other)
                }
            })?;
        let entry = self.backend.verify(&hash, stored.schema, Some(schema))?;

        let mut state = self.state.write();
        let known = state.schemas.lookup_by_id(entry.id()).is_some();
        let entry = state.schemas.add(entry);
        state.latest = Some(Arc::clone(&entry));
        drop(state);

        debug!(
            subject = %self.name,
            id = entry.id(),
            hash = %entry.hash(),
            known,
            "schema registered"
        );
        Ok(entry)
    }

    /// Cached entry holding exactly `schema`.
    pub fn lookup_by_schema(&self, schema: &str) -> Option<Arc<SchemaEntry>> {
        self.state
            .read()
            .schemas
            .lookup_by_schema(schema, &*self.backend.fingerprinter)
    }

    pub fn lookup_by_id(&self, id: &str) -> Option<Arc<SchemaEntry>> {
        self.state.read().schemas.lookup_by_id(id)
    }

    /// Most recently registered entry.
    pub fn latest(&self) -> Option<Arc<SchemaEntry>> {
        self.state.read().latest.clone()
    }

    /// Every entry of this subject in registration order.
    pub fn all_entries(&self) -> Vec<Arc<SchemaEntry>> {
        self.state.read().schemas.values()
    }
}

impl fmt::Debug for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Subject")
            .field("name", &self.name)
            .field("versions", &state.schemas.len())
            .field("latest", &state.latest.as_deref().map(SchemaEntry::id))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Md5Uuid;
    use crate::memory::MemoryStore;
    use crate::validator::{ValidationError, ValidatorRegistry};

    /// Maps every text onto the same hash.
    struct Colliding;

    impl Fingerprinter for Colliding {
        fn fingerprint(&self, _schema: &[u8]) -> Fingerprint {
            Fingerprint::new("00000000-0000-3000-8000-000000000000")
        }
    }

    fn subject_on(store: Arc<MemoryStore>, fingerprinter: Arc<dyn Fingerprinter>) -> Subject {
        let registry = ValidatorRegistry::new().with("no-long", |s: &str| {
            if s.contains("long") {
                Err(ValidationError::new("no-long", "long not allowed"))
            } else {
                Ok(())
            }
        });
        let config = SubjectConfig::new().validator("no-long");
        let validators = registry.resolve(&config.validators).unwrap();
        Subject::new(
            "orders",
            config,
            validators,
            Backend {
                store,
                fingerprinter,
            },
        )
    }

    fn subject() -> (Subject, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (subject_on(Arc::clone(&store), Arc::new(Md5Uuid)), store)
    }

    const A: &str = r#"{"type":"string"}"#;
    const B: &str = r#"{"type":"int"}"#;
    const C: &str = r#"{"type":"boolean"}"#;

    #[test]
    fn register_sets_latest_and_caches_entry() {
        let (subject, _store) = subject();

        let entry = subject.register(A).unwrap();
        assert_eq!(entry.schema(), A);
        assert_eq!(entry.hash(), &Md5Uuid.fingerprint_str(A));
        assert_eq!(subject.latest().as_deref(), Some(&*entry));
        assert!(Arc::ptr_eq(&subject.lookup_by_id(entry.id()).unwrap(), &entry));
        assert!(Arc::ptr_eq(&subject.lookup_by_schema(A).unwrap(), &entry));
    }

    #[test]
    fn register_twice_is_idempotent() {
        let (subject, store) = subject();

        let first = subject.register(A).unwrap();
        let second = subject.register(A).unwrap();

        assert_eq!(first.id(), second.id());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(subject.all_entries().len(), 1);
        assert_eq!(store.schema_count().unwrap(), 1);
        assert_eq!(store.link_count().unwrap(), 1);
    }

    #[test]
    fn reregistering_an_older_schema_makes_it_latest() {
        let (subject, _store) = subject();

        let a = subject.register(A).unwrap();
        subject.register(B).unwrap();
        let again = subject.register(A).unwrap();

        assert!(Arc::ptr_eq(&a, &again));
        assert_eq!(subject.latest().unwrap().id(), a.id());
        // History keeps first-registration order.
        let texts: Vec<String> = subject
            .all_entries()
            .iter()
            .map(|e| e.schema().to_string())
            .collect();
        assert_eq!(texts, vec![A, B]);
    }

    #[test]
    fn validation_failure_touches_nothing() {
        let (subject, store) = subject();

        let err = subject.register(r#"{"type":"long"}"#).unwrap_err();
        assert!(matches!(err, RepoError::Validation(ref v) if v.validator == "no-long"));
        let err = subject.register("   ").unwrap_err();
        assert!(matches!(err, RepoError::Validation(_)));

        assert_eq!(store.subject_count().unwrap(), 0);
        assert!(subject.latest().is_none());
    }

    #[test]
    fn store_failure_leaves_cache_untouched() {
        let (subject, store) = subject();
        let a = subject.register(A).unwrap();

        store.fail_next_write("connection reset");
        let err = subject.register(B).unwrap_err();

        assert!(err.is_retryable());
        assert!(matches!(err, RepoError::StoreUnavailable(_)));
        assert_eq!(subject.all_entries().len(), 1);
        assert_eq!(subject.latest().unwrap().id(), a.id());
        assert!(subject.lookup_by_schema(B).is_none());

        // Caller retries the whole operation.
        let b = subject.register(B).unwrap();
        assert_eq!(subject.latest().unwrap().id(), b.id());
    }

    #[test]
    fn register_if_latest_on_empty_subject() {
        let (subject, _store) = subject();

        let a = subject.register_if_latest(A, None).unwrap().unwrap();
        assert_eq!(subject.latest().unwrap().id(), a.id());

        // latest is now A, so "expect nothing" loses.
        assert!(subject.register_if_latest(B, None).unwrap().is_none());
    }

    #[test]
    fn register_if_latest_scenario() {
        let (subject, store) = subject();

        let a = subject.register(A).unwrap();
        let b = subject.register(B).unwrap();

        let lost = subject.register_if_latest(C, Some(&a)).unwrap();
        assert!(lost.is_none());
        assert!(subject.lookup_by_schema(C).is_none());
        assert_eq!(store.schema_count().unwrap(), 2);

        let c = subject.register_if_latest(C, Some(&b)).unwrap().unwrap();
        assert_eq!(subject.latest().unwrap().id(), c.id());
        assert_eq!(store.schema_count().unwrap(), 3);
    }

    #[test]
    fn register_if_latest_accepts_equal_copy() {
        let (subject, _store) = subject();
        let a = subject.register(A).unwrap();

        let copy = SchemaEntry::new(a.id(), a.hash().clone(), a.schema());
        assert!(subject.register_if_latest(B, Some(&copy)).unwrap().is_some());
    }

    #[test]
    fn colliding_fingerprint_is_corruption() {
        let store = Arc::new(MemoryStore::new());
        let subject = subject_on(Arc::clone(&store), Arc::new(Colliding));

        subject.register(A).unwrap();
        let err = subject.register(B).unwrap_err();

        assert!(matches!(err, RepoError::CorruptSchema { .. }));
        assert!(!err.is_retryable());
        assert_eq!(subject.all_entries().len(), 1);
        assert_eq!(subject.latest().unwrap().schema(), A);
    }

    #[test]
    fn corrupt_stored_row_is_detected() {
        let (subject, store) = subject();
        // Row claims A's hash but holds different text.
        let hash = Md5Uuid.fingerprint_str(A);
        store.seed_schema(hash.as_str(), "tampered");

        let err = subject.register(A).unwrap_err();
        match err {
            RepoError::CorruptSchema { stored, .. } => assert!(hash.matches(&stored)),
            other => panic!("expected CorruptSchema, got {other:?}"),
        }
        assert!(subject.latest().is_none());
    }

    #[test]
    fn stored_hash_case_is_tolerated() {
        let (subject, store) = subject();
        let upper = Md5Uuid.fingerprint_str(A).as_str().to_ascii_uppercase();
        let id = store.seed_schema(&upper, A);

        let entry = subject.register(A).unwrap();
        assert_eq!(entry.id(), id.to_string());
        assert_eq!(entry.hash(), &Md5Uuid.fingerprint_str(A));
    }

    #[test]
    fn restore_sets_latest_to_last_entry() {
        let (subject, _store) = subject();
        subject.restore(
            vec![
                SchemaEntry::new("3", Md5Uuid.fingerprint_str(A), A),
                SchemaEntry::new("1", Md5Uuid.fingerprint_str(B), B),
            ],
            None,
        );

        assert_eq!(subject.latest().unwrap().id(), "1");
        assert_eq!(subject.all_entries()[0].id(), "3");
    }

    #[test]
    fn restore_prefers_recorded_latest() {
        let (subject, _store) = subject();
        subject.restore(
            vec![
                SchemaEntry::new("1", Md5Uuid.fingerprint_str(A), A),
                SchemaEntry::new("2", Md5Uuid.fingerprint_str(B), B),
            ],
            Some("1"),
        );

        assert_eq!(subject.latest().unwrap().schema(), A);
        assert_eq!(subject.all_entries().len(), 2);
    }
}
