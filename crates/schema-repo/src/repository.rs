// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The repository: subject table, startup loader and subject creation.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::{SchemaEntry, SubjectCache};
use crate::config::{RepoConfig, SubjectConfig};
use crate::error::Result;
use crate::fingerprint::{Fingerprint, Fingerprinter};
use crate::sqlite::SqliteStore;
use crate::store::SchemaStore;
use crate::subject::{Backend, Subject};
use crate::validator::{NonEmptyValidator, Validator, ValidatorRegistry};

/// Schema repository backed by a [`SchemaStore`].
///
/// Construction loads every subject and its history from the store; after
/// that, reads never touch the store.
pub struct Repository {
    backend: Backend,
    validators: ValidatorRegistry,
    default_config: SubjectConfig,
    subjects: SubjectCache,
}

impl Repository {
    /// Open a repository over `store` using the fingerprint strategy named
    /// by `config`.
    ///
    /// Fails if the store cannot be read or holds a corrupt row; there is no
    /// partially loaded mode.
    pub fn open(
        store: Arc<dyn SchemaStore>,
        config: &RepoConfig,
        validators: ValidatorRegistry,
    ) -> Result<Self> {
        let fingerprinter = config.fingerprint.fingerprinter();
        Self::open_with_fingerprinter(store, fingerprinter, config, validators)
    }

    /// Open a repository with an explicit fingerprint strategy.
    pub fn open_with_fingerprinter(
        store: Arc<dyn SchemaStore>,
        fingerprinter: Arc<dyn Fingerprinter>,
        config: &RepoConfig,
        validators: ValidatorRegistry,
    ) -> Result<Self> {
        let repo = Self {
            backend: Backend {
                store,
                fingerprinter,
            },
            validators,
            default_config: config.default_subject_config(),
            subjects: SubjectCache::new(),
        };
        repo.load()?;
        Ok(repo)
    }

    /// Open the SQLite database named by `config`.
    pub fn open_sqlite(config: &RepoConfig, validators: ValidatorRegistry) -> Result<Self> {
        let store = SqliteStore::from_config(config)?;
        Self::open(Arc::new(store), config, validators)
    }

    fn load(&self) -> Result<()> {
        let validators = self.validators.resolve(&self.default_config.validators)?;
        let stored = self.backend.store.load_all()?;

        let mut schema_total = 0;
        for subject in stored {
            let entries = subject
                .schemas
                .into_iter()
                .map(|row| {
                    let expected = Fingerprint::new(&row.hash);
                    self.backend.verify(&expected, row, None)
                })
                .collect::<Result<Vec<SchemaEntry>>>()?;
            schema_total += entries.len();

            let loaded = Subject::new(
                subject.name,
                self.default_config.clone(),
                validators.clone(),
                self.backend.clone(),
            );
            let latest = subject.latest.map(|id| id.to_string());
            loaded.restore(entries, latest.as_deref());
            debug!(
                subject = loaded.name(),
                id = subject.id,
                versions = loaded.all_entries().len(),
                "subject loaded"
            );
            self.subjects.add(Arc::new(loaded));
        }

        info!(
            subjects = self.subjects.len(),
            schemas = schema_total,
            "schema repository loaded"
        );
        Ok(())
    }

    /// Return the subject named `name`, creating it if needed.
    ///
    /// A new subject is persisted before it becomes visible. `config` only
    /// applies to a new subject; `None` selects the configured default.
    pub fn register(&self, name: &str, config: Option<SubjectConfig>) -> Result<Arc<Subject>> {
        NonEmptyValidator.validate(name)?;
        if let Some(subject) = self.subjects.lookup(name) {
            return Ok(subject);
        }

        let config = config.unwrap_or_else(|| self.default_config.clone());
        let validators = self.validators.resolve(&config.validators)?;
        let id = self.backend.store.get_or_create_subject(name)?;

        let created = Arc::new(Subject::new(
            name,
            config,
            validators,
            self.backend.clone(),
        ));
        let subject = self.subjects.get_or_insert(Arc::clone(&created));
        if Arc::ptr_eq(&subject, &created) {
            info!(subject = name, id, "subject created");
        }
        Ok(subject)
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<Subject>> {
        self.subjects.lookup(name)
    }

    /// All subjects, in load then creation order.
    pub fn subjects(&self) -> Vec<Arc<Subject>> {
        self.subjects.values()
    }

    /// The underlying store, for diagnostics.
    pub fn store(&self) -> &Arc<dyn SchemaStore> {
        &self.backend.store
    }
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("subjects", &self.subjects.len())
            .field("validators", &self.validators)
            .finish()
    }
}
