// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Relational backing store for a schema registry.
//!
//! Maps named subjects (topics) to an ordered history of schema versions.
//! Identical schema text is stored once, keyed by a content fingerprint, and
//! shared by every subject that registers it.
//!
//! # Features
//!
//! - **Global dedup**: one `schema_entry` row per distinct text, linked to
//!   many subjects
//! - **Atomic registration**: subject, schema and link rows are written in a
//!   single transaction
//! - **Cached reads**: lookups by text, id and latest never touch the store
//! - **Compare-and-swap append**: [`Subject::register_if_latest`]
//! - **Integrity checks**: every stored row is re-hashed; mismatches surface
//!   as [`RepoError::CorruptSchema`]
//!
//! # Architecture
//!
//! ```text
//! Repository
//! +-- SubjectCache          (name -> Subject)
//! |   +-- Subject           (per-subject write gate)
//! |       +-- SchemaVersionCache (hash / id -> SchemaEntry, latest)
//! +-- Fingerprinter         (Md5Uuid or LegacyAsciiMd5Uuid)
//! +-- SchemaStore           (SqliteStore or MemoryStore)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use schema_repo::{RepoConfig, Repository, ValidatorRegistry};
//!
//! let config = RepoConfig::builder().database("schemas.db").build();
//! let repo = Repository::open_sqlite(&config, ValidatorRegistry::new())?;
//!
//! let orders = repo.register("orders", None)?;
//! let v1 = orders.register(r#"{"type":"string"}"#)?;
//! assert_eq!(orders.latest().as_deref(), Some(&*v1));
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod memory;
pub mod repository;
pub mod sqlite;
pub mod store;
pub mod subject;
pub mod validator;

pub use cache::{SchemaEntry, SchemaVersionCache, SubjectCache};
pub use config::{ConfigError, RepoConfig, SubjectConfig};
pub use error::{RepoError, Result, StoreError};
pub use fingerprint::{
    Fingerprint, FingerprintKind, Fingerprinter, LegacyAsciiMd5Uuid, Md5Uuid,
};
pub use memory::MemoryStore;
pub use repository::Repository;
pub use sqlite::SqliteStore;
pub use store::{SchemaId, SchemaStore, StoredRegistration, StoredSchema, StoredSubject, SubjectId};
pub use subject::Subject;
pub use validator::{NonEmptyValidator, ValidationError, Validator, ValidatorChain, ValidatorRegistry};
