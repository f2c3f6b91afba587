// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for the schema repository.

use thiserror::Error;

use crate::validator::ValidationError;

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepoError>;

/// Failures raised by a [`SchemaStore`](crate::store::SchemaStore) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The row stored under a hash holds different text than the one being
    /// registered. The unit of work was rolled back.
    #[error("schema row {id} holds different text for hash {stored_hash}")]
    Conflict { id: i64, stored_hash: String },

    /// A stored row references a row that does not exist.
    #[error("dangling reference: {0}")]
    Dangling(String),
}

/// Errors surfaced by [`Repository`](crate::Repository) and
/// [`Subject`](crate::Subject).
#[derive(Debug, Error)]
pub enum RepoError {
    /// The schema or subject text was rejected before any mutation.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A stored row does not hash to its recorded fingerprint.
    ///
    /// Never retried. Indicates store corruption or a fingerprint collision.
    #[error("corrupt schema {id}: expected hash {expected}, store holds {stored}")]
    CorruptSchema {
        id: String,
        expected: String,
        stored: String,
    },

    /// Connectivity or transaction failure. Nothing was cached.
    #[error("schema store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("unknown validator: {0}")]
    UnknownValidator(String),
}

impl RepoError {
    /// True for errors the caller may retry verbatim.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RepoError::StoreUnavailable(StoreError::Sqlite(_) | StoreError::Unavailable(_))
        )
    }
}
