// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Content fingerprints for schema text.
//!
//! A fingerprint is both the dedup key of the `schema_entry` table and the
//! integrity check applied to every row read back from the store.
//!
//! Both built-in strategies feed an MD5 digest through the RFC 4122
//! name-based (version 3) construction:
//!
//! ```text
//! Md5Uuid             uuid_v3(md5(utf8(text)))
//! LegacyAsciiMd5Uuid  uuid_v3(md5(ascii(text)))   non-ASCII chars -> '?'
//! ```
//!
//! The two agree on ASCII-only text. Databases written by deployments that
//! encoded text as US-ASCII hold hashes that only [`LegacyAsciiMd5Uuid`]
//! reproduces for schemas containing non-ASCII characters; open those with
//! [`FingerprintKind::LegacyAscii`]. The lossy encoding maps distinct texts
//! onto one hash, which registration then reports as a collision.

use std::fmt;
use std::sync::Arc;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use uuid::Builder;

/// Normalized (lowercase) content hash.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap a stored hash value, normalizing case.
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(value.as_ref().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison against a raw stored value.
    pub fn matches(&self, stored: &str) -> bool {
        self.0.eq_ignore_ascii_case(stored)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strategy computing a [`Fingerprint`] from schema text.
///
/// Implementations must be deterministic across processes and platforms.
pub trait Fingerprinter: Send + Sync {
    /// Hash the raw schema bytes.
    fn fingerprint(&self, schema: &[u8]) -> Fingerprint;

    /// Convenience wrapper hashing the UTF-8 bytes of `schema`.
    fn fingerprint_str(&self, schema: &str) -> Fingerprint {
        self.fingerprint(schema.as_bytes())
    }
}

fn md5_uuid(schema: &[u8]) -> Fingerprint {
    let digest = Md5::digest(schema);
    // v3 UUIDs hash the name once more before setting version bits.
    let name_digest = Md5::digest(digest);
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&name_digest);
    let uuid = Builder::from_md5_bytes(bytes).into_uuid();
    Fingerprint(uuid.hyphenated().to_string())
}

/// MD5 digest of the UTF-8 bytes rendered as a name-based (v3) UUID.
#[derive(Debug, Default, Clone, Copy)]
pub struct Md5Uuid;

impl Fingerprinter for Md5Uuid {
    fn fingerprint(&self, schema: &[u8]) -> Fingerprint {
        md5_uuid(schema)
    }
}

/// [`Md5Uuid`] over US-ASCII text, each non-ASCII character replaced by `?`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LegacyAsciiMd5Uuid;

impl Fingerprinter for LegacyAsciiMd5Uuid {
    fn fingerprint(&self, schema: &[u8]) -> Fingerprint {
        self.fingerprint_str(&String::from_utf8_lossy(schema))
    }

    fn fingerprint_str(&self, schema: &str) -> Fingerprint {
        let ascii: Vec<u8> = schema
            .chars()
            .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
            .collect();
        md5_uuid(&ascii)
    }
}

/// Fingerprint strategy selectable from configuration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FingerprintKind {
    /// [`Md5Uuid`]
    #[default]
    Md5Uuid,
    /// [`LegacyAsciiMd5Uuid`]
    LegacyAscii,
}

impl FingerprintKind {
    pub fn fingerprinter(self) -> Arc<dyn Fingerprinter> {
        match self {
            FingerprintKind::Md5Uuid => Arc::new(Md5Uuid),
            FingerprintKind::LegacyAscii => Arc::new(LegacyAsciiMd5Uuid),
        }
    }
}
