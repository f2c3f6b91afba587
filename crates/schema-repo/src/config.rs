// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Repository configuration.
//!
//! Supports both programmatic and file-based configuration.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fingerprint::FingerprintKind;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Repository configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoConfig {
    /// Connection descriptor: SQLite file path, or `:memory:`.
    #[serde(default = "default_database")]
    pub database: String,

    /// How long a write waits for another connection's lock (milliseconds).
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Validators applied to subjects registered without an explicit config
    /// and to every subject restored at startup.
    #[serde(default)]
    pub default_validators: Vec<String>,

    /// Hash strategy; must match the one that wrote the database.
    #[serde(default)]
    pub fingerprint: FingerprintKind,
}

fn default_database() -> String {
    "schema_repo.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            busy_timeout_ms: default_busy_timeout_ms(),
            default_validators: Vec::new(),
            fingerprint: FingerprintKind::default(),
        }
    }
}

impl RepoConfig {
    /// Create a new config builder
    pub fn builder() -> RepoConfigBuilder {
        RepoConfigBuilder::default()
    }

    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.trim().is_empty() {
            return Err(ConfigError::Invalid("database descriptor is empty".into()));
        }
        if let Some(name) = self.default_validators.iter().find(|n| n.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "empty validator name {:?} in default_validators",
                name
            )));
        }
        Ok(())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Subject configuration used when none is supplied.
    pub fn default_subject_config(&self) -> SubjectConfig {
        SubjectConfig {
            validators: self.default_validators.clone(),
            properties: BTreeMap::new(),
        }
    }
}

/// Config builder for fluent API
#[derive(Debug, Default)]
pub struct RepoConfigBuilder {
    database: Option<String>,
    busy_timeout_ms: Option<u64>,
    default_validators: Vec<String>,
    fingerprint: Option<FingerprintKind>,
}

impl RepoConfigBuilder {
    /// Set the connection descriptor
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the busy timeout in milliseconds
    pub fn busy_timeout_ms(mut self, ms: u64) -> Self {
        self.busy_timeout_ms = Some(ms);
        self
    }

    /// Add a default validator by name
    pub fn default_validator(mut self, name: impl Into<String>) -> Self {
        self.default_validators.push(name.into());
        self
    }

    /// Set the fingerprint strategy
    pub fn fingerprint(mut self, kind: FingerprintKind) -> Self {
        self.fingerprint = Some(kind);
        self
    }

    /// Build the configuration
    pub fn build(self) -> RepoConfig {
        let defaults = RepoConfig::default();

        RepoConfig {
            database: self.database.unwrap_or(defaults.database),
            busy_timeout_ms: self.busy_timeout_ms.unwrap_or(defaults.busy_timeout_ms),
            default_validators: self.default_validators,
            fingerprint: self.fingerprint.unwrap_or(defaults.fingerprint),
        }
    }
}

/// Per-subject configuration.
///
/// Opaque to the repository apart from `validators`, which names the
/// validators consulted before each registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectConfig {
    #[serde(default)]
    pub validators: Vec<String>,

    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl SubjectConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validator(mut self, name: impl Into<String>) -> Self {
        self.validators.push(name.into());
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}
