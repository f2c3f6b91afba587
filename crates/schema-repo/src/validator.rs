// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Validator collaborators consulted before any store mutation.
//!
//! Syntax and compatibility rules live outside this crate. They plug in
//! through [`Validator`] and are looked up by name from a
//! [`ValidatorRegistry`] when a subject is configured.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::error::RepoError;

/// Rejection produced by a [`Validator`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{validator}: {reason}")]
pub struct ValidationError {
    pub validator: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(validator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            validator: validator.into(),
            reason: reason.into(),
        }
    }
}

/// A check applied to schema text before it is registered.
pub trait Validator: Send + Sync {
    fn validate(&self, schema: &str) -> Result<(), ValidationError>;
}

/// Rejects empty or whitespace-only text.
///
/// Applied to every subject name and schema regardless of configuration.
#[derive(Debug, Default, Clone, Copy)]
pub struct NonEmptyValidator;

impl NonEmptyValidator {
    pub const NAME: &'static str = "non-empty";
}

impl Validator for NonEmptyValidator {
    fn validate(&self, schema: &str) -> Result<(), ValidationError> {
        if schema.trim().is_empty() {
            return Err(ValidationError::new(Self::NAME, "text is empty"));
        }
        Ok(())
    }
}

impl<F> Validator for F
where
    F: Fn(&str) -> Result<(), ValidationError> + Send + Sync,
{
    fn validate(&self, schema: &str) -> Result<(), ValidationError> {
        self(schema)
    }
}

/// Named validators available to subject configurations.
#[derive(Clone, Default)]
pub struct ValidatorRegistry {
    validators: HashMap<String, Arc<dyn Validator>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a validator under `name`.
    pub fn with(mut self, name: impl Into<String>, validator: impl Validator + 'static) -> Self {
        self.insert(name, validator);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, validator: impl Validator + 'static) {
        self.validators.insert(name.into(), Arc::new(validator));
    }

    /// Resolve the validator chain for a subject.
    ///
    /// The chain always starts with [`NonEmptyValidator`].
    pub fn resolve(&self, names: &[String]) -> Result<ValidatorChain, RepoError> {
        let mut chain: Vec<Arc<dyn Validator>> = vec![Arc::new(NonEmptyValidator)];
        for name in names {
            let validator = self
                .validators
                .get(name)
                .ok_or_else(|| RepoError::UnknownValidator(name.clone()))?;
            chain.push(Arc::clone(validator));
        }
        Ok(ValidatorChain { chain })
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.validators.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorRegistry")
            .field("validators", &self.names())
            .finish()
    }
}

/// Ordered validators bound to one subject. Stops at the first rejection.
#[derive(Clone)]
pub struct ValidatorChain {
    chain: Vec<Arc<dyn Validator>>,
}

impl ValidatorChain {
    pub fn validate(&self, schema: &str) -> Result<(), ValidationError> {
        self.chain.iter().try_for_each(|v| v.validate(schema))
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }
}

impl fmt::Debug for ValidatorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValidatorChain({} validators)", self.chain.len())
    }
}
