//! Validations - reject invalid desired state before anything is applied

use crate::extension::Extension;
use crate::registry::Registered;
use crate::resource::Resource;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A single validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Name of the validation that reported the error
    pub validation: String,
    /// Resource the error is about, when attributable to one
    pub resource: Option<String>,
    pub message: String,
}

impl ValidationError {
    pub fn new(validation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            validation: validation.into(),
            resource: None,
            message: message.into(),
        }
    }

    /// Attach the resource name the error is about
    pub fn for_resource(mut self, name: impl Into<String>) -> Self {
        self.resource = Some(name.into());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.resource {
            Some(resource) => write!(f, "[{}] {}: {}", self.validation, resource, self.message),
            None => write!(f, "[{}] {}", self.validation, self.message),
        }
    }
}

/// Outcome of one validation; empty means success
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn error(error: ValidationError) -> Self {
        Self { errors: vec![error] }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn push(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<ValidationError> {
        self.errors
    }
}

impl FromIterator<ValidationError> for ValidationResult {
    fn from_iter<I: IntoIterator<Item = ValidationError>>(iter: I) -> Self {
        Self {
            errors: iter.into_iter().collect(),
        }
    }
}

/// All errors collected from a validation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    pub fn errors(&self) -> &[ValidationError] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<ValidationError>> for ValidationErrors {
    fn from(errors: Vec<ValidationError>) -> Self {
        Self(errors)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error(s)", self.0.len())?;
        for error in &self.0 {
            write!(f, "\n  - {error}")?;
        }
        Ok(())
    }
}

/// A pure check over all desired resources of one kind
///
/// Validations see the whole batch so they can express cross-resource
/// rules. They never modify resources.
pub trait Validation<S>: Extension {
    fn validate(&self, resources: &[Resource<S>]) -> ValidationResult;
}

/// Rejects batches in which two resources of the same kind share a name
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDuplicateNames;

impl Extension for NoDuplicateNames {
    fn name(&self) -> &str {
        "no-duplicate-names"
    }

    fn priority(&self) -> i32 {
        crate::extension::HIGHEST_PRECEDENCE
    }
}

impl<S> Validation<S> for NoDuplicateNames {
    fn validate(&self, resources: &[Resource<S>]) -> ValidationResult {
        let mut seen = BTreeSet::new();
        let mut duplicates = BTreeSet::new();
        for resource in resources {
            if !seen.insert(resource.name()) {
                duplicates.insert(resource.name());
            }
        }
        duplicates
            .into_iter()
            .map(|name| {
                ValidationError::new(self.name(), "duplicate metadata.name in batch")
                    .for_resource(name)
            })
            .collect()
    }
}

/// Group resources by kind, preserving order within a kind
pub(crate) fn group_by_kind<S>(resources: &[Resource<S>]) -> BTreeMap<&str, Vec<&Resource<S>>> {
    let mut groups: BTreeMap<&str, Vec<&Resource<S>>> = BTreeMap::new();
    for resource in resources {
        groups.entry(resource.kind()).or_default().push(resource);
    }
    groups
}

/// Run every applicable validation over each kind's batch
///
/// Kinds are validated in parallel; errors are reported ordered by kind,
/// then by validation priority.
pub fn run_validations<S>(
    validations: &[Registered<dyn Validation<S>>],
    resources: &[Resource<S>],
) -> ValidationResult
where
    S: Clone + Send + Sync,
{
    let mut ordered: Vec<&Registered<dyn Validation<S>>> = validations.iter().collect();
    ordered.sort_by_key(|v| v.priority);

    let batches: Vec<(&str, Vec<Resource<S>>)> = group_by_kind(resources)
        .into_iter()
        .map(|(kind, batch)| (kind, batch.into_iter().cloned().collect()))
        .collect();

    batches
        .par_iter()
        .map(|(kind, batch)| {
            let mut result = ValidationResult::ok();
            for validation in ordered.iter().filter(|v| v.extension.accepts(kind)) {
                result.merge(validation.extension.validate(batch));
            }
            result
        })
        .collect::<Vec<_>>()
        .into_iter()
        .fold(ValidationResult::ok(), |mut acc, result| {
            acc.merge(result);
            acc
        })
}
