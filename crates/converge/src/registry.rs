//! Static extension registry
//!
//! Each resource module registers its transformations, validations, change
//! factory and change handlers explicitly at startup. Lookups are by
//! resource kind and, for handlers, by operation.

use crate::diff::ResourceChangeFactory;
use crate::error::Result;
use crate::extension::ExtensionConfig;
use crate::handler::ChangeHandler;
use crate::transform::Transformation;
use crate::types::Operation;
use crate::validation::Validation;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

/// An extension with its effective priority
pub struct Registered<T: ?Sized> {
    pub priority: i32,
    pub extension: Arc<T>,
}

impl<T: ?Sized> Registered<T> {
    pub fn new(priority: i32, extension: Arc<T>) -> Self {
        Self {
            priority,
            extension,
        }
    }
}

impl<T: ?Sized> Clone for Registered<T> {
    fn clone(&self) -> Self {
        Self {
            priority: self.priority,
            extension: Arc::clone(&self.extension),
        }
    }
}

/// Transformations, validations and handlers for resources with spec `S`
pub struct ExtensionRegistry<S> {
    transformations: Vec<Registered<dyn Transformation<S>>>,
    validations: Vec<Registered<dyn Validation<S>>>,
    factories: HashMap<String, Arc<dyn ResourceChangeFactory<String, S>>>,
    handlers: HashMap<(String, Operation), Arc<dyn ChangeHandler>>,
}

impl<S> Default for ExtensionRegistry<S> {
    fn default() -> Self {
        Self {
            transformations: Vec::new(),
            validations: Vec::new(),
            factories: HashMap::new(),
            handlers: HashMap::new(),
        }
    }
}

impl<S: 'static> ExtensionRegistry<S> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transformation with its own priority
    pub fn register_transformation(
        &mut self,
        transformation: impl Transformation<S> + 'static,
    ) -> &mut Self {
        let priority = transformation.priority();
        self.push_transformation(priority, Arc::new(transformation));
        self
    }

    /// Register a transformation, honoring `enabled` and `priority` from `config`
    pub fn register_transformation_with(
        &mut self,
        transformation: impl Transformation<S> + 'static,
        config: &ExtensionConfig,
    ) -> Result<&mut Self> {
        if !config.enabled()? {
            debug!("transformation {} disabled by configuration", transformation.name());
            return Ok(self);
        }
        let priority = config.priority()?.unwrap_or_else(|| transformation.priority());
        self.push_transformation(priority, Arc::new(transformation));
        Ok(self)
    }

    /// Register a validation with its own priority
    pub fn register_validation(&mut self, validation: impl Validation<S> + 'static) -> &mut Self {
        let priority = validation.priority();
        self.push_validation(priority, Arc::new(validation));
        self
    }

    /// Register a validation, honoring `enabled` and `priority` from `config`
    pub fn register_validation_with(
        &mut self,
        validation: impl Validation<S> + 'static,
        config: &ExtensionConfig,
    ) -> Result<&mut Self> {
        if !config.enabled()? {
            debug!("validation {} disabled by configuration", validation.name());
            return Ok(self);
        }
        let priority = config.priority()?.unwrap_or_else(|| validation.priority());
        self.push_validation(priority, Arc::new(validation));
        Ok(self)
    }

    /// Register the attribute comparison for one kind
    pub fn register_change_factory(
        &mut self,
        kind: impl Into<String>,
        factory: impl ResourceChangeFactory<String, S> + 'static,
    ) -> &mut Self {
        self.factories.insert(kind.into(), Arc::new(factory));
        self
    }

    /// Register the handler for one operation on one kind
    ///
    /// A later registration for the same kind and operation replaces the
    /// earlier one.
    pub fn register_handler(
        &mut self,
        kind: impl Into<String>,
        handler: impl ChangeHandler + 'static,
    ) -> &mut Self {
        let operation = handler.operation();
        self.handlers.insert((kind.into(), operation), Arc::new(handler));
        self
    }

    fn push_transformation(&mut self, priority: i32, transformation: Arc<dyn Transformation<S>>) {
        self.transformations.push(Registered::new(priority, transformation));
        self.transformations.sort_by_key(|t| t.priority);
    }

    fn push_validation(&mut self, priority: i32, validation: Arc<dyn Validation<S>>) {
        self.validations.push(Registered::new(priority, validation));
        self.validations.sort_by_key(|v| v.priority);
    }

    /// All transformations, ascending priority
    pub fn transformations(&self) -> &[Registered<dyn Transformation<S>>] {
        &self.transformations
    }

    /// Transformations applicable to `kind`, ascending priority
    pub fn transformations_for(&self, kind: &str) -> Vec<Registered<dyn Transformation<S>>> {
        self.transformations
            .iter()
            .filter(|t| t.extension.accepts(kind))
            .cloned()
            .collect()
    }

    /// All validations, ascending priority
    pub fn validations(&self) -> &[Registered<dyn Validation<S>>] {
        &self.validations
    }

    /// Validations applicable to `kind`, ascending priority
    pub fn validations_for(&self, kind: &str) -> Vec<Registered<dyn Validation<S>>> {
        self.validations
            .iter()
            .filter(|v| v.extension.accepts(kind))
            .cloned()
            .collect()
    }

    /// Change factory for a kind
    pub fn change_factory(&self, kind: &str) -> Option<Arc<dyn ResourceChangeFactory<String, S>>> {
        self.factories.get(kind).cloned()
    }

    /// Handler for an operation on a kind
    pub fn handler(&self, kind: &str, operation: Operation) -> Option<Arc<dyn ChangeHandler>> {
        self.handlers.get(&(kind.to_string(), operation)).cloned()
    }
}
