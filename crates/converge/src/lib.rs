//! # Converge
//!
//! A generic engine for declarative reconciliation.
//!
//! A caller supplies the desired state of a set of resources; the engine
//! compares it against the observed state of a remote system and computes
//! and applies the changes that make the two converge.
//!
//! ## Core Concepts
//!
//! - **Resource**: an immutable, named and typed object (`kind`, `apiVersion`, metadata,
//!   spec)
//! - **Transformation**: rewrites or drops desired resources before diffing
//! - **Validation**: rejects an invalid desired state before anything is applied
//! - **ResourceChangeComputer**: keyed diff turning observed and desired state into
//!   `ResourceChange`s
//! - **ChangeHandler**: applies the changes of one operation against the remote system
//! - **Reconciler**: transform → validate → diff → dispatch → collect results
//! - **ConnectionContext**: lazily created, readiness-gated remote connection
//!
//! ## Example
//!
//! ```ignore
//! use converge::{ExtensionRegistry, Reconciler, ReconcileOptions, NoDuplicateNames};
//!
//! let mut registry = ExtensionRegistry::new();
//! registry
//!     .register_validation(NoDuplicateNames)
//!     .register_change_factory("Counter", CounterFactory)
//!     .register_handler("Counter", CreateCounters::new(client.clone()))
//!     .register_handler("Counter", UpdateCounters::new(client.clone()));
//!
//! let reconciler = Reconciler::new(registry);
//! let results = reconciler
//!     .reconcile_simple(desired, &observed, ReconcileOptions::default())
//!     .await?;
//! ```
//!
//! ## Failure Model
//!
//! Configuration, validation, readiness and connection problems abort a
//! reconciliation with an [`Error`] before any change is applied. Once
//! changes are submitted, each resource gets its own [`ChangeResult`]: a
//! failure on one key never affects the others.

pub mod context;
pub mod diff;
pub mod error;
pub mod extension;
pub mod handler;
pub mod planner;
pub mod reconciler;
pub mod registry;
pub mod resource;
pub mod transform;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use context::{
    ConnectionContext, ConnectionFactory, ConnectionState, NoProgress, ProgressCallback,
    ReadinessConfig,
};
pub use diff::{
    ChangeComputer, MapEntry, ResourceChange, ResourceChangeComputer, ResourceChangeFactory,
    compute_changes, compute_map_changes,
};
pub use error::{Error, Result};
pub use extension::{Configurable, Extension, ExtensionConfig, HIGHEST_PRECEDENCE};
pub use handler::{ChangeHandler, ChangeOutcome, ChangeResponse, associate_by_key, collect_results};
pub use planner::ChangePlan;
pub use reconciler::Reconciler;
pub use registry::{ExtensionRegistry, Registered};
pub use resource::{ANNOTATION_DELETE, ANNOTATION_TRANSFORMED_BY, ObjectMeta, Resource};
pub use transform::{Transformation, apply_transformations};
pub use types::{
    ChangeResult, ChangeStatus, Operation, ReconcileOptions, ReconcileSummary, ReconciliationMode,
    StateChange,
};
pub use validation::{
    NoDuplicateNames, Validation, ValidationError, ValidationErrors, ValidationResult,
    run_validations,
};
