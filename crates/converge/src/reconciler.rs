//! Reconciler - transform, validate, diff and apply
//!
//! The three preparatory steps run synchronously. Only change execution
//! suspends, and every change handler is resolved before the first remote
//! call is made.

use crate::context::{NoProgress, ProgressCallback};
use crate::diff::{ResourceChange, ResourceChangeComputer};
use crate::error::{Error, Result};
use crate::handler::{ChangeHandler, ChangeResponse, collect_results};
use crate::planner::ChangePlan;
use crate::registry::ExtensionRegistry;
use crate::resource::Resource;
use crate::transform::apply_transformations;
use crate::types::{ChangeResult, Operation, ReconcileOptions, ReconcileSummary, ReconciliationMode};
use crate::validation::{group_by_kind, run_validations};
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Operations that modify the remote system, in dispatch order
const DISPATCH_ORDER: [Operation; 3] = [Operation::Create, Operation::Update, Operation::Delete];

/// Orchestrates one reconciliation over an [`ExtensionRegistry`]
pub struct Reconciler<S> {
    registry: Arc<ExtensionRegistry<S>>,
}

impl<S> Clone for Reconciler<S> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<S> Reconciler<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new(registry: ExtensionRegistry<S>) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &ExtensionRegistry<S> {
        &self.registry
    }

    /// Transform then validate the desired state
    ///
    /// All validation errors are reported together in
    /// [`Error::Validation`].
    pub fn prepare(&self, desired: Vec<Resource<S>>) -> Result<Vec<Resource<S>>> {
        let received = desired.len();
        let transformed = apply_transformations(self.registry.transformations(), desired);
        debug!("transformed {received} desired resource(s) into {}", transformed.len());

        let result = run_validations(self.registry.validations(), &transformed);
        if !result.is_valid() {
            return Err(Error::Validation(result.into_errors().into()));
        }
        Ok(transformed)
    }

    /// Diff prepared desired state against actual state, kind by kind
    pub fn plan(
        &self,
        desired: &[Resource<S>],
        actual: &[Resource<S>],
        mode: ReconciliationMode,
    ) -> Result<ChangePlan> {
        let desired_by_kind = group_by_kind(desired);
        let actual_by_kind = group_by_kind(actual);
        let kinds: BTreeSet<&str> = desired_by_kind
            .keys()
            .chain(actual_by_kind.keys())
            .copied()
            .collect();

        let mut changes = Vec::new();
        for kind in kinds {
            let factory = self
                .registry
                .change_factory(kind)
                .ok_or_else(|| Error::configuration(kind, "no change factory registered"))?;
            let computer =
                ResourceChangeComputer::by_name(factory).delete_orphans(mode.deletes_orphans());

            let before = owned(actual_by_kind.get(kind));
            let after = owned(desired_by_kind.get(kind));
            let computed = computer.compute_changes(&before, &after);
            debug!("{kind}: {} change(s) computed", computed.len());
            changes.extend(computed);
        }

        let plan = ChangePlan::from_changes(changes, mode);
        debug!(
            "plan: {} create, {} update, {} delete, {} unchanged",
            plan.create.len(),
            plan.update.len(),
            plan.delete.len(),
            plan.unchanged.len()
        );
        Ok(plan)
    }

    /// Apply a plan and return one result per resource, sorted by kind and key
    ///
    /// In dry-run mode no handler is invoked: changes are reported as
    /// `DryRun` and unchanged resources as `Ok`. Changes the mode set aside
    /// are always reported as `Ok` with their computed change attached. Otherwise a missing handler
    /// fails the whole call before any change is submitted.
    pub async fn execute<P: ProgressCallback>(
        &self,
        plan: ChangePlan,
        dry_run: bool,
        progress: &mut P,
    ) -> Result<Vec<ChangeResult>> {
        let mut results = Vec::with_capacity(plan.total_resources());

        if dry_run {
            for change in plan.create.into_iter().chain(plan.update).chain(plan.delete) {
                let result = ChangeResult::dry_run(change);
                progress.on_change_complete(&result);
                results.push(result);
            }
        } else {
            let batches = self.resolve_handlers(&plan)?;
            for (operation, handler, changes) in batches {
                progress.on_batch_start(operation, changes.len());
                let batch_results = apply_batch(handler.as_ref(), changes).await;
                for result in &batch_results {
                    progress.on_change_complete(result);
                }
                progress.on_batch_complete(operation);
                results.extend(batch_results);
            }
        }
        results.extend(plan.unchanged.into_iter().map(ChangeResult::ok));
        results.extend(plan.skipped.into_iter().map(ChangeResult::ok));

        results.sort_by(|a, b| {
            (a.change.kind(), a.change.key()).cmp(&(b.change.kind(), b.change.key()))
        });
        info!("reconciliation complete: {}", ReconcileSummary::from_results(&results));
        Ok(results)
    }

    /// Prepare, plan and execute in one call
    ///
    /// Returns either a fatal error and no results, or one result per
    /// reconciled resource.
    pub async fn reconcile<P: ProgressCallback>(
        &self,
        desired: Vec<Resource<S>>,
        actual: &[Resource<S>],
        options: ReconcileOptions,
        progress: &mut P,
    ) -> Result<Vec<ChangeResult>> {
        let prepared = self.prepare(desired)?;
        let plan = self.plan(&prepared, actual, options.mode)?;
        self.execute(plan, options.dry_run, progress).await
    }

    /// [`reconcile`](Self::reconcile) without progress reporting
    pub async fn reconcile_simple(
        &self,
        desired: Vec<Resource<S>>,
        actual: &[Resource<S>],
        options: ReconcileOptions,
    ) -> Result<Vec<ChangeResult>> {
        self.reconcile(desired, actual, options, &mut NoProgress).await
    }

    fn resolve_handlers(&self, plan: &ChangePlan) -> Result<Vec<Batch>> {
        let mut batches = Vec::new();
        for operation in DISPATCH_ORDER {
            let mut by_kind: BTreeMap<&str, Vec<ResourceChange>> = BTreeMap::new();
            for change in plan.for_operation(operation) {
                by_kind.entry(change.kind()).or_default().push(change.clone());
            }
            for (kind, changes) in by_kind {
                let handler = self
                    .registry
                    .handler(kind, operation)
                    .ok_or_else(|| Error::MissingHandler {
                        kind: kind.to_string(),
                        operation,
                    })?;
                batches.push((operation, handler, changes));
            }
        }
        Ok(batches)
    }
}

type Batch = (Operation, Arc<dyn ChangeHandler>, Vec<ResourceChange>);

/// Submit one batch; a batch that cannot be submitted fails every change in it
async fn apply_batch(
    handler: &dyn ChangeHandler,
    changes: Vec<ResourceChange>,
) -> Vec<ChangeResult> {
    let responses = match handler.handle_changes(changes.clone()).await {
        Ok(responses) => responses,
        Err(e) => {
            warn!("{} batch of {} change(s) rejected: {e}", handler.operation(), changes.len());
            let message = e.to_string();
            changes
                .into_iter()
                .map(|change| ChangeResponse::failed(change, anyhow::Error::msg(message.clone())))
                .collect()
        }
    };
    collect_results(responses).await
}

fn owned<S: Clone>(resources: Option<&Vec<&Resource<S>>>) -> Vec<Resource<S>> {
    resources
        .map(|list| list.iter().map(|r| (*r).clone()).collect())
        .unwrap_or_default()
}
