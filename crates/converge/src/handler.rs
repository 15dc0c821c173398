//! Change handlers - apply computed changes against the remote system
//!
//! A handler submits a whole batch of changes for one operation and hands
//! back one asynchronous outcome per resource. Outcomes are awaited as
//! independent tasks so that a failure, panic or cancellation on one key
//! never affects its siblings.

use crate::diff::ResourceChange;
use crate::error::Result;
use crate::types::{ChangeResult, Operation};
use async_trait::async_trait;
use futures::future::{self, BoxFuture, FutureExt};
use log::{debug, warn};
use std::collections::HashMap;
use std::future::Future;

/// Asynchronous completion of one remote call
pub type ChangeOutcome = BoxFuture<'static, anyhow::Result<()>>;

/// A change paired with its pending remote outcome
pub struct ChangeResponse {
    change: ResourceChange,
    outcome: ChangeOutcome,
}

impl ChangeResponse {
    pub fn new(
        change: ResourceChange,
        outcome: impl Future<Output = anyhow::Result<()>> + Send + 'static,
    ) -> Self {
        Self {
            change,
            outcome: outcome.boxed(),
        }
    }

    /// A change that needs no remote call
    pub fn completed(change: ResourceChange) -> Self {
        Self::new(change, future::ready(Ok(())))
    }

    /// A change that failed before anything was submitted
    pub fn failed(change: ResourceChange, error: anyhow::Error) -> Self {
        Self::new(change, future::ready(Err(error)))
    }

    pub fn change(&self) -> &ResourceChange {
        &self.change
    }
}

/// Pair each change with the outcome the remote client returned for its key
///
/// A change whose key has no outcome is reported as failed.
pub fn associate_by_key(
    changes: Vec<ResourceChange>,
    mut outcomes: HashMap<String, ChangeOutcome>,
) -> Vec<ChangeResponse> {
    let responses = changes
        .into_iter()
        .map(|change| match outcomes.remove(change.key()) {
            Some(outcome) => ChangeResponse { change, outcome },
            None => {
                let error =
                    anyhow::anyhow!("remote system returned no result for '{}'", change.key());
                ChangeResponse::failed(change, error)
            }
        })
        .collect();

    if !outcomes.is_empty() {
        debug!("ignoring {} outcome(s) for unknown keys", outcomes.len());
    }
    responses
}

/// Executor for one operation on one resource kind
#[async_trait]
pub trait ChangeHandler: Send + Sync {
    /// The operation this handler applies
    fn operation(&self) -> Operation;

    /// Submit `changes` and return one response per change
    ///
    /// An `Err` means the batch could not be submitted at all; every change
    /// of the batch is then reported as failed.
    async fn handle_changes(&self, changes: Vec<ResourceChange>) -> Result<Vec<ChangeResponse>>;
}

/// Await all outcomes, each in its own task, and build one result per change
///
/// A successful change is `Changed` when its operation modifies the remote
/// system and `Ok` otherwise. Must be called from within a tokio runtime.
pub async fn collect_results(responses: Vec<ChangeResponse>) -> Vec<ChangeResult> {
    let (changes, tasks): (Vec<_>, Vec<_>) = responses
        .into_iter()
        .map(|response| (response.change, tokio::spawn(response.outcome)))
        .unzip();

    let outcomes = future::join_all(tasks).await;

    changes
        .into_iter()
        .zip(outcomes)
        .map(|(change, outcome)| match outcome {
            Ok(Ok(())) if change.operation().is_change() => ChangeResult::changed(change),
            Ok(Ok(())) => ChangeResult::ok(change),
            Ok(Err(e)) => {
                warn!("{} {}/{} failed: {e:#}", change.operation(), change.kind(), change.key());
                ChangeResult::failed(change, format!("{e:#}"))
            }
            Err(e) => {
                warn!(
                    "{} {}/{} did not complete: {e}",
                    change.operation(),
                    change.kind(),
                    change.key()
                );
                ChangeResult::failed(change, format!("task did not complete: {e}"))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Resource;
    use crate::types::ChangeStatus;
    use std::time::Duration;

    fn change(key: &str, operation: Operation) -> ResourceChange {
        let resource = Resource::new("Counter", "test/v1", key, 0);
        ResourceChange::new(key, &resource, operation, Vec::new())
    }

    #[tokio::test]
    async fn test_partial_failure_isolation() {
        let responses = vec![
            ChangeResponse::new(change("a", Operation::Create), async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(())
            }),
            ChangeResponse::failed(change("b", Operation::Create), anyhow::anyhow!("topic exists")),
            ChangeResponse::completed(change("c", Operation::Create)),
        ];

        let results = collect_results(responses).await;
        let statuses: Vec<_> = results.iter().map(|r| (r.change.key(), r.status)).collect();
        assert_eq!(
            statuses,
            vec![
                ("a", ChangeStatus::Changed),
                ("b", ChangeStatus::Failed),
                ("c", ChangeStatus::Changed)
            ]
        );
        assert_eq!(results[1].error.as_deref(), Some("topic exists"));
    }

    #[tokio::test]
    async fn test_panic_only_fails_its_key() {
        let responses = vec![
            ChangeResponse::new(change("boom", Operation::Update), async {
                let missing: Option<()> = None;
                missing.expect("remote client bug");
                Ok(())
            }),
            ChangeResponse::completed(change("fine", Operation::Update)),
        ];

        let results = collect_results(responses).await;
        assert_eq!(results[0].status, ChangeStatus::Failed);
        assert!(results[0].error.as_deref().is_some_and(|e| e.contains("did not complete")));
        assert_eq!(results[1].status, ChangeStatus::Changed);
    }

    #[tokio::test]
    async fn test_unchanged_reports_ok() {
        let responses = vec![ChangeResponse::completed(change("same", Operation::None))];
        let results = collect_results(responses).await;
        assert_eq!(results[0].status, ChangeStatus::Ok);
    }

    #[tokio::test]
    async fn test_associate_by_key() {
        let mut outcomes: HashMap<String, ChangeOutcome> = HashMap::new();
        outcomes.insert("a".into(), future::ready(Ok(())).boxed());
        outcomes.insert("stray".into(), future::ready(Ok(())).boxed());

        let changes = vec![change("a", Operation::Delete), change("b", Operation::Delete)];
        let responses = associate_by_key(changes, outcomes);
        assert_eq!(responses.len(), 2);

        let results = collect_results(responses).await;
        assert_eq!(results[0].status, ChangeStatus::Changed);
        assert_eq!(results[1].status, ChangeStatus::Failed);
        assert!(results[1].error.as_deref().is_some_and(|e| e.contains("no result for 'b'")));
    }
}
