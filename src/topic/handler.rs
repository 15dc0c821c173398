//! Topic change handlers
//!
//! Each handler turns a batch of topic changes into one batched admin call
//! and pairs every change with the outcome reported for its topic.

use super::{NO_NUM_PARTITIONS, NO_REPLICATION_FACTOR};
use super::change::{CONFIG_PREFIX, PARTITIONS, REPLICAS};
use crate::admin::{AdminClientContext, ConfigOp, NewTopic, TopicOutcomes};
use anyhow::anyhow;
use async_trait::async_trait;
use converge::{
    ChangeHandler, ChangeOutcome, ChangeResponse, Error, Operation, ResourceChange, Result,
    associate_by_key,
};
use futures::{FutureExt, TryFutureExt, future};
use log::{debug, warn};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

fn remote(call: &str, e: &anyhow::Error) -> Error {
    Error::Remote(format!("{call} failed: {e:#}"))
}

fn as_i64(value: Option<&Value>) -> Option<i64> {
    value.and_then(Value::as_i64)
}

/// Config values a change sets, by config name
fn config_values(change: &ResourceChange) -> BTreeMap<String, String> {
    change
        .changes_with_prefix(CONFIG_PREFIX)
        .filter_map(|(name, c)| {
            let value = c.after()?;
            let value = value.as_str().map_or_else(|| value.to_string(), str::to_string);
            Some((name.to_string(), value))
        })
        .collect()
}

/// Creates topics that are missing from the cluster
pub struct CreateTopicHandler {
    context: Arc<AdminClientContext>,
}

impl CreateTopicHandler {
    pub fn new(context: Arc<AdminClientContext>) -> Self {
        Self { context }
    }

    fn new_topic(change: &ResourceChange) -> NewTopic {
        let partitions = as_i64(change.change(PARTITIONS).and_then(|c| c.after()))
            .filter(|p| *p != i64::from(NO_NUM_PARTITIONS))
            .and_then(|p| i32::try_from(p).ok());
        let replication_factor = as_i64(change.change(REPLICAS).and_then(|c| c.after()))
            .filter(|r| *r != i64::from(NO_REPLICATION_FACTOR))
            .and_then(|r| i16::try_from(r).ok());
        NewTopic {
            name: change.key().to_string(),
            partitions,
            replication_factor,
            configs: config_values(change),
        }
    }
}

#[async_trait]
impl ChangeHandler for CreateTopicHandler {
    fn operation(&self) -> Operation {
        Operation::Create
    }

    async fn handle_changes(&self, changes: Vec<ResourceChange>) -> Result<Vec<ChangeResponse>> {
        let client = self.context.acquire().await?;
        let topics: Vec<NewTopic> = changes.iter().map(Self::new_topic).collect();
        debug!("creating {} topic(s)", topics.len());

        let outcomes = client
            .create_topics(topics)
            .await
            .map_err(|e| remote("create topics", &e))?;
        Ok(associate_by_key(changes, outcomes))
    }
}

/// Alters configs and partition counts of existing topics
///
/// Partition counts can only grow and the replication factor of an existing
/// topic cannot be changed; such changes fail for their topic alone.
pub struct UpdateTopicHandler {
    context: Arc<AdminClientContext>,
}

/// What one topic update submits to the cluster
#[derive(Debug, Default)]
struct TopicUpdate {
    configs: Vec<ConfigOp>,
    partitions: Option<i32>,
}

impl UpdateTopicHandler {
    pub fn new(context: Arc<AdminClientContext>) -> Self {
        Self { context }
    }

    fn plan_update(change: &ResourceChange) -> anyhow::Result<TopicUpdate> {
        let mut update = TopicUpdate::default();

        if let Some(replicas) = change.change(REPLICAS)
            && replicas.operation() == Operation::Update
        {
            return Err(anyhow!(
                "cannot change the replication factor of topic '{}' from {} to {}",
                change.key(),
                replicas.before().map_or_else(|| "?".to_string(), Value::to_string),
                replicas.after().map_or_else(|| "?".to_string(), Value::to_string),
            ));
        }

        if let Some(partitions) = change.change(PARTITIONS)
            && partitions.operation() == Operation::Update
        {
            let before = as_i64(partitions.before()).unwrap_or_default();
            let after = as_i64(partitions.after()).unwrap_or_default();
            if after < before {
                return Err(anyhow!(
                    "cannot reduce the partitions of topic '{}' from {before} to {after}",
                    change.key()
                ));
            }
            let total = i32::try_from(after)
                .map_err(|_| anyhow!("partition count {after} is out of range"))?;
            update.partitions = Some(total);
        }

        for (name, c) in change.changes_with_prefix(CONFIG_PREFIX) {
            match c.operation() {
                Operation::Create | Operation::Update => {
                    let value = c.after().map_or_else(String::new, |v| {
                        v.as_str().map_or_else(|| v.to_string(), str::to_string)
                    });
                    update.configs.push(ConfigOp::Set {
                        name: name.to_string(),
                        value,
                    });
                }
                Operation::Delete => update.configs.push(ConfigOp::Delete {
                    name: name.to_string(),
                }),
                Operation::None => {}
            }
        }
        Ok(update)
    }
}

/// Remove the outcome reported for `key`, failing when the call omitted it
fn take_outcome(outcomes: &mut TopicOutcomes, key: &str, call: &'static str) -> ChangeOutcome {
    outcomes.remove(key).unwrap_or_else(|| {
        future::ready(Err(anyhow!("{call} returned no result for '{key}'"))).boxed()
    })
}

/// One failed outcome per key, all carrying `error`
fn failed_outcomes<K: AsRef<str>>(
    keys: impl IntoIterator<Item = K>,
    error: &Error,
) -> TopicOutcomes {
    warn!("{error}");
    keys.into_iter()
        .map(|key| {
            let outcome: ChangeOutcome = future::ready(Err(anyhow!("{error}"))).boxed();
            (key.as_ref().to_string(), outcome)
        })
        .collect()
}

#[async_trait]
impl ChangeHandler for UpdateTopicHandler {
    fn operation(&self) -> Operation {
        Operation::Update
    }

    async fn handle_changes(&self, changes: Vec<ResourceChange>) -> Result<Vec<ChangeResponse>> {
        let mut accepted = Vec::new();
        let mut responses = Vec::new();
        for change in changes {
            match Self::plan_update(&change) {
                Ok(update) => accepted.push((change, update)),
                Err(e) => responses.push(ChangeResponse::failed(change, e)),
            }
        }

        let mut alterations = BTreeMap::new();
        let mut totals = BTreeMap::new();
        for (change, update) in &accepted {
            if !update.configs.is_empty() {
                alterations.insert(change.key().to_string(), update.configs.clone());
            }
            if let Some(total) = update.partitions {
                totals.insert(change.key().to_string(), total);
            }
        }

        // Once a sub-call has reached the cluster the batch can no longer fail
        // as a whole: a rejected sub-call fails only the topics it carried.
        let mut config_outcomes = TopicOutcomes::new();
        let mut partition_outcomes = TopicOutcomes::new();
        if !alterations.is_empty() || !totals.is_empty() {
            match self.context.acquire().await {
                Ok(client) => {
                    if !alterations.is_empty() {
                        debug!("altering configs of {} topic(s)", alterations.len());
                        let keys: Vec<String> = alterations.keys().cloned().collect();
                        config_outcomes = match client.alter_topic_configs(alterations).await {
                            Ok(outcomes) => outcomes,
                            Err(e) => failed_outcomes(&keys, &remote("alter topic configs", &e)),
                        };
                    }
                    if !totals.is_empty() {
                        debug!("adding partitions to {} topic(s)", totals.len());
                        let keys: Vec<String> = totals.keys().cloned().collect();
                        partition_outcomes = match client.create_partitions(totals).await {
                            Ok(outcomes) => outcomes,
                            Err(e) => failed_outcomes(&keys, &remote("create partitions", &e)),
                        };
                    }
                }
                Err(e) => {
                    config_outcomes = failed_outcomes(alterations.keys(), &e);
                    partition_outcomes = failed_outcomes(totals.keys(), &e);
                }
            }
        }

        for (change, update) in accepted {
            let mut pending = Vec::new();
            if !update.configs.is_empty() {
                pending.push(take_outcome(
                    &mut config_outcomes,
                    change.key(),
                    "alter topic configs",
                ));
            }
            if update.partitions.is_some() {
                pending.push(take_outcome(
                    &mut partition_outcomes,
                    change.key(),
                    "create partitions",
                ));
            }
            let response = if pending.is_empty() {
                ChangeResponse::completed(change)
            } else {
                ChangeResponse::new(change, future::try_join_all(pending).map_ok(|_| ()))
            };
            responses.push(response);
        }
        Ok(responses)
    }
}

/// Deletes topics that are no longer desired
pub struct DeleteTopicHandler {
    context: Arc<AdminClientContext>,
}

impl DeleteTopicHandler {
    pub fn new(context: Arc<AdminClientContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl ChangeHandler for DeleteTopicHandler {
    fn operation(&self) -> Operation {
        Operation::Delete
    }

    async fn handle_changes(&self, changes: Vec<ResourceChange>) -> Result<Vec<ChangeResponse>> {
        let client = self.context.acquire().await?;
        let names: Vec<String> = changes.iter().map(|c| c.key().to_string()).collect();
        debug!("deleting {} topic(s)", names.len());

        let outcomes = client
            .delete_topics(names)
            .await
            .map_err(|e| remote("delete topics", &e))?;
        Ok(associate_by_key(changes, outcomes))
    }
}
