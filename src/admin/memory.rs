//! In-memory admin client
//!
//! Holds a fake cluster in process memory. Clones share the same cluster,
//! so a test can keep one handle for assertions while the reconciler drives
//! another.

use super::{
    AdminClient, AdminClientProvider, ClusterDescription, ConfigOp, NewTopic, TopicConfigEntry,
    TopicDescription, TopicOutcomes,
};
use crate::config::ClientConfig;
use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use converge::ChangeOutcome;
use futures::FutureExt;
use futures::future;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug)]
struct ClusterState {
    brokers: usize,
    topics: BTreeMap<String, TopicDescription>,
    failing: BTreeSet<String>,
    unreachable: bool,
    default_partitions: i32,
    default_replication_factor: i16,
    connects: usize,
    closes: usize,
    calls: Vec<String>,
}

/// A fake Kafka cluster implementing [`AdminClient`]
#[derive(Debug, Clone)]
pub struct InMemoryAdminClient {
    state: Arc<Mutex<ClusterState>>,
}

impl InMemoryAdminClient {
    /// Create an empty cluster with `brokers` brokers
    pub fn new(brokers: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(ClusterState {
                brokers,
                topics: BTreeMap::new(),
                failing: BTreeSet::new(),
                unreachable: false,
                default_partitions: 1,
                default_replication_factor: 1,
                connects: 0,
                closes: 0,
                calls: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ClusterState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Add an existing topic
    pub fn with_topic(self, topic: TopicDescription) -> Self {
        self.lock().topics.insert(topic.name.clone(), topic);
        self
    }

    /// Make every call touching `topic` fail
    pub fn fail_topic(&self, topic: impl Into<String>) {
        self.lock().failing.insert(topic.into());
    }

    /// Make every batch call fail as a whole
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    pub fn set_brokers(&self, brokers: usize) {
        self.lock().brokers = brokers;
    }

    pub fn topic(&self, name: &str) -> Option<TopicDescription> {
        self.lock().topics.get(name).cloned()
    }

    pub fn topic_names(&self) -> Vec<String> {
        self.lock().topics.keys().cloned().collect()
    }

    /// Number of clients handed out by [`AdminClientProvider::create`]
    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    /// Number of [`AdminClient::close`] calls
    pub fn closes(&self) -> usize {
        self.lock().closes
    }

    /// Names of the admin calls made so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Record a batch call and fail it when the cluster is unreachable
    fn begin(&self, call: &str) -> Result<MutexGuard<'_, ClusterState>> {
        let mut state = self.lock();
        state.calls.push(call.to_string());
        if state.unreachable {
            bail!("cluster unreachable");
        }
        Ok(state)
    }
}

impl ClusterState {
    fn check_failing(&self, topic: &str) -> Result<()> {
        if self.failing.contains(topic) {
            bail!("injected failure for topic '{topic}'");
        }
        Ok(())
    }

    fn create(&mut self, topic: NewTopic) -> Result<()> {
        self.check_failing(&topic.name)?;
        if self.topics.contains_key(&topic.name) {
            bail!("topic '{}' already exists", topic.name);
        }
        let partitions = topic.partitions.unwrap_or(self.default_partitions);
        let replication_factor = topic
            .replication_factor
            .unwrap_or(self.default_replication_factor);
        if partitions < 1 {
            bail!("invalid number of partitions: {partitions}");
        }
        if replication_factor < 1 || replication_factor as usize > self.brokers {
            bail!(
                "replication factor {replication_factor} is invalid for {} available broker(s)",
                self.brokers
            );
        }
        let configs = topic
            .configs
            .into_iter()
            .map(|(k, v)| (k, TopicConfigEntry::dynamic(v)))
            .collect();
        self.topics.insert(
            topic.name.clone(),
            TopicDescription {
                name: topic.name,
                partitions,
                replication_factor,
                configs,
                internal: false,
            },
        );
        Ok(())
    }

    fn existing(&mut self, name: &str) -> Result<&mut TopicDescription> {
        self.check_failing(name)?;
        self.topics
            .get_mut(name)
            .ok_or_else(|| anyhow!("unknown topic '{name}'"))
    }

    fn alter(&mut self, name: &str, ops: Vec<ConfigOp>) -> Result<()> {
        let topic = self.existing(name)?;
        for op in ops {
            match op {
                ConfigOp::Set { name: key, value } => {
                    topic.configs.insert(key, TopicConfigEntry::dynamic(value));
                }
                ConfigOp::Delete { name: key } => {
                    topic.configs.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn grow(&mut self, name: &str, total: i32) -> Result<()> {
        let topic = self.existing(name)?;
        if total <= topic.partitions {
            bail!(
                "topic '{name}' has {} partition(s); new total {total} must be larger",
                topic.partitions
            );
        }
        topic.partitions = total;
        Ok(())
    }

    fn delete(&mut self, name: &str) -> Result<()> {
        self.existing(name)?;
        self.topics.remove(name);
        Ok(())
    }
}

fn ready(result: Result<()>) -> ChangeOutcome {
    future::ready(result).boxed()
}

#[async_trait]
impl AdminClient for InMemoryAdminClient {
    async fn describe_cluster(&self) -> Result<ClusterDescription> {
        let state = self.begin("describe_cluster")?;
        Ok(ClusterDescription {
            cluster_id: "in-memory".to_string(),
            broker_ids: (0..state.brokers).map(|id| id as i32).collect(),
        })
    }

    async fn list_topics(&self) -> Result<Vec<TopicDescription>> {
        let state = self.begin("list_topics")?;
        Ok(state.topics.values().cloned().collect())
    }

    async fn create_topics(&self, topics: Vec<NewTopic>) -> Result<TopicOutcomes> {
        let mut state = self.begin("create_topics")?;
        Ok(topics
            .into_iter()
            .map(|topic| (topic.name.clone(), ready(state.create(topic))))
            .collect())
    }

    async fn alter_topic_configs(
        &self,
        alterations: BTreeMap<String, Vec<ConfigOp>>,
    ) -> Result<TopicOutcomes> {
        let mut state = self.begin("alter_topic_configs")?;
        Ok(alterations
            .into_iter()
            .map(|(name, ops)| {
                let outcome = ready(state.alter(&name, ops));
                (name, outcome)
            })
            .collect())
    }

    async fn create_partitions(&self, totals: BTreeMap<String, i32>) -> Result<TopicOutcomes> {
        let mut state = self.begin("create_partitions")?;
        Ok(totals
            .into_iter()
            .map(|(name, total)| {
                let outcome = ready(state.grow(&name, total));
                (name, outcome)
            })
            .collect())
    }

    async fn delete_topics(&self, topics: Vec<String>) -> Result<TopicOutcomes> {
        let mut state = self.begin("delete_topics")?;
        Ok(topics
            .into_iter()
            .map(|name| {
                let outcome = ready(state.delete(&name));
                (name, outcome)
            })
            .collect())
    }

    async fn close(&self) {
        self.lock().closes += 1;
    }
}

#[async_trait]
impl AdminClientProvider for InMemoryAdminClient {
    async fn create(&self, _config: &ClientConfig) -> Result<Arc<dyn AdminClient>> {
        self.lock().connects += 1;
        Ok(Arc::new(self.clone()))
    }
}
