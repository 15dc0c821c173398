//! Kafka admin-client seam
//!
//! The reconciler never speaks the Kafka protocol itself. It drives an
//! [`AdminClient`], which submits batches and answers with one pending
//! outcome per topic, and owns it through an [`AdminClientContext`].

pub mod memory;

use crate::config::ClientConfig;
use async_trait::async_trait;
use converge::{ChangeOutcome, ConnectionContext, ConnectionFactory, ReadinessConfig};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Outcomes of a batched admin call, keyed by topic name
pub type TopicOutcomes = HashMap<String, ChangeOutcome>;

/// Brokers currently reachable in the cluster
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterDescription {
    pub cluster_id: String,
    pub broker_ids: Vec<i32>,
}

/// A topic config entry as reported by the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicConfigEntry {
    pub value: String,
    /// The value is a broker or cluster default rather than set on the topic
    pub is_default: bool,
}

impl TopicConfigEntry {
    /// An entry set explicitly on the topic
    pub fn dynamic(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            is_default: false,
        }
    }
}

/// A topic as reported by the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicDescription {
    pub name: String,
    pub partitions: i32,
    pub replication_factor: i16,
    pub configs: BTreeMap<String, TopicConfigEntry>,
    pub internal: bool,
}

/// A topic to create
///
/// Unset partitions or replication factor fall back to the broker defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTopic {
    pub name: String,
    pub partitions: Option<i32>,
    pub replication_factor: Option<i16>,
    pub configs: BTreeMap<String, String>,
}

/// One incremental config alteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOp {
    Set { name: String, value: String },
    Delete { name: String },
}

/// Asynchronous Kafka admin operations
///
/// Batch methods fail as a whole only when the request could not be sent;
/// per-topic failures are reported through the returned outcomes.
#[async_trait]
pub trait AdminClient: Send + Sync {
    async fn describe_cluster(&self) -> anyhow::Result<ClusterDescription>;

    async fn list_topics(&self) -> anyhow::Result<Vec<TopicDescription>>;

    async fn create_topics(&self, topics: Vec<NewTopic>) -> anyhow::Result<TopicOutcomes>;

    async fn alter_topic_configs(
        &self,
        alterations: BTreeMap<String, Vec<ConfigOp>>,
    ) -> anyhow::Result<TopicOutcomes>;

    /// Raise the partition count of each topic to the given total
    async fn create_partitions(&self, totals: BTreeMap<String, i32>)
    -> anyhow::Result<TopicOutcomes>;

    async fn delete_topics(&self, topics: Vec<String>) -> anyhow::Result<TopicOutcomes>;

    async fn close(&self) {}
}

/// Creates admin clients from connection settings
#[async_trait]
pub trait AdminClientProvider: Send + Sync {
    async fn create(&self, config: &ClientConfig) -> anyhow::Result<Arc<dyn AdminClient>>;
}

/// [`ConnectionFactory`] backed by an [`AdminClientProvider`]
pub struct AdminClientFactory {
    provider: Arc<dyn AdminClientProvider>,
    config: ClientConfig,
}

impl AdminClientFactory {
    pub fn new(provider: Arc<dyn AdminClientProvider>, config: ClientConfig) -> Self {
        Self { provider, config }
    }
}

#[async_trait]
impl ConnectionFactory for AdminClientFactory {
    type Connection = Arc<dyn AdminClient>;

    async fn connect(&self) -> anyhow::Result<Self::Connection> {
        log::debug!(
            "Creating admin client {} for {}",
            self.config.client_id,
            self.config.bootstrap_servers
        );
        self.provider.create(&self.config).await
    }

    async fn available_nodes(&self, connection: &Self::Connection) -> anyhow::Result<usize> {
        Ok(connection.describe_cluster().await?.broker_ids.len())
    }

    async fn disconnect(&self, connection: Arc<Self::Connection>) {
        connection.close().await;
    }
}

/// Shared, readiness-gated admin client
pub type AdminClientContext = ConnectionContext<AdminClientFactory>;

/// Build the admin-client context from connection settings
pub fn admin_client_context(
    provider: Arc<dyn AdminClientProvider>,
    config: &ClientConfig,
) -> AdminClientContext {
    let readiness = ReadinessConfig::from(config.readiness);
    ConnectionContext::new(AdminClientFactory::new(provider, config.clone()), readiness)
}
