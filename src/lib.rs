//! Kafkaform - declarative Kafka topic management
//!
//! Desired topics are described as `KafkaTopic` resources. Kafkaform
//! observes the cluster through an admin client, computes the difference
//! and applies it, reporting one result per topic.
//!
//! # Layout
//!
//! - [`converge`]: the kind-agnostic reconciliation engine
//! - [`admin`]: the admin-client seam and an in-memory cluster
//! - [`topic`]: the `KafkaTopic` kind with its extensions and handlers
//! - [`config`]: TOML configuration
//! - [`logging`]: logger setup
//!
//! # Example
//!
//! ```ignore
//! use kafkaform::admin::memory::InMemoryAdminClient;
//! use kafkaform::config::Config;
//! use kafkaform::topic::{TopicController, TopicSpec, topic};
//! use std::sync::Arc;
//!
//! let config = Config::load_or_default()?;
//! let controller = TopicController::from_config(&config, Arc::new(InMemoryAdminClient::new(3)))?;
//! let results = controller
//!     .reconcile_simple(vec![topic("orders", TopicSpec::new().with_partitions(6))])
//!     .await?;
//! ```

pub mod admin;
pub mod config;
pub mod logging;
pub mod topic;

pub use converge;

pub use admin::{AdminClient, AdminClientContext, AdminClientProvider};
pub use config::{Config, ConfigError};
pub use topic::{KafkaTopic, TopicController, TopicSpec};
