//! Topic reconciliation against a live cluster
//!
//! The controller prepares the desired topics before touching the cluster,
//! then holds one admin client for the observe, plan and apply steps and
//! closes it when they are done.

use super::{ConfigValue, KafkaTopic, TopicSpec, register_topic_extensions, topic};
use crate::admin::{
    AdminClientContext, AdminClientProvider, TopicDescription, admin_client_context,
};
use crate::config::Config;
use converge::{
    ChangePlan, ChangeResult, Error, ExtensionRegistry, NoDuplicateNames, NoProgress,
    ProgressCallback, ReconcileOptions, Reconciler, Result,
};
use log::{debug, info};
use std::sync::Arc;

/// Prefix of topic names reserved for Kafka internals
const INTERNAL_PREFIX: &str = "__";

/// Reconciles `KafkaTopic` resources with one cluster
pub struct TopicController {
    reconciler: Reconciler<TopicSpec>,
    context: Arc<AdminClientContext>,
    options: ReconcileOptions,
}

impl TopicController {
    pub fn new(
        reconciler: Reconciler<TopicSpec>,
        context: Arc<AdminClientContext>,
        options: ReconcileOptions,
    ) -> Self {
        Self {
            reconciler,
            context,
            options,
        }
    }

    /// Build a controller with every topic extension the configuration enables
    pub fn from_config(config: &Config, provider: Arc<dyn AdminClientProvider>) -> Result<Self> {
        let context = Arc::new(admin_client_context(provider, &config.client));
        let mut registry = ExtensionRegistry::new();
        registry.register_validation(NoDuplicateNames);
        register_topic_extensions(&mut registry, config, &context)?;
        Ok(Self::new(Reconciler::new(registry), context, config.reconcile.options()))
    }

    pub fn options(&self) -> ReconcileOptions {
        self.options
    }

    /// Read the topics that currently exist on the cluster
    ///
    /// Internal topics are left out. Configs reported as broker defaults are
    /// marked non-deletable so they are never removed.
    pub async fn describe_observed(&self) -> Result<Vec<KafkaTopic>> {
        let client = self.context.acquire().await?;
        let topics = client
            .list_topics()
            .await
            .map_err(|e| Error::Remote(format!("list topics failed: {e:#}")))?;
        let observed: Vec<KafkaTopic> = topics
            .into_iter()
            .filter(|t| !t.internal && !t.name.starts_with(INTERNAL_PREFIX))
            .map(observed_topic)
            .collect();
        debug!("observed {} topic(s)", observed.len());
        Ok(observed)
    }

    /// Compute the changes a reconciliation would make, without applying them
    pub async fn plan(&self, desired: Vec<KafkaTopic>) -> Result<ChangePlan> {
        let prepared = self.reconciler.prepare(desired)?;
        let mode = self.options.mode;
        self.context
            .with_connection(|_| async move {
                let observed = self.describe_observed().await?;
                self.reconciler.plan(&prepared, &observed, mode)
            })
            .await
    }

    /// Reconcile the cluster with the desired topics
    pub async fn reconcile<P: ProgressCallback>(
        &self,
        desired: Vec<KafkaTopic>,
        progress: &mut P,
    ) -> Result<Vec<ChangeResult>> {
        self.run(desired, self.options, progress).await
    }

    /// [`reconcile`](Self::reconcile) without progress reporting
    pub async fn reconcile_simple(&self, desired: Vec<KafkaTopic>) -> Result<Vec<ChangeResult>> {
        self.reconcile(desired, &mut NoProgress).await
    }

    /// Reconcile in dry-run mode whatever the configured options say
    pub async fn dry_run(&self, desired: Vec<KafkaTopic>) -> Result<Vec<ChangeResult>> {
        let options = ReconcileOptions::new(self.options.mode, true);
        self.run(desired, options, &mut NoProgress).await
    }

    async fn run<P: ProgressCallback>(
        &self,
        desired: Vec<KafkaTopic>,
        options: ReconcileOptions,
        progress: &mut P,
    ) -> Result<Vec<ChangeResult>> {
        let prepared = self.reconciler.prepare(desired)?;
        info!(
            "reconciling {} topic(s) in {:?} mode{}",
            prepared.len(),
            options.mode,
            if options.dry_run { " (dry run)" } else { "" }
        );
        self.context
            .with_connection(|_| async move {
                let observed = self.describe_observed().await?;
                let plan = self.reconciler.plan(&prepared, &observed, options.mode)?;
                self.reconciler.execute(plan, options.dry_run, progress).await
            })
            .await
    }
}

fn observed_topic(description: TopicDescription) -> KafkaTopic {
    let mut spec = TopicSpec::new()
        .with_partitions(description.partitions)
        .with_replicas(description.replication_factor);
    spec.configs = description
        .configs
        .into_iter()
        .map(|(key, entry)| {
            let value = if entry.is_default {
                ConfigValue::protected(entry.value)
            } else {
                ConfigValue::new(entry.value)
            };
            (key, value)
        })
        .collect();
    topic(description.name, spec)
}
