//! Remote connection context and provider traits
//!
//! The connection to the remote control-plane is the only shared mutable
//! resource of a reconciliation. [`ConnectionContext`] owns it as a two-state
//! machine (`Closed` / `Created`) behind an async mutex, connects lazily and
//! optionally blocks until the remote system reports enough nodes.

use crate::error::{Error, Result};
use crate::types::{ChangeResult, Operation};
use async_trait::async_trait;
use futures::FutureExt;
use log::{debug, info, warn};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Provider of connections to the remote system
///
/// Implement this trait to plug a concrete client into the context.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    type Connection: Send + Sync + 'static;

    /// Open a new connection
    async fn connect(&self) -> anyhow::Result<Self::Connection>;

    /// Number of nodes the remote system currently reports as available
    async fn available_nodes(&self, connection: &Self::Connection) -> anyhow::Result<usize>;

    /// Close a connection; called exactly once per successful `connect`
    async fn disconnect(&self, _connection: Arc<Self::Connection>) {}
}

/// Readiness gate settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessConfig {
    /// Wait for the remote system before handing out the connection
    pub enabled: bool,
    /// Minimum number of available nodes
    pub min_available_nodes: usize,
    /// Give up after this long
    pub timeout: Duration,
    /// Pause between two polls
    pub retry_backoff: Duration,
}

impl ReadinessConfig {
    /// No readiness wait
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_available_nodes: 1,
            timeout: Duration::from_secs(60),
            retry_backoff: Duration::from_secs(1),
        }
    }
}

/// Lifecycle state of a [`ConnectionContext`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Created,
}

/// Lazily created, readiness-gated connection to the remote system
pub struct ConnectionContext<F: ConnectionFactory> {
    factory: F,
    readiness: ReadinessConfig,
    connection: Mutex<Option<Arc<F::Connection>>>,
}

impl<F: ConnectionFactory> ConnectionContext<F> {
    pub fn new(factory: F, readiness: ReadinessConfig) -> Self {
        Self {
            factory,
            readiness,
            connection: Mutex::new(None),
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Current lifecycle state
    pub async fn state(&self) -> ConnectionState {
        if self.connection.lock().await.is_some() {
            ConnectionState::Created
        } else {
            ConnectionState::Closed
        }
    }

    /// Get the connection, creating it on first use
    ///
    /// Concurrent callers are serialized: only one connection is ever
    /// created, and the readiness wait happens under the lock. When the
    /// readiness gate times out the fresh connection is closed again and the
    /// context stays `Closed`.
    pub async fn acquire(&self) -> Result<Arc<F::Connection>> {
        let mut guard = self.connection.lock().await;
        if let Some(connection) = guard.as_ref() {
            return Ok(Arc::clone(connection));
        }

        debug!("opening connection to remote system");
        let connection = self
            .factory
            .connect()
            .await
            .map(Arc::new)
            .map_err(|e| Error::Connection(format!("{e:#}")))?;

        if self.readiness.enabled
            && let Err(e) = self.wait_until_ready(&connection).await
        {
            self.factory.disconnect(connection).await;
            return Err(e);
        }

        *guard = Some(Arc::clone(&connection));
        Ok(connection)
    }

    /// Close the connection if one is open; later calls do nothing
    pub async fn release(&self) {
        let connection = self.connection.lock().await.take();
        if let Some(connection) = connection {
            debug!("closing connection to remote system");
            self.factory.disconnect(connection).await;
        }
    }

    /// Run `f` with the connection and release it afterwards
    ///
    /// The connection is released whether `f` succeeds, fails or panics.
    pub async fn with_connection<T, Fun, Fut>(&self, f: Fun) -> Result<T>
    where
        Fun: FnOnce(Arc<F::Connection>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let connection = self.acquire().await?;
        let outcome = AssertUnwindSafe(async move { f(connection).await })
            .catch_unwind()
            .await;
        self.release().await;
        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    async fn wait_until_ready(&self, connection: &F::Connection) -> Result<()> {
        let ReadinessConfig {
            min_available_nodes: required,
            timeout,
            retry_backoff,
            ..
        } = self.readiness;
        let start = Instant::now();

        loop {
            let available = match self.factory.available_nodes(connection).await {
                Ok(n) => n,
                Err(e) => {
                    warn!("readiness check failed: {e:#}");
                    0
                }
            };
            if available >= required {
                info!("remote system ready: {available} node(s) available");
                return Ok(());
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(Error::ReadinessTimeout {
                    required,
                    available,
                    elapsed_ms: elapsed.as_millis(),
                });
            }

            let pause = retry_backoff.min(timeout - elapsed);
            warn!(
                "{available}/{required} node(s) available, retrying in {}ms",
                pause.as_millis()
            );
            tokio::time::sleep(pause).await;
        }
    }
}

/// Progress callback for change execution
///
/// Implement this trait to receive progress updates while changes are
/// applied.
pub trait ProgressCallback: Send {
    /// Called before a batch of changes for one operation is submitted
    fn on_batch_start(&mut self, operation: Operation, count: usize);

    /// Called once per change when its outcome is known
    fn on_change_complete(&mut self, result: &ChangeResult);

    /// Called when all outcomes of a batch are known
    fn on_batch_complete(&mut self, operation: Operation);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_batch_start(&mut self, _operation: Operation, _count: usize) {}
    fn on_change_complete(&mut self, _result: &ChangeResult) {}
    fn on_batch_complete(&mut self, _operation: Operation) {}
}
