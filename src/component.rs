//! Capability contract shared by every unit the runtime orchestrates.
//!
//! A component runs until it decides to stop or until the shared
//! cancellation token fires, and it can report its own health at any time
//! while running. The runtime holds components as `Arc<dyn Component>` so the
//! health aggregator can query them concurrently with `run`.

use crate::error::Result;
use crate::health::{HealthAggregator, HealthStatus};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Long-running unit owned by the service runtime
#[async_trait]
pub trait Component: Send + Sync {
    /// Stable name used in logs and run reports
    fn name(&self) -> &str;

    /// Run until stopped or until `ctx` is cancelled.
    ///
    /// Returning `Ok(())` is a clean stop, returning `Err` is a failure that
    /// shuts the whole service down. After cancellation the component must
    /// release its resources, join any task it spawned and return within the
    /// runtime's grace period.
    async fn run(&self, ctx: RunContext) -> Result<()>;

    /// Report current health without blocking for long
    async fn health_check(&self) -> HealthStatus;
}

/// Context handed to every component's `run`
#[derive(Clone)]
pub struct RunContext {
    token: CancellationToken,
    health: Arc<HealthAggregator>,
}

impl RunContext {
    pub(crate) fn new(token: CancellationToken, health: Arc<HealthAggregator>) -> Self {
        Self { token, health }
    }

    /// Resolves once shutdown has begun
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Child token for tasks spawned by the component
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Live view of the service's overall health
    pub fn health(&self) -> &Arc<HealthAggregator> {
        &self.health
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("cancelled", &self.token.is_cancelled())
            .field("components", &self.health.component_count())
            .finish()
    }
}
