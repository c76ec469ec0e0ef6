use crate::component::{Component, RunContext};
use crate::error::{PatronError, Result};
use crate::health::HealthStatus;
use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

type Job = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Component that runs a job on a fixed period until cancelled.
///
/// A failing job marks the component unhealthy. When a failure threshold is
/// set, that many consecutive failures stop the component with an error.
pub struct IntervalScheduler {
    name: String,
    period: Duration,
    job: Job,
    failure_threshold: Option<u32>,
    status: Mutex<HealthStatus>,
    consecutive_failures: AtomicU32,
    runs: AtomicU64,
}

impl IntervalScheduler {
    pub fn new<N, F, Fut>(name: N, period: Duration, job: F) -> Self
    where
        N: Into<String>,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            period,
            job: Arc::new(move || -> BoxFuture<'static, Result<()>> { Box::pin(job()) }),
            failure_threshold: None,
            status: Mutex::new(HealthStatus::Unknown),
            consecutive_failures: AtomicU32::new(0),
            runs: AtomicU64::new(0),
        }
    }

    /// Stop with an error after `failures` consecutive job failures
    pub fn with_failure_threshold(mut self, failures: u32) -> Self {
        self.failure_threshold = Some(failures.max(1));
        self
    }

    /// Number of completed job executions
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::SeqCst)
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        *self.status.lock() = HealthStatus::Healthy;
    }

    /// Returns the new count of consecutive failures
    fn record_failure(&self, error: &PatronError) -> u32 {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        *self.status.lock() = HealthStatus::Unhealthy;
        warn!(component = %self.name, failures, "Scheduled job failed: {}", error);
        failures
    }
}

#[async_trait]
impl Component for IntervalScheduler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: RunContext) -> Result<()> {
        info!(
            component = %self.name,
            period_ms = self.period.as_millis() as u64,
            "Scheduler started"
        );

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ctx.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // Dropping the job future on cancellation leaves nothing running
            let result = tokio::select! {
                _ = ctx.cancelled() => break,
                result = (self.job)() => result,
            };
            self.runs.fetch_add(1, Ordering::SeqCst);

            match result {
                Ok(()) => {
                    debug!(component = %self.name, "Scheduled job completed");
                    self.record_success();
                }
                Err(e) => {
                    let failures = self.record_failure(&e);
                    if self.failure_threshold.is_some_and(|limit| failures >= limit) {
                        return Err(PatronError::component(
                            self.name.as_str(),
                            format!("{} consecutive job failures, last: {}", failures, e),
                        ));
                    }
                }
            }
        }

        info!(component = %self.name, "Scheduler stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        *self.status.lock()
    }
}
