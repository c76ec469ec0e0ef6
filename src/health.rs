use crate::component::Component;
use futures::future::join_all;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Health reported by a single component or by the whole service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Unknown,
}

impl HealthStatus {
    pub fn is_healthy(self) -> bool {
        self == HealthStatus::Healthy
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Operator supplied replacement for the default health reduction
pub type HealthCheckFn = Arc<dyn Fn() -> HealthStatus + Send + Sync>;

/// Reduce component statuses to one overall status.
///
/// Any `Unhealthy` wins, then any `Unknown`; an empty set is `Healthy`.
pub fn reduce<I>(statuses: I) -> HealthStatus
where
    I: IntoIterator<Item = HealthStatus>,
{
    let mut overall = HealthStatus::Healthy;
    for status in statuses {
        match status {
            HealthStatus::Unhealthy => return HealthStatus::Unhealthy,
            HealthStatus::Unknown => overall = HealthStatus::Unknown,
            HealthStatus::Healthy => {}
        }
    }
    overall
}

/// Health of one component at the time of the check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentHealthReport {
    pub component: String,
    pub status: HealthStatus,
}

/// Overall health with per-component detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    /// Empty when the status came from an override
    pub components: Vec<ComponentHealthReport>,
    pub overridden: bool,
}

/// Queries every component's health on demand and reduces the results
pub struct HealthAggregator {
    components: Vec<Arc<dyn Component>>,
    health_override: Option<HealthCheckFn>,
    check_timeout: Duration,
}

impl HealthAggregator {
    pub fn new(
        components: Vec<Arc<dyn Component>>,
        health_override: Option<HealthCheckFn>,
        check_timeout: Duration,
    ) -> Self {
        Self {
            components,
            health_override,
            check_timeout,
        }
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn is_overridden(&self) -> bool {
        self.health_override.is_some()
    }

    /// Current overall health
    pub async fn status(&self) -> HealthStatus {
        if let Some(health_override) = &self.health_override {
            return health_override();
        }

        reduce(self.check_all().await.into_iter().map(|report| report.status))
    }

    /// Current overall health with component detail
    pub async fn report(&self) -> HealthReport {
        if let Some(health_override) = &self.health_override {
            return HealthReport {
                status: health_override(),
                components: Vec::new(),
                overridden: true,
            };
        }

        let components = self.check_all().await;
        HealthReport {
            status: reduce(components.iter().map(|report| report.status)),
            components,
            overridden: false,
        }
    }

    async fn check_all(&self) -> Vec<ComponentHealthReport> {
        let checks = self.components.iter().map(|component| async move {
            let status = match timeout(self.check_timeout, component.health_check()).await {
                Ok(status) => status,
                Err(_) => {
                    warn!(
                        component = component.name(),
                        timeout_ms = self.check_timeout.as_millis() as u64,
                        "Health check timed out"
                    );
                    HealthStatus::Unknown
                }
            };
            debug!(component = component.name(), %status, "Health check completed");

            ComponentHealthReport {
                component: component.name().to_string(),
                status,
            }
        });

        join_all(checks).await
    }
}

impl fmt::Debug for HealthAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.components.iter().map(|c| c.name()).collect();
        f.debug_struct("HealthAggregator")
            .field("components", &names)
            .field("overridden", &self.health_override.is_some())
            .field("check_timeout", &self.check_timeout)
            .finish()
    }
}
