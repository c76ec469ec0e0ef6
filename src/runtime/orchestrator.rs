use super::trigger::ShutdownTrigger;
use super::types::{RuntimeState, ShutdownReason};
use crate::component::Component;
use crate::error::{PatronError, Result};
use crate::health::{HealthAggregator, HealthCheckFn};
use crate::signals::{HangupHandler, SignalBridge, SignalHandle};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;

/// Timing and wiring knobs of the runtime
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    /// Time allowed for components to return after cancellation
    pub grace_period: Duration,
    /// Upper bound for one component health check
    pub health_check_timeout: Duration,
    /// Subscribe to SIGTERM, SIGINT and SIGHUP
    pub install_signal_handlers: bool,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(5),
            health_check_timeout: Duration::from_secs(1),
            install_signal_handlers: true,
        }
    }
}

/// Owns the component set for one run and drives its lifecycle
pub struct ServiceRuntime {
    pub(super) components: Vec<Arc<dyn Component>>,
    pub(super) health: Arc<HealthAggregator>,
    pub(super) settings: RuntimeSettings,
    pub(super) signal_bridge: Option<SignalBridge>,

    // Lifecycle management
    pub(super) state: watch::Sender<RuntimeState>,
    pub(super) shutdown_trigger: ShutdownTrigger,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl ServiceRuntime {
    /// Create a runtime for `components`, rejecting an unusable set
    pub fn new(
        components: Vec<Arc<dyn Component>>,
        health_override: Option<HealthCheckFn>,
        hangup: Option<HangupHandler>,
        settings: RuntimeSettings,
    ) -> Result<Self> {
        if components.is_empty() {
            return Err(PatronError::configuration("components are required"));
        }

        let mut names = HashSet::new();
        for component in &components {
            if !names.insert(component.name()) {
                return Err(PatronError::configuration(format!(
                    "component name '{}' is registered more than once",
                    component.name()
                )));
            }
        }

        if settings.grace_period.is_zero() {
            return Err(PatronError::configuration(
                "grace period must be greater than 0",
            ));
        }

        if settings.health_check_timeout.is_zero() {
            return Err(PatronError::configuration(
                "health check timeout must be greater than 0",
            ));
        }

        let health = Arc::new(HealthAggregator::new(
            components.clone(),
            health_override,
            settings.health_check_timeout,
        ));
        let (state, _) = watch::channel(RuntimeState::Initializing);
        let (shutdown_trigger, shutdown_receiver) = ShutdownTrigger::new();

        Ok(Self {
            components,
            health,
            settings,
            signal_bridge: Some(SignalBridge::new(hangup)),
            state,
            shutdown_trigger,
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Handle for observing and stopping the runtime from elsewhere
    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            state: self.state.subscribe(),
            trigger: self.shutdown_trigger.clone(),
            signals: self.signal_bridge.as_ref().map(SignalBridge::handle),
            health: Arc::clone(&self.health),
        }
    }

    pub fn health(&self) -> &Arc<HealthAggregator> {
        &self.health
    }

    pub fn component_names(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.name()).collect()
    }
}

impl fmt::Debug for ServiceRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRuntime")
            .field("components", &self.component_names())
            .field("settings", &self.settings)
            .field("state", &self.state())
            .field("shutdown_triggered", &self.shutdown_trigger.has_fired())
            .finish()
    }
}

/// Cloneable view of a runtime, usable while it runs
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    state: watch::Receiver<RuntimeState>,
    trigger: ShutdownTrigger,
    signals: Option<SignalHandle>,
    health: Arc<HealthAggregator>,
}

impl RuntimeHandle {
    pub fn state(&self) -> RuntimeState {
        *self.state.borrow()
    }

    /// Wait until the runtime reaches `target` or a later state
    pub async fn wait_for(&mut self, target: RuntimeState) -> RuntimeState {
        let rank = |state: RuntimeState| state as u8;
        match self.state.wait_for(|state| rank(*state) >= rank(target)).await {
            Ok(state) => *state,
            // Sender dropped: the runtime is gone
            Err(_) => RuntimeState::Terminated,
        }
    }

    /// Begin a clean shutdown; returns `false` if one already began
    pub fn shutdown(&self) -> bool {
        self.trigger.fire(ShutdownReason::Requested)
    }

    /// Deliver a hangup as if SIGHUP had been received
    pub fn hangup(&self) -> bool {
        self.signals.as_ref().is_some_and(SignalHandle::hangup)
    }

    /// Deliver a termination request as if `signal` had been received
    pub fn terminate(&self, signal: &str) -> bool {
        self.signals
            .as_ref()
            .is_some_and(|signals| signals.terminate(signal))
    }

    pub fn health(&self) -> &Arc<HealthAggregator> {
        &self.health
    }
}
