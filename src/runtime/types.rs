use crate::error::PatronError;
use std::fmt;

/// Lifecycle of the service runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    Initializing,
    Running,
    ShuttingDown,
    Terminated,
}

/// Why the runtime began shutting down
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// OS termination request, e.g. "SIGTERM"
    Signal(String),
    /// Programmatic stop through a runtime handle
    Requested,
    /// First component that returned an error
    ComponentFailure { component: String, cause: String },
    /// Every component returned without being asked to
    AllComponentsFinished,
}

impl ShutdownReason {
    /// Whether this reason allows a zero exit status
    pub fn is_clean(&self) -> bool {
        !matches!(self, ShutdownReason::ComponentFailure { .. })
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Signal(name) => write!(f, "received {}", name),
            ShutdownReason::Requested => f.write_str("shutdown requested"),
            ShutdownReason::ComponentFailure { component, cause } => {
                write!(f, "component {} failed: {}", component, cause)
            }
            ShutdownReason::AllComponentsFinished => f.write_str("all components finished"),
        }
    }
}

/// Terminal result of one component's run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Returned on its own before shutdown began
    StoppedCleanly,
    /// Returned with an error or panicked
    Failed(String),
    /// Returned after observing cancellation
    Cancelled,
    /// Did not return within the grace period
    TimedOut,
}

impl RunOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, RunOutcome::StoppedCleanly | RunOutcome::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentReport {
    pub component: String,
    pub outcome: RunOutcome,
}

/// Everything the runtime learned from one run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub reason: ShutdownReason,
    /// One report per component, in registration order
    pub reports: Vec<ComponentReport>,
    pub exit_code: i32,
}

impl RunSummary {
    pub(crate) fn new(reason: ShutdownReason, reports: Vec<ComponentReport>) -> Self {
        let clean = reason.is_clean() && reports.iter().all(|r| r.outcome.is_clean());
        Self {
            reason,
            reports,
            exit_code: if clean { 0 } else { 1 },
        }
    }

    pub fn is_clean(&self) -> bool {
        self.exit_code == 0
    }

    pub fn outcome_of(&self, component: &str) -> Option<&RunOutcome> {
        self.reports
            .iter()
            .find(|r| r.component == component)
            .map(|r| &r.outcome)
    }

    pub fn timed_out(&self) -> impl Iterator<Item = &str> {
        self.reports
            .iter()
            .filter(|r| r.outcome == RunOutcome::TimedOut)
            .map(|r| r.component.as_str())
    }

    /// Convert into an error carrying the dominant cause
    pub fn into_result(self) -> Result<Self, PatronError> {
        if let ShutdownReason::ComponentFailure { component, cause } = &self.reason {
            return Err(PatronError::component(component.as_str(), cause.as_str()));
        }

        if let Some(report) = self.reports.iter().find(|r| !r.outcome.is_clean()) {
            return Err(match &report.outcome {
                RunOutcome::Failed(cause) => {
                    PatronError::component(report.component.as_str(), cause.as_str())
                }
                _ => PatronError::ShutdownTimeout {
                    component: report.component.clone(),
                },
            });
        }

        Ok(self)
    }
}
