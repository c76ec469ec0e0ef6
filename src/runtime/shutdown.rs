use super::run::OutcomeMessage;
use super::types::{ComponentReport, RunOutcome, RuntimeState, ShutdownReason};
use super::{RunSummary, ServiceRuntime};
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, warn};

impl ServiceRuntime {
    /// Cancel every component and collect the outcomes still missing
    pub(super) async fn shutdown(
        &self,
        reason: ShutdownReason,
        mut outcome_receiver: mpsc::UnboundedReceiver<OutcomeMessage>,
        mut outcomes: Vec<Option<RunOutcome>>,
        mut pending: usize,
    ) -> RunSummary {
        self.set_state(RuntimeState::ShuttingDown);
        info!(
            pending,
            grace_period_ms = self.settings.grace_period.as_millis() as u64,
            "Beginning graceful shutdown"
        );

        self.cancellation_token.cancel();

        let deadline = Instant::now() + self.settings.grace_period;
        while pending > 0 {
            match timeout_at(deadline, outcome_receiver.recv()).await {
                Ok(Some((index, outcome))) => {
                    pending -= 1;
                    self.record_outcome(&mut outcomes, index, outcome);
                }
                Ok(None) => break,
                Err(_) => break,
            }
        }

        let reports: Vec<ComponentReport> = self
            .components
            .iter()
            .zip(outcomes)
            .map(|(component, outcome)| {
                let outcome = outcome.unwrap_or_else(|| {
                    warn!(
                        component = component.name(),
                        "Component did not stop within the grace period"
                    );
                    RunOutcome::TimedOut
                });
                ComponentReport {
                    component: component.name().to_string(),
                    outcome,
                }
            })
            .collect();

        let summary = RunSummary::new(reason, reports);
        self.set_state(RuntimeState::Terminated);

        if summary.is_clean() {
            info!("Graceful shutdown completed with exit code: {}", summary.exit_code);
        } else {
            error!(
                reason = %summary.reason,
                "Shutdown completed with exit code: {}", summary.exit_code
            );
        }

        summary
    }
}
