use super::types::{RunOutcome, RuntimeState, ShutdownReason};
use super::{RunSummary, ServiceRuntime};
use crate::component::RunContext;
use crate::error::{panic_text, PatronError, Result};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub(super) type OutcomeMessage = (usize, RunOutcome);

impl ServiceRuntime {
    /// Run every component until the first failure or stop request, then
    /// shut all of them down within the grace period.
    pub async fn run(mut self) -> Result<RunSummary> {
        let mut shutdown_receiver =
            self.shutdown_receiver
                .take()
                .ok_or_else(|| PatronError::System {
                    message: "Shutdown receiver already taken".to_string(),
                })?;
        let signal_bridge = self
            .signal_bridge
            .take()
            .ok_or_else(|| PatronError::System {
                message: "Signal bridge already taken".to_string(),
            })?;

        // Stops the signal bridge once the runtime has terminated
        let bridge_done = CancellationToken::new();
        if self.settings.install_signal_handlers {
            signal_bridge.listen_os(bridge_done.clone())?;
        }
        let bridge_task = signal_bridge.spawn(self.shutdown_trigger.clone(), bridge_done.clone());

        let mut outcome_receiver = self.launch_components();
        let mut outcomes: Vec<Option<RunOutcome>> = vec![None; self.components.len()];
        let mut pending = self.components.len();

        self.set_state(RuntimeState::Running);
        info!(
            components = self.components.len(),
            "Service is running"
        );

        let reason = loop {
            tokio::select! {
                reason = &mut shutdown_receiver => {
                    break reason.map_err(|_| PatronError::System {
                        message: "Shutdown channel closed unexpectedly".to_string(),
                    })?;
                }
                Some((index, outcome)) = outcome_receiver.recv(), if pending > 0 => {
                    pending -= 1;
                    self.record_outcome(&mut outcomes, index, outcome);

                    if pending == 0 {
                        self.shutdown_trigger.fire(ShutdownReason::AllComponentsFinished);
                    }
                }
            }
        };

        info!(%reason, "Shutdown initiated");
        let summary = self
            .shutdown(reason, outcome_receiver, outcomes, pending)
            .await;

        bridge_done.cancel();
        if let Err(e) = bridge_task.await {
            error!("Signal bridge task failed: {}", e);
        }

        Ok(summary)
    }

    /// Spawn one task per component, all reporting to a single channel
    fn launch_components(&self) -> mpsc::UnboundedReceiver<OutcomeMessage> {
        let (outcome_sender, outcome_receiver) = mpsc::unbounded_channel();

        for (index, component) in self.components.iter().enumerate() {
            let component = Arc::clone(component);
            let token = self.cancellation_token.clone();
            let ctx = RunContext::new(token.clone(), Arc::clone(&self.health));
            let outcome_sender = outcome_sender.clone();

            tokio::spawn(async move {
                info!(component = component.name(), "Starting component");

                let result = AssertUnwindSafe(component.run(ctx)).catch_unwind().await;
                let outcome = match result {
                    Ok(Ok(())) if token.is_cancelled() => RunOutcome::Cancelled,
                    Ok(Ok(())) => RunOutcome::StoppedCleanly,
                    Ok(Err(e)) => RunOutcome::Failed(e.to_string()),
                    Err(panic) => RunOutcome::Failed(format!("panicked: {}", panic_text(&*panic))),
                };

                let _ = outcome_sender.send((index, outcome));
            });
        }

        outcome_receiver
    }

    /// Store an outcome and, for a failure, request shutdown.
    ///
    /// Only the first failure becomes the shutdown reason; later ones are
    /// logged and kept in their component's report.
    pub(super) fn record_outcome(
        &self,
        outcomes: &mut [Option<RunOutcome>],
        index: usize,
        outcome: RunOutcome,
    ) {
        let component = self.components[index].name();

        match &outcome {
            RunOutcome::Failed(cause) => {
                let reason = ShutdownReason::ComponentFailure {
                    component: component.to_string(),
                    cause: cause.clone(),
                };
                if self.shutdown_trigger.fire(reason) {
                    error!(component, %cause, "Component failed");
                } else {
                    error!(component, %cause, "Component failed while shutdown was in progress");
                }
            }
            RunOutcome::StoppedCleanly => info!(component, "Component stopped"),
            RunOutcome::Cancelled => info!(component, "Component stopped after cancellation"),
            RunOutcome::TimedOut => {}
        }

        outcomes[index] = Some(outcome);
    }
}
