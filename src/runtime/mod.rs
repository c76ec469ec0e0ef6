mod orchestrator;
mod run;
mod shutdown;
mod state;
mod trigger;
mod types;

#[cfg(test)]
mod tests;

pub use orchestrator::{RuntimeHandle, RuntimeSettings, ServiceRuntime};
pub use trigger::ShutdownTrigger;
pub use types::{ComponentReport, RunOutcome, RunSummary, RuntimeState, ShutdownReason};
