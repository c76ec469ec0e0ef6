pub mod component;
pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod runtime;
pub mod scheduler;
pub mod service;
pub mod signals;

pub use component::{Component, RunContext};
pub use config::PatronConfig;
pub use error::{HttpError, PatronError, Result};
pub use health::{HealthAggregator, HealthCheckFn, HealthReport, HealthStatus};
pub use http::{HttpComponent, Route, ServiceInfo};
pub use runtime::{
    ComponentReport, RunOutcome, RunSummary, RuntimeHandle, RuntimeSettings, RuntimeState,
    ServiceRuntime, ShutdownReason,
};
pub use scheduler::IntervalScheduler;
pub use service::{Service, ServiceBuilder};
pub use signals::{HangupHandler, SignalBridge, SignalHandle};
