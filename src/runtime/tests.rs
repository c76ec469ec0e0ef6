use super::*;
use crate::component::{Component, RunContext};
use crate::error::{PatronError, Result};
use crate::health::{HealthCheckFn, HealthStatus};
use crate::signals::HangupHandler;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone)]
enum Behavior {
    /// Run until cancelled
    UntilCancelled,
    /// Fail after a delay
    FailAfter(Duration, &'static str),
    /// Return cleanly after a delay
    FinishAfter(Duration),
    /// Ignore cancellation entirely
    Stubborn,
    /// Take `Duration` to stop after cancellation, then fail with the cause
    FailOnStop(Duration, &'static str),
    /// Take `Duration` to stop after cancellation
    SlowStop(Duration),
    Panic,
}

struct TestComponent {
    name: &'static str,
    behavior: Behavior,
    health: HealthStatus,
    starts: Arc<AtomicUsize>,
    saw_cancel: AtomicBool,
}

impl TestComponent {
    fn new(name: &'static str, behavior: Behavior) -> Arc<Self> {
        Self::with_counter(name, behavior, Arc::new(AtomicUsize::new(0)))
    }

    fn with_counter(
        name: &'static str,
        behavior: Behavior,
        starts: Arc<AtomicUsize>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            behavior,
            health: HealthStatus::Healthy,
            starts,
            saw_cancel: AtomicBool::new(false),
        })
    }

    fn unhealthy(name: &'static str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            name,
            behavior,
            health: HealthStatus::Unhealthy,
            starts: Arc::new(AtomicUsize::new(0)),
            saw_cancel: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Component for TestComponent {
    fn name(&self) -> &str {
        self.name
    }

    async fn run(&self, ctx: RunContext) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);

        match self.behavior.clone() {
            Behavior::UntilCancelled => {
                ctx.cancelled().await;
                self.saw_cancel.store(true, Ordering::SeqCst);
                Ok(())
            }
            Behavior::FailAfter(delay, cause) => {
                tokio::select! {
                    _ = ctx.cancelled() => {
                        self.saw_cancel.store(true, Ordering::SeqCst);
                        Ok(())
                    }
                    _ = tokio::time::sleep(delay) => Err(PatronError::system(cause)),
                }
            }
            Behavior::FinishAfter(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            Behavior::Stubborn => {
                std::future::pending::<()>().await;
                Ok(())
            }
            Behavior::FailOnStop(delay, cause) => {
                ctx.cancelled().await;
                self.saw_cancel.store(true, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                Err(PatronError::system(cause))
            }
            Behavior::SlowStop(delay) => {
                ctx.cancelled().await;
                self.saw_cancel.store(true, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                Ok(())
            }
            Behavior::Panic => panic!("boom"),
        }
    }

    async fn health_check(&self) -> HealthStatus {
        self.health
    }
}

fn settings(grace_period: Duration) -> RuntimeSettings {
    RuntimeSettings {
        grace_period,
        health_check_timeout: Duration::from_millis(100),
        install_signal_handlers: false,
    }
}

fn runtime(components: Vec<Arc<dyn Component>>) -> ServiceRuntime {
    runtime_with(components, None, None, Duration::from_secs(1))
}

fn runtime_with(
    components: Vec<Arc<dyn Component>>,
    health_override: Option<HealthCheckFn>,
    hangup: Option<HangupHandler>,
    grace_period: Duration,
) -> ServiceRuntime {
    ServiceRuntime::new(components, health_override, hangup, settings(grace_period)).unwrap()
}

async fn run_with_timeout(runtime: ServiceRuntime) -> RunSummary {
    tokio::time::timeout(Duration::from_secs(5), runtime.run())
        .await
        .expect("runtime did not terminate")
        .unwrap()
}

fn failure_cause(summary: &RunSummary) -> (&str, &str) {
    match &summary.reason {
        ShutdownReason::ComponentFailure { component, cause } => (component, cause),
        other => panic!("unexpected reason: {:?}", other),
    }
}

#[test]
fn test_empty_component_list_rejected() {
    let result = ServiceRuntime::new(Vec::new(), None, None, settings(Duration::from_secs(1)));

    assert!(matches!(result, Err(PatronError::Configuration { .. })));
}

#[test]
fn test_duplicate_component_names_rejected() {
    let result = ServiceRuntime::new(
        vec![
            TestComponent::new("worker", Behavior::UntilCancelled),
            TestComponent::new("worker", Behavior::UntilCancelled),
        ],
        None,
        None,
        settings(Duration::from_secs(1)),
    );

    assert!(result.unwrap_err().is_configuration());
}

#[tokio::test]
async fn test_launches_every_component_once() {
    let starts = Arc::new(AtomicUsize::new(0));
    let components: Vec<Arc<dyn Component>> = ["a", "b", "c", "d", "e"]
        .into_iter()
        .map(|name| {
            TestComponent::with_counter(name, Behavior::UntilCancelled, Arc::clone(&starts))
                as Arc<dyn Component>
        })
        .collect();

    let runtime = runtime(components);
    let mut handle = runtime.handle();
    assert_eq!(handle.state(), RuntimeState::Initializing);

    let task = tokio::spawn(run_with_timeout(runtime));

    assert_eq!(handle.wait_for(RuntimeState::Running).await, RuntimeState::Running);
    tokio::time::timeout(Duration::from_secs(1), async {
        while starts.load(Ordering::SeqCst) < 5 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    assert!(handle.shutdown());
    let summary = task.await.unwrap();

    assert_eq!(starts.load(Ordering::SeqCst), 5);
    assert_eq!(summary.reason, ShutdownReason::Requested);
    assert_eq!(summary.exit_code, 0);
    assert_eq!(summary.reports.len(), 5);
    assert!(summary
        .reports
        .iter()
        .all(|r| r.outcome == RunOutcome::Cancelled));
    assert_eq!(handle.state(), RuntimeState::Terminated);
}

#[tokio::test]
async fn test_first_failure_cancels_the_rest() {
    let failing = TestComponent::new(
        "consumer",
        Behavior::FailAfter(Duration::from_millis(50), "broker connection lost"),
    );
    let b = TestComponent::new("scheduler", Behavior::UntilCancelled);
    let c = TestComponent::new(
        "grpc",
        Behavior::FailOnStop(Duration::from_millis(20), "late failure"),
    );

    let summary = run_with_timeout(runtime(vec![failing.clone(), b.clone(), c.clone()])).await;

    assert_eq!(
        failure_cause(&summary),
        ("consumer", "System error: broker connection lost")
    );
    assert_eq!(summary.exit_code, 1);
    assert!(b.saw_cancel.load(Ordering::SeqCst));
    assert!(c.saw_cancel.load(Ordering::SeqCst));
    assert_eq!(summary.outcome_of("scheduler"), Some(&RunOutcome::Cancelled));
    assert_eq!(
        summary.outcome_of("grpc"),
        Some(&RunOutcome::Failed("System error: late failure".to_string()))
    );
    assert!(matches!(
        summary.into_result(),
        Err(PatronError::ComponentFailure { component, .. }) if component == "consumer"
    ));
}

#[tokio::test]
async fn test_simultaneous_failures_keep_one_cause() {
    let components: Vec<Arc<dyn Component>> = (0..4)
        .map(|i| {
            let name: &'static str = ["w0", "w1", "w2", "w3"][i];
            TestComponent::new(name, Behavior::FailAfter(Duration::from_millis(20), "crash"))
                as Arc<dyn Component>
        })
        .collect();

    let summary = run_with_timeout(runtime(components)).await;

    let (component, _) = failure_cause(&summary);
    assert!(["w0", "w1", "w2", "w3"].contains(&component));
    assert_eq!(summary.exit_code, 1);
    assert!(summary
        .reports
        .iter()
        .all(|r| matches!(r.outcome, RunOutcome::Failed(_) | RunOutcome::Cancelled)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_stop_requests_trigger_once() {
    let runtime = runtime(vec![
        TestComponent::new("http", Behavior::UntilCancelled),
        TestComponent::new("consumer", Behavior::UntilCancelled),
    ]);
    let mut handle = runtime.handle();
    let task = tokio::spawn(run_with_timeout(runtime));
    handle.wait_for(RuntimeState::Running).await;

    let requests: Vec<_> = (0..16)
        .map(|i| {
            let handle = handle.clone();
            tokio::spawn(async move {
                if i % 2 == 0 {
                    handle.terminate("SIGTERM");
                    false
                } else {
                    handle.shutdown()
                }
            })
        })
        .collect();

    let mut direct_wins = 0;
    for request in requests {
        if request.await.unwrap() {
            direct_wins += 1;
        }
    }
    let summary = task.await.unwrap();

    assert!(direct_wins <= 1);
    match &summary.reason {
        ShutdownReason::Requested => assert_eq!(direct_wins, 1),
        ShutdownReason::Signal(name) => {
            assert_eq!(name, "SIGTERM");
            assert_eq!(direct_wins, 0);
        }
        other => panic!("unexpected reason: {:?}", other),
    }
    assert_eq!(summary.exit_code, 0);
    assert!(!handle.shutdown());
}

#[tokio::test]
async fn test_signal_stop_is_clean_and_second_signal_ignored() {
    let runtime = runtime(vec![
        TestComponent::new("http", Behavior::UntilCancelled),
        TestComponent::new("scheduler", Behavior::SlowStop(Duration::from_millis(50))),
    ]);
    let mut handle = runtime.handle();
    let task = tokio::spawn(run_with_timeout(runtime));
    handle.wait_for(RuntimeState::Running).await;

    assert!(handle.terminate("SIGTERM"));
    handle.wait_for(RuntimeState::ShuttingDown).await;
    handle.terminate("SIGINT");

    let summary = task.await.unwrap();

    assert_eq!(summary.reason, ShutdownReason::Signal("SIGTERM".to_string()));
    assert_eq!(summary.exit_code, 0);
    assert!(summary.into_result().is_ok());
}

#[tokio::test]
async fn test_stubborn_component_times_out() {
    let grace_period = Duration::from_millis(200);
    let runtime = runtime_with(
        vec![
            TestComponent::new("http", Behavior::UntilCancelled),
            TestComponent::new("legacy", Behavior::Stubborn),
        ],
        None,
        None,
        grace_period,
    );
    let mut handle = runtime.handle();
    let task = tokio::spawn(run_with_timeout(runtime));
    handle.wait_for(RuntimeState::Running).await;

    let stop_requested = Instant::now();
    handle.shutdown();
    let summary = task.await.unwrap();
    let elapsed = stop_requested.elapsed();

    assert!(elapsed >= grace_period);
    assert!(elapsed < grace_period + Duration::from_millis(500));
    assert_eq!(summary.outcome_of("legacy"), Some(&RunOutcome::TimedOut));
    assert_eq!(summary.outcome_of("http"), Some(&RunOutcome::Cancelled));
    assert_eq!(summary.timed_out().collect::<Vec<_>>(), vec!["legacy"]);
    assert_eq!(summary.exit_code, 1);
    assert_eq!(handle.state(), RuntimeState::Terminated);
}

#[tokio::test]
async fn test_hangups_invoke_handler_without_shutdown() {
    let calls = Arc::new(AtomicUsize::new(0));
    let handler_calls = Arc::clone(&calls);
    let hangup: HangupHandler = Arc::new(move || {
        handler_calls.fetch_add(1, Ordering::SeqCst);
    });

    let runtime = runtime_with(
        vec![TestComponent::new("http", Behavior::UntilCancelled)],
        None,
        Some(hangup),
        Duration::from_secs(1),
    );
    let mut handle = runtime.handle();
    let task = tokio::spawn(run_with_timeout(runtime));
    handle.wait_for(RuntimeState::Running).await;

    for _ in 0..7 {
        assert!(handle.hangup());
    }

    tokio::time::timeout(Duration::from_secs(2), async {
        while calls.load(Ordering::SeqCst) < 7 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 7);
    assert_eq!(handle.state(), RuntimeState::Running);

    handle.shutdown();
    let summary = task.await.unwrap();
    assert_eq!(summary.exit_code, 0);
}

#[tokio::test]
async fn test_all_finite_components_finish_cleanly() {
    let summary = run_with_timeout(runtime(vec![
        TestComponent::new("migrate", Behavior::FinishAfter(Duration::from_millis(10))),
        TestComponent::new("seed", Behavior::FinishAfter(Duration::from_millis(30))),
    ]))
    .await;

    assert_eq!(summary.reason, ShutdownReason::AllComponentsFinished);
    assert_eq!(summary.exit_code, 0);
    assert!(summary
        .reports
        .iter()
        .all(|r| r.outcome == RunOutcome::StoppedCleanly));
}

#[tokio::test]
async fn test_panicking_component_is_a_failure() {
    let summary = run_with_timeout(runtime(vec![
        TestComponent::new("http", Behavior::UntilCancelled),
        TestComponent::new("fragile", Behavior::Panic),
    ]))
    .await;

    assert_eq!(failure_cause(&summary), ("fragile", "panicked: boom"));
    assert_eq!(summary.exit_code, 1);
}

#[tokio::test]
async fn test_health_reflects_components_while_running() {
    let runtime = runtime(vec![
        TestComponent::new("http", Behavior::UntilCancelled),
        TestComponent::unhealthy("consumer", Behavior::UntilCancelled),
    ]);
    let mut handle = runtime.handle();
    let task = tokio::spawn(run_with_timeout(runtime));
    handle.wait_for(RuntimeState::Running).await;

    assert_eq!(handle.health().status().await, HealthStatus::Unhealthy);

    handle.shutdown();
    task.await.unwrap();
}

#[tokio::test]
async fn test_override_honoured_through_failure_and_shutdown() {
    let runtime = runtime_with(
        vec![
            TestComponent::new("http", Behavior::SlowStop(Duration::from_millis(300))),
            TestComponent::unhealthy(
                "consumer",
                Behavior::FailAfter(Duration::from_millis(200), "partition revoked"),
            ),
            TestComponent::new("scheduler", Behavior::UntilCancelled),
        ],
        Some(Arc::new(|| HealthStatus::Healthy)),
        None,
        Duration::from_secs(2),
    );
    let mut handle = runtime.handle();
    let started = Instant::now();
    let task = tokio::spawn(run_with_timeout(runtime));

    handle.wait_for(RuntimeState::Running).await;
    assert_eq!(handle.health().status().await, HealthStatus::Healthy);

    assert_eq!(
        handle.wait_for(RuntimeState::ShuttingDown).await,
        RuntimeState::ShuttingDown
    );
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(handle.health().status().await, HealthStatus::Healthy);

    let summary = task.await.unwrap();

    assert_eq!(
        failure_cause(&summary),
        ("consumer", "System error: partition revoked")
    );
    assert_eq!(summary.exit_code, 1);
    assert_eq!(summary.outcome_of("http"), Some(&RunOutcome::Cancelled));
    assert_eq!(summary.outcome_of("scheduler"), Some(&RunOutcome::Cancelled));
}
