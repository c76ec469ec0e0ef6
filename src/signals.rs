//! Bridge between process signals and the runtime.
//!
//! Termination requests (SIGTERM, SIGINT) fire the runtime's shutdown
//! trigger once. Hangup requests (SIGHUP) run the configured handler every
//! time on the blocking pool, so the signal loop never waits on user code
//! and never changes the runtime's state.

use crate::error::Result;
use crate::runtime::{ShutdownReason, ShutdownTrigger};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Callback invoked on every hangup request
pub type HangupHandler = Arc<dyn Fn() + Send + Sync>;

/// Event delivered to the bridge loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalEvent {
    Terminate(String),
    Hangup,
}

/// Injects signal events without going through the OS
#[derive(Debug, Clone)]
pub struct SignalHandle {
    sender: mpsc::UnboundedSender<SignalEvent>,
}

impl SignalHandle {
    /// Request termination as if `name` had been delivered
    pub fn terminate<S: Into<String>>(&self, name: S) -> bool {
        self.sender.send(SignalEvent::Terminate(name.into())).is_ok()
    }

    /// Request a hangup handler invocation
    pub fn hangup(&self) -> bool {
        self.sender.send(SignalEvent::Hangup).is_ok()
    }
}

pub struct SignalBridge {
    sender: mpsc::UnboundedSender<SignalEvent>,
    receiver: mpsc::UnboundedReceiver<SignalEvent>,
    hangup: Option<HangupHandler>,
}

impl SignalBridge {
    pub fn new(hangup: Option<HangupHandler>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver,
            hangup,
        }
    }

    pub fn handle(&self) -> SignalHandle {
        SignalHandle {
            sender: self.sender.clone(),
        }
    }

    /// Subscribe to OS signals and forward them until `done` is cancelled
    pub fn listen_os(&self, done: CancellationToken) -> Result<()> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let subscriptions = [
                (SignalKind::terminate(), SignalEvent::Terminate("SIGTERM".to_string())),
                (SignalKind::interrupt(), SignalEvent::Terminate("SIGINT".to_string())),
                (SignalKind::hangup(), SignalEvent::Hangup),
            ];

            for (kind, event) in subscriptions {
                let mut stream = signal(kind)?;
                let sender = self.sender.clone();
                let done = done.clone();

                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            _ = done.cancelled() => break,
                            received = stream.recv() => {
                                if received.is_none() || sender.send(event.clone()).is_err() {
                                    break;
                                }
                            }
                        }
                    }
                });
            }
        }

        #[cfg(not(unix))]
        {
            let sender = self.sender.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = done.cancelled() => break,
                        received = tokio::signal::ctrl_c() => {
                            if received.is_err()
                                || sender.send(SignalEvent::Terminate("SIGINT".to_string())).is_err()
                            {
                                break;
                            }
                        }
                    }
                }
            });
        }

        info!("Signal handlers installed");
        Ok(())
    }

    /// Run the bridge loop until `done` is cancelled.
    ///
    /// Every hangup starts its own handler invocation on the blocking pool
    /// right away. Invocations still running when the loop stops are awaited
    /// before the returned task completes.
    pub fn spawn(self, trigger: ShutdownTrigger, done: CancellationToken) -> JoinHandle<()> {
        let SignalBridge {
            sender,
            mut receiver,
            hangup,
        } = self;
        drop(sender);

        tokio::spawn(async move {
            let mut handlers = JoinSet::new();

            loop {
                let event = tokio::select! {
                    _ = done.cancelled() => break,
                    Some(finished) = handlers.join_next() => {
                        log_handler_result(finished);
                        continue;
                    }
                    event = receiver.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };

                match event {
                    SignalEvent::Terminate(name) => {
                        if trigger.fire(ShutdownReason::Signal(name.clone())) {
                            info!(signal = %name, "Termination requested");
                        } else {
                            info!(signal = %name, "Shutdown already in progress, ignoring signal");
                        }
                    }
                    SignalEvent::Hangup => match &hangup {
                        Some(handler) => {
                            info!(in_flight = handlers.len(), "Received SIGHUP, dispatching handler");
                            let handler = Arc::clone(handler);
                            handlers.spawn_blocking(move || handler());
                        }
                        None => debug!("Received SIGHUP with no handler configured"),
                    },
                }
            }

            if !handlers.is_empty() {
                info!(in_flight = handlers.len(), "Waiting for SIGHUP handlers to finish");
            }
            while let Some(finished) = handlers.join_next().await {
                log_handler_result(finished);
            }
            debug!("Signal bridge stopped");
        })
    }
}

impl std::fmt::Debug for SignalBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalBridge")
            .field("hangup_handler", &self.hangup.is_some())
            .finish()
    }
}

fn log_handler_result(result: std::result::Result<(), JoinError>) {
    match result {
        Ok(()) => debug!("SIGHUP handler completed"),
        Err(e) if e.is_panic() => error!("SIGHUP handler panicked"),
        Err(e) => warn!("SIGHUP handler did not complete: {}", e),
    }
}
