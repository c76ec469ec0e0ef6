use super::ShutdownReason;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

/// Single termination-decision point shared by signals, handles and the
/// outcome loop. Only the first `fire` is delivered.
#[derive(Clone)]
pub struct ShutdownTrigger {
    sender: Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>,
}

impl ShutdownTrigger {
    pub fn new() -> (Self, oneshot::Receiver<ShutdownReason>) {
        let (sender, receiver) = oneshot::channel();
        let trigger = Self {
            sender: Arc::new(Mutex::new(Some(sender))),
        };
        (trigger, receiver)
    }

    /// Deliver `reason` if no earlier reason was delivered.
    ///
    /// Returns `true` for the call that won.
    pub fn fire(&self, reason: ShutdownReason) -> bool {
        match self.sender.lock().take() {
            Some(sender) => {
                let _ = sender.send(reason);
                true
            }
            None => {
                debug!(%reason, "Shutdown already triggered, ignoring");
                false
            }
        }
    }

    pub fn has_fired(&self) -> bool {
        self.sender.lock().is_none()
    }
}

impl std::fmt::Debug for ShutdownTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownTrigger")
            .field("fired", &self.has_fired())
            .finish()
    }
}
