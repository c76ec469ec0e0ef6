use super::{RuntimeState, ServiceRuntime};
use tracing::debug;

impl ServiceRuntime {
    /// Move to `state` and notify every handle
    pub(super) fn set_state(&self, state: RuntimeState) {
        let previous = self.state.send_replace(state);
        debug!(from = ?previous, to = ?state, "Runtime state changed");
    }

    /// Current runtime state
    pub fn state(&self) -> RuntimeState {
        *self.state.borrow()
    }
}
