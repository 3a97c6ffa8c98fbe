//! Level-triggered cancellation for discovery runs

use tokio_util::sync::CancellationToken;

/// Sticky stop request shared between the controller and the running task
///
/// Once set, the signal stays set until [`clear`](Self::clear). Each clear
/// hands out a fresh token, so a task observing an earlier run's token can
/// never see the new run's state and the new run never inherits a stale stop.
#[derive(Debug, Default)]
pub struct CancellationSignal {
    token: CancellationToken,
}

impl CancellationSignal {
    /// Create a cleared signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the current run
    pub fn set(&self) {
        self.token.cancel();
    }

    /// Whether cancellation has been requested since the last clear
    pub fn is_set(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Reset the signal for a new run
    pub fn clear(&mut self) {
        if self.token.is_cancelled() {
            self.token = CancellationToken::new();
        }
    }

    /// Reader half handed to a task
    pub fn observer(&self) -> CancellationObserver {
        CancellationObserver {
            token: self.token.clone(),
        }
    }
}

/// Non-blocking view of a [`CancellationSignal`], held by the running task
#[derive(Debug, Clone)]
pub struct CancellationObserver {
    token: CancellationToken,
}

impl CancellationObserver {
    /// Poll the signal without waiting
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}
