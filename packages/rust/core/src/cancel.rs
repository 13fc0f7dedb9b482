//! Cooperative cancellation for extraction runs.

use tokio_util::sync::CancellationToken;

/// Cancellation signal for one run.
///
/// Cancellation is cooperative: the orchestrator checks the signal only
/// *between* sources. A source already being processed runs to completion
/// and its candidates are kept; no further sources start. Remote
/// collaborators that want mid-call cancellation can watch [`token`].
///
/// [`token`]: CancellationController::token
#[derive(Debug, Clone, Default)]
pub struct CancellationController {
    token: CancellationToken,
}

impl CancellationController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn signal(&self) {
        self.token.cancel();
    }

    pub fn is_signalled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The underlying token, for collaborators that can abort in-flight work.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_signal() {
        let controller = CancellationController::new();
        let ui_side = controller.clone();
        assert!(!controller.is_signalled());

        ui_side.signal();
        ui_side.signal();
        assert!(controller.is_signalled());
        assert!(controller.token().is_cancelled());
    }
}
