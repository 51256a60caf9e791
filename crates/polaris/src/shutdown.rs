//! Repeated-signal handling during shutdown.
//!
//! The first request closes the server. A second request while the close is
//! still running is ignored, and any later request with a nonzero code
//! abandons the close and exits immediately.

use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, warn};

/// What the caller should do with a shutdown request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownStep {
    /// Close the server, then exit with `exit_code` if it is nonzero
    Close { exit_code: i32 },
    /// A close is already in flight
    Ignore,
    /// Stop waiting and exit now
    ForceExit(i32),
}

/// Counts shutdown requests for the lifetime of the process.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    calls: AtomicUsize,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a shutdown request carrying `exit_code`.
    pub fn request(&self, exit_code: i32) -> ShutdownStep {
        let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        match calls {
            1 => {
                info!("🛑 Shutting down. Press Ctrl+C to quit immediately.");
                ShutdownStep::Close { exit_code }
            }
            2 => ShutdownStep::Ignore,
            _ if exit_code > 0 => {
                warn!("⚠️ Shutdown requested {} times, exiting immediately", calls);
                ShutdownStep::ForceExit(exit_code)
            }
            _ => ShutdownStep::Ignore,
        }
    }

    pub fn requests(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_request_closes() {
        let coordinator = ShutdownCoordinator::new();
        assert_eq!(coordinator.request(15), ShutdownStep::Close { exit_code: 15 });
        assert_eq!(coordinator.requests(), 1);
    }

    #[test]
    fn test_second_request_is_ignored() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.request(2);
        assert_eq!(coordinator.request(2), ShutdownStep::Ignore);
    }

    #[test]
    fn test_third_request_forces_exit() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.request(2);
        coordinator.request(2);
        assert_eq!(coordinator.request(2), ShutdownStep::ForceExit(2));
        assert_eq!(coordinator.request(15), ShutdownStep::ForceExit(15));
    }

    #[test]
    fn test_zero_code_never_forces_exit() {
        let coordinator = ShutdownCoordinator::new();
        assert_eq!(coordinator.request(0), ShutdownStep::Close { exit_code: 0 });
        coordinator.request(0);
        assert_eq!(coordinator.request(0), ShutdownStep::Ignore);
        assert_eq!(coordinator.requests(), 3);
    }
}
