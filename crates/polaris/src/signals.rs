//! Signal handling for graceful server shutdown.
//!
//! Unix platforms listen for SIGINT and SIGTERM; Windows only has Ctrl+C,
//! which is reported as an interrupt.

use std::fmt;
use tokio::signal;

/// A termination request received from the operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT / Ctrl+C
    Interrupt,
    /// SIGTERM
    Terminate,
}

impl ShutdownSignal {
    /// Process exit status reported after a shutdown caused by this signal.
    pub fn exit_code(self) -> i32 {
        match self {
            ShutdownSignal::Interrupt => 2,
            ShutdownSignal::Terminate => 15,
        }
    }
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownSignal::Interrupt => write!(f, "SIGINT"),
            ShutdownSignal::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// Registered signal streams. Every call to [`SignalListener::recv`] waits
/// for the next signal, so repeated Ctrl+C presses are all observed.
pub struct SignalListener {
    #[cfg(unix)]
    interrupt: signal::unix::Signal,
    #[cfg(unix)]
    terminate: signal::unix::Signal,
}

impl SignalListener {
    /// Installs the signal handlers.
    ///
    /// # Returns
    ///
    /// The listener, or an error if the platform refused the registration.
    pub fn new() -> std::io::Result<Self> {
        #[cfg(unix)]
        {
            use signal::unix::{signal, SignalKind};

            Ok(Self {
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
            })
        }

        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Waits for the next termination signal.
    pub async fn recv(&mut self) -> std::io::Result<ShutdownSignal> {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.interrupt.recv() => Ok(ShutdownSignal::Interrupt),
                _ = self.terminate.recv() => Ok(ShutdownSignal::Terminate),
            }
        }

        #[cfg(not(unix))]
        {
            signal::ctrl_c().await?;
            Ok(ShutdownSignal::Interrupt)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ShutdownSignal::Interrupt.exit_code(), 2);
        assert_eq!(ShutdownSignal::Terminate.exit_code(), 15);
        assert_eq!(ShutdownSignal::Terminate.to_string(), "SIGTERM");
    }
}
