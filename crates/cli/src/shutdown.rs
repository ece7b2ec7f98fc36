use crate::error::CliError;
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// OS signal that ended a sync run early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    Interrupt = 1,
    Terminate = 2,
}

impl StopSignal {
    fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(StopSignal::Interrupt),
            2 => Some(StopSignal::Terminate),
            _ => None,
        }
    }
}

impl fmt::Display for StopSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopSignal::Interrupt => f.write_str("SIGINT"),
            StopSignal::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Turns SIGINT/SIGTERM into cancellation of the scheduler's token.
///
/// Cancelling aborts in-flight units and leaves the dataset version
/// untouched; rows already upserted stay in the store.
#[derive(Clone)]
pub struct RunInterrupt {
    cancel: CancellationToken,
    received: Arc<AtomicU8>,
}

impl RunInterrupt {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            received: Arc::new(AtomicU8::new(0)),
        }
    }

    /// Spawns the signal listener. Handler installation failures are logged
    /// and that signal is simply never delivered.
    pub fn listen(&self) {
        let interrupt = self.clone();

        tokio::spawn(async move {
            let ctrl_c = async {
                if let Err(err) = signal::ctrl_c().await {
                    error!("Cannot listen for SIGINT: {}", err);
                    std::future::pending::<()>().await;
                }
            };

            #[cfg(unix)]
            let terminate = async {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                    }
                    Err(err) => {
                        error!("Cannot listen for SIGTERM: {}", err);
                        std::future::pending::<()>().await;
                    }
                }
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            let received = tokio::select! {
                _ = ctrl_c => StopSignal::Interrupt,
                _ = terminate => StopSignal::Terminate,
            };
            interrupt.stop(received);
        });
    }

    /// Records the signal and cancels the run.
    pub fn stop(&self, signal: StopSignal) {
        warn!("{} received, aborting in-flight units; no version will be committed", signal);
        self.received.store(signal as u8, Ordering::SeqCst);
        self.cancel.cancel();
    }

    pub fn received(&self) -> Option<StopSignal> {
        StopSignal::from_raw(self.received.load(Ordering::SeqCst))
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Process exit status of a `matsync` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    Interrupted = 130,
}

impl ExitCode {
    pub fn for_outcome(outcome: &Result<(), CliError>, signalled: Option<StopSignal>) -> Self {
        match outcome {
            Ok(()) => ExitCode::Success,
            Err(err) if err.is_interrupted() || signalled.is_some() => ExitCode::Interrupted,
            Err(_) => ExitCode::GeneralError,
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_config::settings::error::ConfigError;

    #[test]
    fn stop_cancels_the_run_and_remembers_the_signal() {
        let interrupt = RunInterrupt::new(CancellationToken::new());
        let token = interrupt.cancel_token();
        assert_eq!(interrupt.received(), None);

        interrupt.stop(StopSignal::Terminate);

        assert!(token.is_cancelled());
        assert_eq!(interrupt.received(), Some(StopSignal::Terminate));
    }

    #[test]
    fn exit_codes_follow_the_run_outcome() {
        let failed: Result<(), CliError> = Err(ConfigError::Missing("MATSYNC_STORE_URL".into()).into());

        assert_eq!(ExitCode::for_outcome(&Ok(()), None), ExitCode::Success);
        assert_eq!(ExitCode::for_outcome(&failed, None), ExitCode::GeneralError);
        assert_eq!(
            ExitCode::for_outcome(&failed, Some(StopSignal::Interrupt)).as_i32(),
            130
        );
    }
}
