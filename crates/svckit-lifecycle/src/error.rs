//! Error types for the lifecycle.

use crate::State;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Error returned by a single hook callback.
#[derive(Debug, Error)]
pub enum HookError {
    /// The callback reported a failure.
    #[error("{0}")]
    Failed(String),

    /// The callback did not complete within the lifecycle timeout.
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

impl HookError {
    /// Wrap any displayable error as a hook failure.
    pub fn failed(err: impl fmt::Display) -> Self {
        HookError::Failed(err.to_string())
    }
}

/// A stop hook that failed during shutdown.
#[derive(Debug)]
pub struct StopFailure {
    /// Name of the hook.
    pub hook: String,
    /// What went wrong.
    pub error: HookError,
}

impl fmt::Display for StopFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.hook, self.error)
    }
}

/// Lifecycle errors.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// `start` was called on a lifecycle that is not idle.
    #[error("lifecycle already started")]
    AlreadyStarted,

    /// `stop` was called on a lifecycle that is not running.
    #[error("lifecycle is not running (state: {0:?})")]
    NotRunning(State),

    /// A start hook failed; started hooks were rolled back.
    #[error("start hook '{hook}' failed: {source}")]
    Start {
        hook: String,
        #[source]
        source: HookError,
    },

    /// One or more stop hooks failed. Every stop hook was still attempted.
    #[error("{} stop hook(s) failed: {}", .failures.len(), join(.failures))]
    Stop { failures: Vec<StopFailure> },
}

fn join(failures: &[StopFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_error_lists_every_failure() {
        let err = LifecycleError::Stop {
            failures: vec![
                StopFailure {
                    hook: "tracer-provider".into(),
                    error: HookError::failed("export failed"),
                },
                StopFailure {
                    hook: "meter-provider".into(),
                    error: HookError::TimedOut(Duration::from_secs(5)),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "2 stop hook(s) failed: tracer-provider: export failed; meter-provider: timed out after 5s"
        );
    }
}
