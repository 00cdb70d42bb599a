//! Binding providers to the service lifecycle.
//!
//! Every provider that was actually created gets exactly one stop hook.
//! The hook flushes and closes the provider under its own timeout and never
//! fails: shutdown errors are logged so the remaining hooks still run.

use crate::cache::Resolved;
use crate::provider::{Provider, ShutdownError};
use std::time::Duration;
use svckit_lifecycle::Lifecycle;

/// Default bound on flushing and closing one provider.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Flush and close `provider` within `timeout`.
///
/// `None` (export disabled) is a no-op, so whatever a lookup returned can
/// be passed in unchecked. SDK shutdown blocks, so it runs on the blocking
/// pool; on timeout it is left to finish in the background.
pub async fn shutdown_provider<P: Provider>(
    provider: Option<P>,
    timeout: Duration,
) -> Result<(), ShutdownError> {
    let Some(provider) = provider else {
        return Ok(());
    };

    let task = tokio::task::spawn_blocking(move || provider.shutdown());
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(ShutdownError::Failed {
            kind: P::KIND,
            message: join.to_string(),
        }),
        Err(_) => Err(ShutdownError::TimedOut {
            kind: P::KIND,
            timeout,
        }),
    }
}

/// Register a stop hook that shuts `provider` down with the default
/// timeout.
pub fn register_shutdown<P: Provider>(lifecycle: &Lifecycle, key: &str, provider: P) {
    register_shutdown_with_timeout(lifecycle, key, provider, DEFAULT_SHUTDOWN_TIMEOUT);
}

/// Register a stop hook that shuts `provider` down within `timeout`.
pub fn register_shutdown_with_timeout<P: Provider>(
    lifecycle: &Lifecycle,
    key: &str,
    provider: P,
    timeout: Duration,
) {
    let service = key.to_string();
    lifecycle.on_stop(
        format!("{}-provider:{}", P::KIND, key),
        move || async move {
            match shutdown_provider(Some(provider), timeout).await {
                Ok(()) => {
                    crate::log_provider_shutdown!(
                        signal = %P::KIND,
                        service = %service,
                        "telemetry provider shut down"
                    );
                }
                Err(error) => {
                    crate::log_provider_shutdown_failed!(
                        signal = %P::KIND,
                        service = %service,
                        error = %error,
                        "telemetry provider shutdown failed"
                    );
                }
            }
            Ok(())
        },
    );
}

/// Register a stop hook for `resolved` if this lookup created its provider.
///
/// Returns whether a hook was registered. Cached, raced and disabled
/// lookups register nothing, which keeps it to one hook per provider no
/// matter how many components ask for it.
pub fn bind<P: Provider>(lifecycle: &Lifecycle, key: &str, resolved: &Resolved<P>) -> bool {
    match &resolved.provider {
        Some(provider) if resolved.is_new_provider() => {
            register_shutdown(lifecycle, key, provider.clone());
            true
        }
        _ => false,
    }
}
