//! Structured logging with JSON output and trace correlation.
//!
//! Local diagnostics go to stdout through `tracing-subscriber`. When a
//! tracer provider is supplied, `tracing` spans are also exported through
//! it, so log lines and exported spans share trace ids.

use crate::config::{LogFormat, LoggingConfig};
use crate::TelemetryError;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::TracerProvider as SdkTracerProvider;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize the logging subsystem.
///
/// Installs a global subscriber with either JSON or pretty output. The
/// configured level applies unless `RUST_LOG` is set. Fails if a global
/// subscriber is already installed.
pub fn init_logging(
    config: &LoggingConfig,
    tracer_provider: Option<&SdkTracerProvider>,
) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| TelemetryError::LoggingInit(format!("invalid log level: {}", e)))?;

    let otel_layer = tracer_provider.map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(crate::INSTRUMENTATION_NAME))
    });

    let output = match config.effective_format() {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_span_list(false)
            .with_file(false)
            .with_line_number(false)
            .flatten_event(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(output.with_filter(filter))
        .with(otel_layer)
        .try_init()
        .map_err(|e: tracing_subscriber::util::TryInitError| {
            TelemetryError::LoggingInit(e.to_string())
        })?;

    tracing::info!(
        service = %config.service_name,
        environment = %config.environment,
        format = ?config.effective_format(),
        "logging initialized"
    );
    Ok(())
}

/// Standard log event names.
pub mod events {
    /// A provider was built and cached.
    pub const PROVIDER_CREATED: &str = "provider_created";

    /// A provider lost a creation race and was closed.
    pub const PROVIDER_DISCARDED: &str = "provider_discarded";

    /// A provider was flushed and closed at shutdown.
    pub const PROVIDER_SHUTDOWN: &str = "provider_shutdown";

    /// Flushing or closing a provider failed or timed out.
    pub const PROVIDER_SHUTDOWN_FAILED: &str = "provider_shutdown_failed";

    /// No endpoint is configured for a signal.
    pub const EXPORT_DISABLED: &str = "export_disabled";

    /// TLS material is configured but export is disabled.
    pub const CREDENTIALS_IGNORED: &str = "credentials_ignored";
}

#[macro_export]
macro_rules! log_provider_shutdown {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::PROVIDER_SHUTDOWN,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_provider_shutdown_failed {
    ($($field:tt)*) => {
        tracing::warn!(
            event = $crate::logging::events::PROVIDER_SHUTDOWN_FAILED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_export_disabled {
    ($($field:tt)*) => {
        tracing::debug!(
            event = $crate::logging::events::EXPORT_DISABLED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_credentials_ignored {
    ($($field:tt)*) => {
        tracing::warn!(
            event = $crate::logging::events::CREDENTIALS_IGNORED,
            $($field)*
        )
    };
}
