//! The provider abstraction shared by every signal pipeline.

use opentelemetry_sdk::logs::LoggerProvider as SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::TracerProvider as SdkTracerProvider;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Telemetry signal kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Traces,
    Metrics,
    Logs,
}

impl SignalKind {
    /// OTLP/HTTP path for this signal.
    pub fn otlp_path(self) -> &'static str {
        match self {
            Self::Traces => "/v1/traces",
            Self::Metrics => "/v1/metrics",
            Self::Logs => "/v1/logs",
        }
    }

    /// Short name used in logs and hook names.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Traces => "traces",
            Self::Metrics => "metrics",
            Self::Logs => "logs",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from flushing and closing a provider.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// The provider reported an error while flushing or closing.
    #[error("{kind} provider shutdown failed: {message}")]
    Failed { kind: SignalKind, message: String },

    /// The provider did not finish within the shutdown timeout.
    #[error("{kind} provider shutdown timed out after {timeout:?}")]
    TimedOut { kind: SignalKind, timeout: Duration },
}

/// A live, expensive telemetry resource bound to one exporter connection.
///
/// Clones are handles to the same underlying provider. `shutdown` flushes
/// pending data and releases the connection; it may block.
pub trait Provider: Clone + Send + Sync + 'static {
    /// Which signal this provider exports.
    const KIND: SignalKind;

    /// Flush and close.
    fn shutdown(&self) -> Result<(), ShutdownError>;
}

impl Provider for SdkTracerProvider {
    const KIND: SignalKind = SignalKind::Traces;

    fn shutdown(&self) -> Result<(), ShutdownError> {
        SdkTracerProvider::shutdown(self).map_err(|e| ShutdownError::Failed {
            kind: Self::KIND,
            message: e.to_string(),
        })
    }
}

impl Provider for SdkMeterProvider {
    const KIND: SignalKind = SignalKind::Metrics;

    fn shutdown(&self) -> Result<(), ShutdownError> {
        SdkMeterProvider::shutdown(self).map_err(|e| ShutdownError::Failed {
            kind: Self::KIND,
            message: e.to_string(),
        })
    }
}

impl Provider for SdkLoggerProvider {
    const KIND: SignalKind = SignalKind::Logs;

    fn shutdown(&self) -> Result<(), ShutdownError> {
        SdkLoggerProvider::shutdown(self).map_err(|e| ShutdownError::Failed {
            kind: Self::KIND,
            message: e.to_string(),
        })
    }
}
