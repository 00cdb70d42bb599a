//! Keyed OpenTelemetry providers with lifecycle-bound shutdown.
//!
//! This crate provides:
//! - OTLP/HTTP exporter factories for traces, metrics and logs
//! - A keyed provider cache: one live provider per signal and service
//! - Stop hooks that flush and close each created provider exactly once
//! - Resource descriptors, structured logging and W3C Trace Context
//!   propagation
//!
//! An empty endpoint disables export. Factories then return `None` instead
//! of a provider, and that outcome is cached like a live provider.
//!
//! # Usage
//!
//! ```ignore
//! use svckit_lifecycle::Lifecycle;
//! use svckit_telemetry::{ExporterConfig, TelemetryModule};
//!
//! let lifecycle = Lifecycle::new();
//! let config = ExporterConfig::from_env()?;
//! let telemetry = TelemetryModule::install(&config, &lifecycle)?;
//!
//! let users = telemetry.service("user.service");
//! lifecycle.start().await?;
//! // ... serve ...
//! lifecycle.stop().await?;
//! ```

pub mod ambient;
pub mod cache;
pub mod config;
pub mod export;
pub mod logging;
pub mod logs;
pub mod metrics;
pub mod module;
pub mod propagation;
pub mod provider;
pub mod resource;
pub mod service;
pub mod shutdown;
pub mod tls;
pub mod traces;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cache::{Origin, ProviderCache, Resolved};
pub use config::{ExporterConfig, LogFormat, LoggingConfig, SamplingPolicy};
pub use logging::{events, init_logging};
pub use module::TelemetryModule;
pub use provider::{Provider, ShutdownError, SignalKind};
pub use resource::ResourceDescriptor;
pub use service::{BaseService, SpanGuard};
pub use shutdown::{shutdown_provider, DEFAULT_SHUTDOWN_TIMEOUT};
pub use tls::{CredentialArtifact, CredentialError};

use thiserror::Error;

/// Instrumentation scope name for tracers and meters handed out here.
pub const INSTRUMENTATION_NAME: &str = "svckit-telemetry";

/// Telemetry errors.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Configuration is incomplete or malformed.
    #[error("invalid telemetry configuration: {0}")]
    InvalidConfig(String),

    /// TLS material could not be decoded or parsed.
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// The exporter or its transport could not be built.
    #[error("failed to build {signal} exporter: {message}")]
    Construction { signal: SignalKind, message: String },

    /// Failed to initialize logging.
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),
}
