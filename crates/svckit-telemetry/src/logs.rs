//! Log pipeline: OTLP log exporter behind a batch log processor.

use crate::cache::{ProviderCache, Resolved};
use crate::export;
use crate::provider::SignalKind;
use crate::{ExporterConfig, ResourceDescriptor, TelemetryError};
use opentelemetry_otlp::{WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::logs::LoggerProvider as SdkLoggerProvider;
use opentelemetry_sdk::runtime::Tokio;
use std::sync::LazyLock;

static LOGGER_PROVIDERS: LazyLock<ProviderCache<SdkLoggerProvider>> =
    LazyLock::new(ProviderCache::new);

/// The process-wide logger provider cache.
pub fn logger_provider_cache() -> &'static ProviderCache<SdkLoggerProvider> {
    &LOGGER_PROVIDERS
}

/// Build a logger provider for `config`, or `None` when export is disabled.
///
/// Must be called within a Tokio runtime.
pub fn build_logger_provider(
    config: &ExporterConfig,
    resource: &ResourceDescriptor,
) -> Result<Option<SdkLoggerProvider>, TelemetryError> {
    if export::is_disabled(config, SignalKind::Logs) {
        return Ok(None);
    }
    let (endpoint, client) = export::prepare(config, SignalKind::Logs)?;

    let exporter = opentelemetry_otlp::LogExporter::builder()
        .with_http()
        .with_http_client(client)
        .with_endpoint(endpoint.as_str())
        .with_timeout(export::EXPORT_TIMEOUT)
        .build()
        .map_err(|e| TelemetryError::Construction {
            signal: SignalKind::Logs,
            message: format!("HTTP exporter: {}", e),
        })?;

    Ok(Some(
        SdkLoggerProvider::builder()
            .with_resource(resource.to_resource())
            .with_batch_exporter(exporter, Tokio)
            .build(),
    ))
}

/// Return the cached logger provider for `config`'s service, building it on
/// first use. A newly built provider becomes the ambient logger provider
/// (see [`crate::ambient::logger_provider`]).
pub fn logger_provider(
    config: &ExporterConfig,
    resource: &ResourceDescriptor,
) -> Result<Resolved<SdkLoggerProvider>, TelemetryError> {
    logger_provider_in(&LOGGER_PROVIDERS, config, resource)
}

/// Like [`logger_provider`], against an explicit cache.
pub fn logger_provider_in(
    cache: &ProviderCache<SdkLoggerProvider>,
    config: &ExporterConfig,
    resource: &ResourceDescriptor,
) -> Result<Resolved<SdkLoggerProvider>, TelemetryError> {
    export::resolve(
        cache,
        config,
        || build_logger_provider(config, resource),
        |provider| {
            crate::ambient::set_logger_provider(provider.clone());
        },
    )
}

/// Drop every cached logger provider without shutting it down.
pub fn clear_logger_cache() {
    LOGGER_PROVIDERS.clear();
}
