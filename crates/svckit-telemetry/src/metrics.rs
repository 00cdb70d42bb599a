//! Metric pipeline: OTLP metric exporter behind a periodic reader.

use crate::cache::{ProviderCache, Resolved};
use crate::export;
use crate::provider::SignalKind;
use crate::{ExporterConfig, ResourceDescriptor, TelemetryError};
use opentelemetry::global;
use opentelemetry::metrics::{Meter, MeterProvider as _};
use opentelemetry_otlp::{WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::runtime::Tokio;
use std::sync::LazyLock;

static METER_PROVIDERS: LazyLock<ProviderCache<SdkMeterProvider>> =
    LazyLock::new(ProviderCache::new);

/// The process-wide meter provider cache.
pub fn meter_provider_cache() -> &'static ProviderCache<SdkMeterProvider> {
    &METER_PROVIDERS
}

/// Build a meter provider for `config`, or `None` when export is disabled.
///
/// Must be called within a Tokio runtime.
pub fn build_meter_provider(
    config: &ExporterConfig,
    resource: &ResourceDescriptor,
) -> Result<Option<SdkMeterProvider>, TelemetryError> {
    if export::is_disabled(config, SignalKind::Metrics) {
        return Ok(None);
    }
    let (endpoint, client) = export::prepare(config, SignalKind::Metrics)?;

    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_http()
        .with_http_client(client)
        .with_endpoint(endpoint.as_str())
        .with_timeout(export::EXPORT_TIMEOUT)
        .build()
        .map_err(|e| TelemetryError::Construction {
            signal: SignalKind::Metrics,
            message: format!("HTTP exporter: {}", e),
        })?;

    let reader = PeriodicReader::builder(exporter, Tokio)
        .with_interval(config.effective_metric_interval())
        .build();

    Ok(Some(
        SdkMeterProvider::builder()
            .with_reader(reader)
            .with_resource(resource.to_resource())
            .build(),
    ))
}

/// Return the cached meter provider for `config`'s service, building it on
/// first use. A newly built provider becomes the global meter provider.
pub fn meter_provider(
    config: &ExporterConfig,
    resource: &ResourceDescriptor,
) -> Result<Resolved<SdkMeterProvider>, TelemetryError> {
    meter_provider_in(&METER_PROVIDERS, config, resource)
}

/// Like [`meter_provider`], against an explicit cache.
pub fn meter_provider_in(
    cache: &ProviderCache<SdkMeterProvider>,
    config: &ExporterConfig,
    resource: &ResourceDescriptor,
) -> Result<Resolved<SdkMeterProvider>, TelemetryError> {
    export::resolve(
        cache,
        config,
        || build_meter_provider(config, resource),
        |provider| crate::ambient::set_meter_provider(provider.clone()),
    )
}

/// A meter from `provider`, or from the global provider when `None`.
pub fn meter(provider: Option<&SdkMeterProvider>) -> Meter {
    match provider {
        Some(provider) => provider.meter(crate::INSTRUMENTATION_NAME),
        None => global::meter(crate::INSTRUMENTATION_NAME),
    }
}

/// Drop every cached meter provider without shutting it down.
pub fn clear_meter_cache() {
    METER_PROVIDERS.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Provider;
    use std::time::Duration;

    #[test]
    fn test_disabled_builds_nothing() {
        let config = ExporterConfig::new("orders");
        let resource = ResourceDescriptor::new(&config);
        assert!(build_meter_provider(&config, &resource).unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_build_live_provider() {
        let config = ExporterConfig::new("orders")
            .with_endpoint("127.0.0.1:1")
            .with_insecure(true)
            .with_metric_interval(Duration::from_secs(60));
        let resource = ResourceDescriptor::new(&config);

        let provider = build_meter_provider(&config, &resource)
            .unwrap()
            .unwrap();
        let counter = meter(Some(&provider)).u64_counter("requests").build();
        counter.add(1, &[]);

        // Final export fails against the closed port; shutdown still returns.
        let _ = tokio::task::spawn_blocking(move || Provider::shutdown(&provider)).await;
    }

    #[test]
    fn test_malformed_endpoint_names_metrics() {
        let config = ExporterConfig::new("orders").with_endpoint("http://");
        let resource = ResourceDescriptor::new(&config);
        let err = build_meter_provider(&config, &resource).unwrap_err();
        assert!(matches!(
            err,
            TelemetryError::Construction {
                signal: SignalKind::Metrics,
                ..
            }
        ));
    }

    #[test]
    fn test_global_fallback_meter() {
        let counter = meter(None).u64_counter("noop").build();
        counter.add(1, &[]);
    }
}
