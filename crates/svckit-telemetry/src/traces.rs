//! Trace pipeline: OTLP span exporter behind a batch span processor.

use crate::cache::{ProviderCache, Resolved};
use crate::config::SamplingPolicy;
use crate::export;
use crate::provider::SignalKind;
use crate::{ExporterConfig, ResourceDescriptor, TelemetryError};
use opentelemetry::global::{self, BoxedTracer};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::{WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::runtime::Tokio;
use opentelemetry_sdk::trace::{
    BatchConfigBuilder, BatchSpanProcessor, Sampler, TracerProvider as SdkTracerProvider,
};
use std::sync::LazyLock;

static TRACER_PROVIDERS: LazyLock<ProviderCache<SdkTracerProvider>> =
    LazyLock::new(ProviderCache::new);

/// The process-wide tracer provider cache.
pub fn tracer_provider_cache() -> &'static ProviderCache<SdkTracerProvider> {
    &TRACER_PROVIDERS
}

/// Build a tracer provider for `config`, or `None` when export is disabled.
///
/// Must be called within a Tokio runtime: the batch processor spawns its
/// export task on it. Does not touch the cache or the global provider.
pub fn build_tracer_provider(
    config: &ExporterConfig,
    resource: &ResourceDescriptor,
) -> Result<Option<SdkTracerProvider>, TelemetryError> {
    if export::is_disabled(config, SignalKind::Traces) {
        return Ok(None);
    }
    let (endpoint, client) = export::prepare(config, SignalKind::Traces)?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_http_client(client)
        .with_endpoint(endpoint.as_str())
        .with_timeout(export::EXPORT_TIMEOUT)
        .build()
        .map_err(|e| TelemetryError::Construction {
            signal: SignalKind::Traces,
            message: format!("HTTP exporter: {}", e),
        })?;

    let processor = BatchSpanProcessor::builder(exporter, Tokio)
        .with_batch_config(
            BatchConfigBuilder::default()
                .with_scheduled_delay(config.effective_batch_timeout())
                .build(),
        )
        .build();

    let mut builder = SdkTracerProvider::builder()
        .with_span_processor(processor)
        .with_resource(resource.to_resource());
    if let Some(policy) = config.sampling {
        builder = builder.with_sampler(sampler(policy));
    }

    Ok(Some(builder.build()))
}

/// Return the cached tracer provider for `config`'s service, building it on
/// first use.
///
/// A newly built provider becomes the global tracer provider. The caller
/// seeing [`Resolved::is_new_provider`] owns registering its shutdown.
pub fn tracer_provider(
    config: &ExporterConfig,
    resource: &ResourceDescriptor,
) -> Result<Resolved<SdkTracerProvider>, TelemetryError> {
    tracer_provider_in(&TRACER_PROVIDERS, config, resource)
}

/// Like [`tracer_provider`], against an explicit cache.
pub fn tracer_provider_in(
    cache: &ProviderCache<SdkTracerProvider>,
    config: &ExporterConfig,
    resource: &ResourceDescriptor,
) -> Result<Resolved<SdkTracerProvider>, TelemetryError> {
    export::resolve(
        cache,
        config,
        || build_tracer_provider(config, resource),
        |provider| crate::ambient::set_tracer_provider(provider.clone()),
    )
}

/// A tracer from `provider`, or from the global provider when `None`.
///
/// With export disabled and nothing else installed, the global provider is
/// a no-op and so is the returned tracer.
pub fn tracer(provider: Option<&SdkTracerProvider>) -> BoxedTracer {
    match provider {
        Some(provider) => BoxedTracer::new(Box::new(provider.tracer(crate::INSTRUMENTATION_NAME))),
        None => global::tracer(crate::INSTRUMENTATION_NAME),
    }
}

/// Drop every cached tracer provider without shutting it down.
pub fn clear_tracer_cache() {
    TRACER_PROVIDERS.clear();
}

fn sampler(policy: SamplingPolicy) -> Sampler {
    match policy {
        SamplingPolicy::ParentBased => Sampler::ParentBased(Box::new(Sampler::AlwaysOn)),
        SamplingPolicy::AlwaysOn => Sampler::AlwaysOn,
        SamplingPolicy::AlwaysOff => Sampler::AlwaysOff,
        SamplingPolicy::Ratio(ratio) if ratio >= 1.0 => Sampler::AlwaysOn,
        SamplingPolicy::Ratio(ratio) if ratio <= 0.0 => Sampler::AlwaysOff,
        SamplingPolicy::Ratio(ratio) => {
            Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(ratio)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Provider;
    use opentelemetry::trace::{Span, Tracer};

    fn live() -> ExporterConfig {
        // Nothing listens on port 1; export attempts fail fast.
        ExporterConfig::new("orders")
            .with_endpoint("127.0.0.1:1")
            .with_insecure(true)
    }

    #[test]
    fn test_sampler_mapping() {
        assert!(matches!(
            sampler(SamplingPolicy::AlwaysOn),
            Sampler::AlwaysOn
        ));
        assert!(matches!(
            sampler(SamplingPolicy::Ratio(1.0)),
            Sampler::AlwaysOn
        ));
        assert!(matches!(
            sampler(SamplingPolicy::Ratio(0.0)),
            Sampler::AlwaysOff
        ));
        assert!(matches!(
            sampler(SamplingPolicy::Ratio(0.5)),
            Sampler::ParentBased(_)
        ));
    }

    #[test]
    fn test_disabled_builds_nothing() {
        let config = ExporterConfig::new("orders");
        let resource = ResourceDescriptor::new(&config);
        assert!(build_tracer_provider(&config, &resource).unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_build_live_provider() {
        let config = live().with_sampling(SamplingPolicy::ratio(0.5));
        let resource = ResourceDescriptor::new(&config);

        let provider = build_tracer_provider(&config, &resource)
            .unwrap()
            .unwrap();
        let mut span = tracer(Some(&provider)).start("test-span");
        span.end();

        let result = tokio::task::spawn_blocking(move || Provider::shutdown(&provider))
            .await
            .unwrap();
        // The collector is unreachable; only the call itself matters here.
        let _ = result;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cached_provider_is_shared() {
        let cache = ProviderCache::new();
        let config = live();
        let resource = ResourceDescriptor::new(&config);

        let first = tracer_provider_in(&cache, &config, &resource).unwrap();
        let second = tracer_provider_in(&cache, &config, &resource).unwrap();

        assert!(first.is_new_provider());
        assert!(!second.is_new_provider());
        assert_eq!(cache.len(), 1);

        if let Some(provider) = first.into_provider() {
            let _ = tokio::task::spawn_blocking(move || Provider::shutdown(&provider)).await;
        }
    }

    #[test]
    fn test_bad_credentials_fail_construction() {
        let config = live().with_client_identity("%%%", "Zm9v");
        let resource = ResourceDescriptor::new(&config);
        let err = build_tracer_provider(&config, &resource).unwrap_err();
        assert!(matches!(err, TelemetryError::Credential(_)));
    }

    #[test]
    fn test_global_fallback_tracer() {
        let mut span = tracer(None).start("noop");
        span.end();
    }
}
