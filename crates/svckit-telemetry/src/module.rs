//! One-call telemetry setup for a service.

use crate::service::BaseService;
use crate::{ambient, logs, metrics, shutdown, traces};
use crate::{ExporterConfig, ResourceDescriptor, TelemetryError};
use opentelemetry::global::BoxedTracer;
use opentelemetry::metrics::{Meter, MeterProvider as _};
use opentelemetry::trace::noop::NoopTracer;
use opentelemetry_sdk::logs::LoggerProvider as SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::TracerProvider as SdkTracerProvider;
use std::sync::Arc;
use svckit_lifecycle::Lifecycle;

/// Providers, tracer and meter for one service.
///
/// Providers are `None` when export is disabled; the tracer and meter then
/// fall back to the global providers.
#[derive(Clone)]
pub struct TelemetryModule {
    resource: Option<ResourceDescriptor>,
    tracer_provider: Option<SdkTracerProvider>,
    meter_provider: Option<SdkMeterProvider>,
    logger_provider: Option<SdkLoggerProvider>,
    tracer: Arc<BoxedTracer>,
    meter: Meter,
}

impl std::fmt::Debug for TelemetryModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryModule")
            .field(
                "service",
                &self.resource.as_ref().map(|r| r.service_name().to_string()),
            )
            .field("traces", &self.tracer_provider.is_some())
            .field("metrics", &self.meter_provider.is_some())
            .field("logs", &self.logger_provider.is_some())
            .finish()
    }
}

impl TelemetryModule {
    /// Set up trace, metric and log export for `config`'s service.
    ///
    /// Providers come from the process-wide caches, so installing the same
    /// service twice shares them. Each provider this call creates gets one
    /// stop hook on `lifecycle`. Also installs the W3C trace-context
    /// propagator. Must be called within a Tokio runtime when export is
    /// enabled.
    pub fn install(config: &ExporterConfig, lifecycle: &Lifecycle) -> Result<Self, TelemetryError> {
        let resource = ResourceDescriptor::new(config);
        let key = config.service_name.as_str();

        let traces = traces::tracer_provider(config, &resource)?;
        shutdown::bind(lifecycle, key, &traces);

        let metrics = metrics::meter_provider(config, &resource)?;
        shutdown::bind(lifecycle, key, &metrics);

        let logs = logs::logger_provider(config, &resource)?;
        shutdown::bind(lifecycle, key, &logs);

        ambient::install_propagator();

        let tracer_provider = traces.into_provider();
        let meter_provider = metrics.into_provider();
        Ok(Self {
            tracer: Arc::new(traces::tracer(tracer_provider.as_ref())),
            meter: metrics::meter(meter_provider.as_ref()),
            resource: Some(resource),
            tracer_provider,
            meter_provider,
            logger_provider: logs.into_provider(),
        })
    }

    /// A module with no-op instruments and no providers, for tests.
    pub fn noop() -> Self {
        Self {
            resource: None,
            tracer_provider: None,
            meter_provider: None,
            logger_provider: None,
            tracer: Arc::new(BoxedTracer::new(Box::new(NoopTracer::new()))),
            // A meter provider without readers records nothing.
            meter: SdkMeterProvider::builder()
                .build()
                .meter(crate::INSTRUMENTATION_NAME),
        }
    }

    /// Resource descriptor shared by this service's pipelines.
    pub fn resource(&self) -> Option<&ResourceDescriptor> {
        self.resource.as_ref()
    }

    /// Tracer provider, `None` when trace export is disabled.
    pub fn tracer_provider(&self) -> Option<&SdkTracerProvider> {
        self.tracer_provider.as_ref()
    }

    /// Meter provider, `None` when metric export is disabled.
    pub fn meter_provider(&self) -> Option<&SdkMeterProvider> {
        self.meter_provider.as_ref()
    }

    /// Logger provider, `None` when log export is disabled.
    pub fn logger_provider(&self) -> Option<&SdkLoggerProvider> {
        self.logger_provider.as_ref()
    }

    /// Tracer for this service.
    pub fn tracer(&self) -> Arc<BoxedTracer> {
        Arc::clone(&self.tracer)
    }

    /// Meter for this service.
    pub fn meter(&self) -> &Meter {
        &self.meter
    }

    /// A [`BaseService`] for `component` using this module's instruments.
    pub fn service(&self, component: impl Into<String>) -> BaseService {
        BaseService::new(self.tracer(), self.meter.clone(), component)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::{TraceContextExt, Tracer};
    use opentelemetry::Context;

    #[test]
    fn test_noop_module() {
        let module = TelemetryModule::noop();
        assert!(module.tracer_provider().is_none());
        assert!(module.resource().is_none());

        let result: Result<(), std::io::Error> =
            module
                .service("noop.service")
                .with_span(&Context::new(), "Work", |cx| {
                    assert!(!cx.span().span_context().is_sampled());
                    Ok(())
                });
        assert!(result.is_ok());

        let counter = module.meter().u64_counter("noop").build();
        counter.add(1, &[]);
    }

    #[tokio::test]
    async fn test_disabled_install_registers_no_hooks() {
        let lifecycle = Lifecycle::new();
        let module =
            TelemetryModule::install(&ExporterConfig::new("module-disabled"), &lifecycle).unwrap();

        assert!(module.tracer_provider().is_none());
        assert!(module.meter_provider().is_none());
        assert!(module.logger_provider().is_none());
        assert_eq!(
            module.resource().map(|r| r.service_name()),
            Some("module-disabled")
        );
        assert!(lifecycle.is_empty());

        let span = module.tracer().start("fallback");
        drop(span);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_install_twice_shares_providers() {
        let lifecycle = Lifecycle::new();
        let config = ExporterConfig::new("module-live")
            .with_endpoint("127.0.0.1:1")
            .with_insecure(true);

        let first = TelemetryModule::install(&config, &lifecycle).unwrap();
        assert_eq!(lifecycle.len(), 3);

        let second = TelemetryModule::install(&config, &lifecycle).unwrap();
        assert_eq!(lifecycle.len(), 3);
        assert_eq!(
            traces::tracer_provider_cache()
                .peek("module-live")
                .map(|p| p.is_some()),
            Some(true)
        );
        assert!(second.tracer_provider().is_some());
        drop(first);

        lifecycle.start().await.unwrap();
        // Shutdown errors against the closed port are logged, not returned.
        lifecycle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_credentials_fail_install() {
        let lifecycle = Lifecycle::new();
        let config = ExporterConfig::new("module-bad-tls")
            .with_endpoint("collector:4318")
            .with_ca("***");

        let err = TelemetryModule::install(&config, &lifecycle).unwrap_err();
        assert!(matches!(err, TelemetryError::Credential(_)));
        assert!(lifecycle.is_empty());
        assert!(traces::tracer_provider_cache()
            .peek("module-bad-tls")
            .is_none());
    }
}
