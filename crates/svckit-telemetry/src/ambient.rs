//! Process-wide default providers.
//!
//! Tracer and meter providers go to `opentelemetry::global`. The
//! OpenTelemetry API has no global logger provider, so this crate keeps
//! one. Every slot is last-writer-wins: building a second provider of the
//! same kind anywhere in the process replaces the default.

use opentelemetry::global;
use opentelemetry_sdk::logs::LoggerProvider as SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::TracerProvider as SdkTracerProvider;
use parking_lot::RwLock;

static LOGGER_PROVIDER: RwLock<Option<SdkLoggerProvider>> = parking_lot::const_rwlock(None);

/// Install `provider` as the global tracer provider.
pub fn set_tracer_provider(provider: SdkTracerProvider) {
    let _ = global::set_tracer_provider(provider);
}

/// Install `provider` as the global meter provider.
pub fn set_meter_provider(provider: SdkMeterProvider) {
    global::set_meter_provider(provider);
}

/// Install `provider` as the ambient logger provider, returning the
/// previous one.
pub fn set_logger_provider(provider: SdkLoggerProvider) -> Option<SdkLoggerProvider> {
    LOGGER_PROVIDER.write().replace(provider)
}

/// The ambient logger provider, if one was installed.
pub fn logger_provider() -> Option<SdkLoggerProvider> {
    LOGGER_PROVIDER.read().clone()
}

/// Install the W3C trace-context propagator globally.
pub fn install_propagator() {
    global::set_text_map_propagator(TraceContextPropagator::new());
}
