//! Shared plumbing for the OTLP/HTTP exporter factories.
//!
//! Each signal module builds its own exporter and provider; this module owns
//! the parts they have in common: the disabled check, the endpoint URL and
//! the HTTP client carrying the TLS material.

use crate::cache::{ProviderCache, Resolved};
use crate::provider::{Provider, SignalKind};
use crate::tls::TlsMaterial;
use crate::{ExporterConfig, TelemetryError};
use reqwest::Url;
use std::time::Duration;

/// Timeout for a single export request.
pub const EXPORT_TIMEOUT: Duration = Duration::from_secs(10);

/// Whether `config` turns export off for `kind`.
///
/// Logs a warning when TLS material is configured without an endpoint, as
/// that is usually a deployment mistake.
pub fn is_disabled(config: &ExporterConfig, kind: SignalKind) -> bool {
    if !config.is_disabled() {
        return false;
    }
    if config.has_tls_material() {
        crate::log_credentials_ignored!(
            signal = %kind,
            service = %config.service_name,
            "TLS material configured without an endpoint, export stays disabled"
        );
    }
    crate::log_export_disabled!(
        signal = %kind,
        service = %config.service_name,
        "no OTLP endpoint configured"
    );
    true
}

/// Full OTLP/HTTP URL for a signal.
///
/// `host:port` endpoints get `http://` when insecure and `https://`
/// otherwise. The signal path is appended when the endpoint has none.
pub fn signal_endpoint(config: &ExporterConfig, kind: SignalKind) -> Result<Url, TelemetryError> {
    let raw = config.endpoint.trim();
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else if config.insecure {
        format!("http://{}", raw)
    } else {
        format!("https://{}", raw)
    };

    let mut url = Url::parse(&with_scheme).map_err(|e| TelemetryError::Construction {
        signal: kind,
        message: format!("invalid endpoint '{}': {}", raw, e),
    })?;

    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(TelemetryError::Construction {
            signal: kind,
            message: format!("invalid endpoint '{}': missing host", raw),
        });
    }
    if !matches!(url.scheme(), "http" | "https") {
        return Err(TelemetryError::Construction {
            signal: kind,
            message: format!("invalid endpoint '{}': unsupported scheme", raw),
        });
    }

    if url.path().is_empty() || url.path() == "/" {
        url.set_path(kind.otlp_path());
    }
    Ok(url)
}

/// HTTP client for an exporter, carrying the config's TLS material.
pub fn http_client(
    config: &ExporterConfig,
    kind: SignalKind,
) -> Result<reqwest::Client, TelemetryError> {
    let mut builder = reqwest::Client::builder()
        .use_rustls_tls()
        .min_tls_version(reqwest::tls::Version::TLS_1_2)
        .timeout(EXPORT_TIMEOUT);

    if let Some(material) = TlsMaterial::from_config(config)? {
        tracing::debug!(
            signal = %kind,
            client_identity = material.has_identity(),
            ca_certificates = material.ca_count(),
            "applying exporter TLS material"
        );
        builder = material.apply(builder)?;
    }

    builder.build().map_err(|e| TelemetryError::Construction {
        signal: kind,
        message: format!("HTTP client: {}", e),
    })
}

/// Checks shared by every factory before it builds anything: a service
/// name, a valid endpoint and a working HTTP client.
pub(crate) fn prepare(
    config: &ExporterConfig,
    kind: SignalKind,
) -> Result<(Url, reqwest::Client), TelemetryError> {
    config.validate()?;
    let endpoint = signal_endpoint(config, kind)?;
    let client = http_client(config, kind)?;
    Ok((endpoint, client))
}

/// Look up the provider for `config` in `cache`, building it on a miss.
///
/// `install` runs once for a newly cached provider, before it is returned.
/// A live config replaces a cached disabled entry for the same service.
pub(crate) fn resolve<P, B, I>(
    cache: &ProviderCache<P>,
    config: &ExporterConfig,
    build: B,
    install: I,
) -> Result<Resolved<P>, TelemetryError>
where
    P: Provider,
    B: FnOnce() -> Result<Option<P>, TelemetryError>,
    I: FnOnce(&P),
{
    let key = config.service_name.as_str();
    let resolved = if config.is_disabled() {
        cache.get_or_create(key, build)?
    } else {
        cache.get_or_enable(key, build)?
    };

    if resolved.is_new_provider() {
        if let Some(provider) = &resolved.provider {
            install(provider);
        }
        tracing::info!(
            event = crate::logging::events::PROVIDER_CREATED,
            signal = %P::KIND,
            service = %key,
            endpoint = %config.endpoint,
            "telemetry provider created"
        );
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingFactory, RecordingProvider};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(endpoint: &str) -> ExporterConfig {
        ExporterConfig::new("orders").with_endpoint(endpoint)
    }

    #[test]
    fn test_host_port_gets_scheme_and_path() {
        let url = signal_endpoint(&config("collector:4318"), SignalKind::Traces).unwrap();
        assert_eq!(url.as_str(), "https://collector:4318/v1/traces");

        let url = signal_endpoint(
            &config("collector:4318").with_insecure(true),
            SignalKind::Metrics,
        )
        .unwrap();
        assert_eq!(url.as_str(), "http://collector:4318/v1/metrics");
    }

    #[test]
    fn test_full_url_keeps_scheme_and_path() {
        let url = signal_endpoint(
            &config("http://collector:4318/custom/logs").with_insecure(false),
            SignalKind::Logs,
        )
        .unwrap();
        assert_eq!(url.as_str(), "http://collector:4318/custom/logs");

        let url = signal_endpoint(&config("https://collector:4318/"), SignalKind::Logs).unwrap();
        assert_eq!(url.as_str(), "https://collector:4318/v1/logs");
    }

    #[test]
    fn test_malformed_endpoint_is_construction_error() {
        for endpoint in ["http://", "collector:notaport", "ftp://collector:21"] {
            let err = signal_endpoint(&config(endpoint), SignalKind::Traces).unwrap_err();
            assert!(
                matches!(
                    err,
                    TelemetryError::Construction {
                        signal: SignalKind::Traces,
                        ..
                    }
                ),
                "{endpoint}: {err}"
            );
        }
    }

    #[test]
    fn test_disabled_check() {
        assert!(is_disabled(&ExporterConfig::new("orders"), SignalKind::Traces));
        assert!(is_disabled(
            &ExporterConfig::new("orders").with_ca("Y2E="),
            SignalKind::Traces
        ));
        assert!(!is_disabled(&config("collector:4318"), SignalKind::Traces));
    }

    #[test]
    fn test_prepare_requires_service_name() {
        let err = prepare(
            &ExporterConfig::new("").with_endpoint("collector:4318"),
            SignalKind::Traces,
        )
        .unwrap_err();
        assert!(matches!(err, TelemetryError::InvalidConfig(_)));
    }

    #[test]
    fn test_prepare_surfaces_credential_errors() {
        let err = prepare(
            &config("collector:4318").with_ca("not base64!"),
            SignalKind::Traces,
        )
        .unwrap_err();
        assert!(matches!(err, TelemetryError::Credential(_)));
        assert!(err.to_string().contains("CA"), "{err}");
    }

    #[test]
    fn test_mismatched_identity_is_credential_error() {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;

        let a = rcgen::generate_simple_self_signed(vec!["collector.local".to_string()]).unwrap();
        let b = rcgen::generate_simple_self_signed(vec!["collector.local".to_string()]).unwrap();
        let config = config("collector.local:4318").with_client_identity(
            STANDARD.encode(a.cert.pem()),
            STANDARD.encode(b.key_pair.serialize_pem()),
        );

        let err = http_client(&config, SignalKind::Traces).unwrap_err();
        match err {
            TelemetryError::Credential(err) => {
                assert_eq!(err.artifact(), crate::CredentialArtifact::KeyPair)
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_resolve_installs_once() {
        let cache = ProviderCache::<RecordingProvider>::new();
        let factory = RecordingFactory::new();
        let installs = AtomicUsize::new(0);
        let live = config("collector:4318");

        for _ in 0..3 {
            resolve(
                &cache,
                &live,
                || factory.create(&live),
                |_| {
                    installs.fetch_add(1, Ordering::SeqCst);
                },
            )
            .unwrap();
        }

        assert_eq!(installs.load(Ordering::SeqCst), 1);
        assert_eq!(factory.dials(), 1);
    }

    #[test]
    fn test_resolve_disabled_installs_nothing() {
        let cache = ProviderCache::<RecordingProvider>::new();
        let factory = RecordingFactory::new();
        let off = ExporterConfig::new("orders");

        let resolved = resolve(&cache, &off, || factory.create(&off), |_| {
            panic!("disabled provider must not be installed")
        })
        .unwrap();

        assert!(resolved.provider.is_none());
        assert_eq!(factory.dials(), 0);
    }
}
