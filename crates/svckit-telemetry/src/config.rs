//! Telemetry configuration.

use crate::TelemetryError;
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Default delay between trace batch exports.
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Default interval between metric exports.
pub const DEFAULT_METRIC_INTERVAL: Duration = Duration::from_secs(10);

/// Environment variable names read by [`ExporterConfig::from_env`].
pub mod env {
    pub const SERVICE_NAME: &str = "OTEL_SERVICE_NAME";
    pub const ENVIRONMENT: &str = "DEPLOYMENT_ENVIRONMENT";
    pub const ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
    pub const INSECURE: &str = "OTEL_EXPORTER_OTLP_INSECURE";
    pub const TLS_CERT: &str = "OTEL_EXPORTER_OTLP_TLS_CERT";
    pub const TLS_KEY: &str = "OTEL_EXPORTER_OTLP_TLS_KEY";
    pub const TLS_CA: &str = "OTEL_EXPORTER_OTLP_TLS_CA";
    pub const BATCH_TIMEOUT_MS: &str = "OTEL_BSP_SCHEDULE_DELAY";
    pub const METRIC_INTERVAL_MS: &str = "OTEL_METRIC_EXPORT_INTERVAL";
    pub const SAMPLER: &str = "OTEL_TRACES_SAMPLER";
    pub const SAMPLER_ARG: &str = "OTEL_TRACES_SAMPLER_ARG";
}

/// Trace sampling policy.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingPolicy {
    /// Follow the parent's decision, sample root spans (SDK default).
    ParentBased,
    /// Sample every span.
    AlwaysOn,
    /// Drop every span.
    AlwaysOff,
    /// Sample a fraction of traces by trace id (0.0 to 1.0).
    Ratio(f64),
}

impl SamplingPolicy {
    /// Parse a sampler name as used by `OTEL_TRACES_SAMPLER`.
    ///
    /// `arg` is the ratio for `traceidratio`; it defaults to 1.0.
    pub fn parse(name: &str, arg: Option<&str>) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "always_on" => Some(Self::AlwaysOn),
            "always_off" => Some(Self::AlwaysOff),
            "parentbased_always_on" | "parent_based" => Some(Self::ParentBased),
            "traceidratio" | "ratio" => {
                let ratio = match arg {
                    Some(arg) => arg.trim().parse::<f64>().ok().filter(|r| r.is_finite())?,
                    None => 1.0,
                };
                Some(Self::ratio(ratio))
            }
            _ => None,
        }
    }

    /// Ratio sampler, clamped to 0.0..=1.0. NaN samples nothing.
    pub fn ratio(fraction: f64) -> Self {
        if fraction.is_nan() {
            return Self::Ratio(0.0);
        }
        Self::Ratio(fraction.clamp(0.0, 1.0))
    }
}

/// Connection parameters for one exporter.
///
/// An empty `endpoint` disables export: factories return the disabled
/// sentinel instead of a provider.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// Service name; also the cache key for providers.
    pub service_name: String,

    /// Deployment environment (e.g. "production"). May be empty.
    pub environment: String,

    /// OTLP/HTTP collector endpoint, `host:port` or a full URL.
    pub endpoint: String,

    /// Use plain HTTP instead of HTTPS.
    pub insecure: bool,

    /// Base64-encoded PEM client certificate.
    pub tls_cert: Option<String>,

    /// Base64-encoded PEM client private key.
    pub tls_key: Option<String>,

    /// Base64-encoded PEM CA certificate for server verification.
    pub tls_ca: Option<String>,

    /// Delay between trace batch exports. Zero selects the default.
    #[serde(rename = "batch_timeout_ms", deserialize_with = "millis")]
    pub batch_timeout: Duration,

    /// Interval between metric exports. Zero selects the default.
    #[serde(rename = "metric_interval_ms", deserialize_with = "millis")]
    pub metric_interval: Duration,

    /// Trace sampling policy. `None` keeps the SDK default.
    pub sampling: Option<SamplingPolicy>,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            service_name: String::new(),
            environment: String::new(),
            endpoint: String::new(),
            insecure: false,
            tls_cert: None,
            tls_key: None,
            tls_ca: None,
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
            metric_interval: DEFAULT_METRIC_INTERVAL,
            sampling: None,
        }
    }
}

impl ExporterConfig {
    /// Create a config for the given service with export disabled.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Self::default()
        }
    }

    /// Load from the process environment (see [`env`]).
    pub fn from_env() -> Result<Self, TelemetryError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TelemetryError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(name) = lookup(env::SERVICE_NAME) {
            config.service_name = name;
        }
        if let Some(environment) = lookup(env::ENVIRONMENT) {
            config.environment = environment;
        }
        if let Some(endpoint) = lookup(env::ENDPOINT) {
            config.endpoint = endpoint.trim().to_string();
        }
        if let Some(insecure) = lookup(env::INSECURE) {
            config.insecure = parse_bool(env::INSECURE, &insecure)?;
        }
        config.tls_cert = lookup(env::TLS_CERT);
        config.tls_key = lookup(env::TLS_KEY);
        config.tls_ca = lookup(env::TLS_CA);

        if let Some(ms) = lookup(env::BATCH_TIMEOUT_MS) {
            config.batch_timeout = parse_millis(env::BATCH_TIMEOUT_MS, &ms)?;
        }
        if let Some(ms) = lookup(env::METRIC_INTERVAL_MS) {
            config.metric_interval = parse_millis(env::METRIC_INTERVAL_MS, &ms)?;
        }
        if let Some(sampler) = lookup(env::SAMPLER) {
            let arg = lookup(env::SAMPLER_ARG);
            config.sampling = Some(
                SamplingPolicy::parse(&sampler, arg.as_deref()).ok_or_else(|| {
                    TelemetryError::InvalidConfig(match &arg {
                        Some(arg) => format!(
                            "{}: unsupported sampler '{}' with argument '{}'",
                            env::SAMPLER,
                            sampler,
                            arg
                        ),
                        None => format!("{}: unsupported sampler '{}'", env::SAMPLER, sampler),
                    })
                })?,
            );
        }

        Ok(config)
    }

    /// Set the deployment environment.
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Set the collector endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Use plain HTTP instead of HTTPS.
    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Set the base64-encoded client certificate and key.
    pub fn with_client_identity(mut self, cert: impl Into<String>, key: impl Into<String>) -> Self {
        self.tls_cert = Some(cert.into());
        self.tls_key = Some(key.into());
        self
    }

    /// Set the base64-encoded CA certificate.
    pub fn with_ca(mut self, ca: impl Into<String>) -> Self {
        self.tls_ca = Some(ca.into());
        self
    }

    /// Set the trace batch export delay.
    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = timeout;
        self
    }

    /// Set the metric export interval.
    pub fn with_metric_interval(mut self, interval: Duration) -> Self {
        self.metric_interval = interval;
        self
    }

    /// Set the trace sampling policy.
    pub fn with_sampling(mut self, sampling: SamplingPolicy) -> Self {
        self.sampling = Some(sampling);
        self
    }

    /// Whether export is turned off (no endpoint).
    pub fn is_disabled(&self) -> bool {
        self.endpoint.trim().is_empty()
    }

    /// Whether any TLS material is configured.
    pub fn has_tls_material(&self) -> bool {
        self.tls_cert().is_some() || self.tls_key().is_some() || self.tls_ca().is_some()
    }

    /// Client certificate, treating empty strings as unset.
    pub fn tls_cert(&self) -> Option<&str> {
        non_empty(&self.tls_cert)
    }

    /// Client key, treating empty strings as unset.
    pub fn tls_key(&self) -> Option<&str> {
        non_empty(&self.tls_key)
    }

    /// CA certificate, treating empty strings as unset.
    pub fn tls_ca(&self) -> Option<&str> {
        non_empty(&self.tls_ca)
    }

    /// Trace batch delay with the default applied.
    pub fn effective_batch_timeout(&self) -> Duration {
        if self.batch_timeout.is_zero() {
            DEFAULT_BATCH_TIMEOUT
        } else {
            self.batch_timeout
        }
    }

    /// Metric interval with the default applied.
    pub fn effective_metric_interval(&self) -> Duration {
        if self.metric_interval.is_zero() {
            DEFAULT_METRIC_INTERVAL
        } else {
            self.metric_interval
        }
    }

    /// Check the fields a live exporter needs.
    pub fn validate(&self) -> Result<(), TelemetryError> {
        if self.service_name.trim().is_empty() {
            return Err(TelemetryError::InvalidConfig(
                "service name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Structured JSON output (production).
    #[default]
    Json,
    /// Human-readable pretty output (development).
    Pretty,
}

impl LogFormat {
    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" => Some(Self::Pretty),
            _ => None,
        }
    }
}

/// Local log output configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Service name attached to every event.
    pub service_name: String,

    /// Deployment environment; selects the format when none is set.
    pub environment: String,

    /// Log level filter (default: "info"). `RUST_LOG` takes precedence.
    pub level: String,

    /// Explicit output format.
    pub format: Option<LogFormat>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            service_name: String::new(),
            environment: String::new(),
            level: "info".to_string(),
            format: None,
        }
    }
}

impl LoggingConfig {
    /// Create a logging config for a service.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Self::default()
        }
    }

    /// Set the environment.
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Set the log level.
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Set the log format.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Whether the environment is a development one.
    pub fn is_development(&self) -> bool {
        matches!(
            self.environment.to_lowercase().as_str(),
            "development" | "dev" | "local"
        )
    }

    /// The explicit format, or pretty for development and JSON otherwise.
    pub fn effective_format(&self) -> LogFormat {
        match self.format {
            Some(format) => format,
            None if self.is_development() => LogFormat::Pretty,
            None => LogFormat::Json,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_bool(key: &str, value: &str) -> Result<bool, TelemetryError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        other => Err(TelemetryError::InvalidConfig(format!(
            "{key}: expected a boolean, got '{other}'"
        ))),
    }
}

fn parse_millis(key: &str, value: &str) -> Result<Duration, TelemetryError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| {
            TelemetryError::InvalidConfig(format!(
                "{key}: expected milliseconds, got '{value}'"
            ))
        })
}

fn millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}
