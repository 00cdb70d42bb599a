//! Resource descriptors: the identity attached to every exported signal.

use crate::ExporterConfig;
use opentelemetry::{Key, KeyValue, Value};
use opentelemetry_sdk::Resource;
use std::sync::Arc;

/// Standard resource attribute keys.
pub mod attributes {
    pub const SERVICE_NAME: &str = "service.name";
    pub const DEPLOYMENT_ENVIRONMENT: &str = "deployment.environment";
    pub const HOST_NAME: &str = "host.name";
    pub const HOST_ARCH: &str = "host.arch";
    pub const OS_TYPE: &str = "os.type";
    pub const PROCESS_PID: &str = "process.pid";
    pub const PROCESS_EXECUTABLE_NAME: &str = "process.executable.name";
    pub const PROCESS_EXECUTABLE_PATH: &str = "process.executable.path";
    pub const PROCESS_OWNER: &str = "process.owner";
    pub const PROCESS_RUNTIME_NAME: &str = "process.runtime.name";
}

/// Immutable identity of one service instance.
///
/// Cheap to clone: clones share the underlying resource, so the trace,
/// metric and log pipelines of a service all carry the same attributes.
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    service_name: String,
    environment: String,
    resource: Arc<Resource>,
}

impl ResourceDescriptor {
    /// Build the descriptor for a config.
    ///
    /// Host and process metadata is best-effort: anything that cannot be
    /// determined in the current environment is left out.
    pub fn new(config: &ExporterConfig) -> Self {
        let mut attrs = vec![
            KeyValue::new(attributes::SERVICE_NAME, config.service_name.clone()),
            KeyValue::new(
                attributes::DEPLOYMENT_ENVIRONMENT,
                config.environment.clone(),
            ),
        ];
        attrs.extend(host_attributes());
        attrs.extend(process_attributes());

        // SDK defaults (telemetry.sdk.*, OTEL_RESOURCE_ATTRIBUTES) lose to ours.
        let resource = Resource::default().merge(&Resource::new(attrs));

        Self {
            service_name: config.service_name.clone(),
            environment: config.environment.clone(),
            resource: Arc::new(resource),
        }
    }

    /// Service name; the cache key for this service's providers.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Deployment environment, possibly empty.
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Look up an attribute.
    pub fn get(&self, key: &'static str) -> Option<Value> {
        self.resource.get(Key::from_static_str(key))
    }

    /// Number of attributes, SDK defaults included.
    pub fn len(&self) -> usize {
        self.resource.len()
    }

    /// Whether the descriptor carries no attributes.
    pub fn is_empty(&self) -> bool {
        self.resource.is_empty()
    }

    /// The SDK resource, for attaching to a provider builder.
    pub fn to_resource(&self) -> Resource {
        Resource::clone(&self.resource)
    }
}

fn host_attributes() -> Vec<KeyValue> {
    let mut attrs = vec![
        KeyValue::new(attributes::HOST_ARCH, host_arch()),
        KeyValue::new(attributes::OS_TYPE, std::env::consts::OS),
    ];
    if let Some(name) = hostname::get().ok().and_then(|h| h.into_string().ok()) {
        attrs.push(KeyValue::new(attributes::HOST_NAME, name));
    }
    attrs
}

fn process_attributes() -> Vec<KeyValue> {
    let mut attrs = vec![
        KeyValue::new(attributes::PROCESS_PID, i64::from(std::process::id())),
        KeyValue::new(attributes::PROCESS_RUNTIME_NAME, "rust"),
    ];

    if let Ok(exe) = std::env::current_exe() {
        if let Some(name) = exe.file_name().and_then(|n| n.to_str()) {
            attrs.push(KeyValue::new(
                attributes::PROCESS_EXECUTABLE_NAME,
                name.to_string(),
            ));
        }
        if let Some(path) = exe.to_str() {
            attrs.push(KeyValue::new(
                attributes::PROCESS_EXECUTABLE_PATH,
                path.to_string(),
            ));
        }
    }

    // No portable user lookup in std; containers often run without either.
    if let Some(owner) = ["USER", "USERNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
    {
        attrs.push(KeyValue::new(attributes::PROCESS_OWNER, owner));
    }

    attrs
}

// Semantic-convention names for the common architectures.
fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "x86",
        "arm" => "arm32",
        "powerpc64" => "ppc64",
        "s390x" => "s390x",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> ResourceDescriptor {
        ResourceDescriptor::new(&ExporterConfig::new("orders").with_environment("staging"))
    }

    #[test]
    fn test_required_attributes() {
        let descriptor = descriptor();
        assert_eq!(descriptor.service_name(), "orders");
        assert_eq!(descriptor.environment(), "staging");
        assert_eq!(
            descriptor.get(attributes::SERVICE_NAME),
            Some(Value::from("orders"))
        );
        assert_eq!(
            descriptor.get(attributes::DEPLOYMENT_ENVIRONMENT),
            Some(Value::from("staging"))
        );
    }

    #[test]
    fn test_process_metadata() {
        let descriptor = descriptor();
        assert_eq!(
            descriptor.get(attributes::PROCESS_PID),
            Some(Value::I64(i64::from(std::process::id())))
        );
        assert!(descriptor.get(attributes::OS_TYPE).is_some());
        assert!(descriptor.get(attributes::HOST_ARCH).is_some());
    }

    #[test]
    fn test_sdk_defaults_are_kept() {
        let descriptor = descriptor();
        assert!(descriptor.get("telemetry.sdk.language").is_some());
        assert!(descriptor.len() > 2);
    }

    #[test]
    fn test_empty_environment_is_allowed() {
        let descriptor = ResourceDescriptor::new(&ExporterConfig::new("orders"));
        assert_eq!(descriptor.environment(), "");
        assert_eq!(
            descriptor.get(attributes::SERVICE_NAME),
            Some(Value::from("orders"))
        );
    }

    #[test]
    fn test_clones_share_resource() {
        let a = descriptor();
        let b = a.clone();
        assert!(Arc::ptr_eq(&a.resource, &b.resource));
    }
}
