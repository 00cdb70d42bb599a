//! W3C Trace Context propagation across process boundaries.
//!
//! Injectors and extractors adapt the two header shapes services pass
//! around: string maps (HTTP-style) and ordered byte-valued headers
//! (message brokers). The helpers go through the global propagator, which
//! [`TelemetryModule`](crate::TelemetryModule) sets to W3C Trace Context.

use opentelemetry::global;
use opentelemetry::propagation::{Extractor, Injector};
use opentelemetry::Context;
use std::collections::HashMap;

/// Message headers as ordered key/value pairs with byte values.
pub type MessageHeaders = Vec<(String, Vec<u8>)>;

/// Injects into a string map.
pub struct MapInjector<'a>(pub &'a mut HashMap<String, String>);

impl Injector for MapInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.0.insert(key.to_string(), value);
    }
}

/// Extracts from a string map.
pub struct MapExtractor<'a>(pub &'a HashMap<String, String>);

impl Extractor for MapExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| v.as_str())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}

/// Injects into message headers.
///
/// Setting a key replaces an existing header with that key rather than
/// appending a duplicate.
pub struct HeaderInjector<'a>(pub &'a mut MessageHeaders);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        match self.0.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value.into_bytes(),
            None => self.0.push((key.to_string(), value.into_bytes())),
        }
    }
}

/// Extracts from message headers. Values that are not UTF-8 are skipped.
pub struct HeaderExtractor<'a>(pub &'a MessageHeaders);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| std::str::from_utf8(v).ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.iter().map(|(k, _)| k.as_str()).collect()
    }
}

/// Inject `cx` into `carrier` with the global propagator.
pub fn inject_context(cx: &Context, carrier: &mut dyn Injector) {
    global::get_text_map_propagator(|propagator| propagator.inject_context(cx, carrier));
}

/// Extract a context from `carrier` with the global propagator.
///
/// Returns an empty context when the carrier holds no trace headers.
pub fn extract_context(carrier: &dyn Extractor) -> Context {
    global::get_text_map_propagator(|propagator| propagator.extract(carrier))
}

/// Inject the current context into message headers.
pub fn inject_into_headers(headers: &mut MessageHeaders) {
    inject_context(&Context::current(), &mut HeaderInjector(headers));
}

/// Extract a context from message headers.
pub fn extract_from_headers(headers: &MessageHeaders) -> Context {
    extract_context(&HeaderExtractor(headers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::propagation::TextMapPropagator;
    use opentelemetry::trace::{
        SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState,
    };
    use opentelemetry_sdk::propagation::TraceContextPropagator;

    const TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    fn remote_context() -> Context {
        let span_context = SpanContext::new(
            TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap(),
            SpanId::from_hex("00f067aa0ba902b7").unwrap(),
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        );
        Context::new().with_remote_span_context(span_context)
    }

    #[test]
    fn test_header_injector_replaces_existing_key() {
        let mut headers: MessageHeaders = vec![("traceparent".to_string(), b"stale".to_vec())];
        let mut injector = HeaderInjector(&mut headers);
        injector.set("traceparent", "fresh".to_string());
        injector.set("tracestate", "k=v".to_string());

        let extractor = HeaderExtractor(&headers);
        assert_eq!(extractor.get("traceparent"), Some("fresh"));
        assert_eq!(extractor.keys(), vec!["traceparent", "tracestate"]);
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn test_header_extractor_skips_non_utf8() {
        let headers: MessageHeaders = vec![("traceparent".to_string(), vec![0xff, 0xfe])];
        let extractor = HeaderExtractor(&headers);
        assert_eq!(extractor.get("traceparent"), None);
        assert_eq!(extractor.get("missing"), None);
    }

    #[test]
    fn test_round_trip_through_message_headers() {
        let propagator = TraceContextPropagator::new();
        let mut headers = MessageHeaders::new();
        propagator.inject_context(&remote_context(), &mut HeaderInjector(&mut headers));

        assert_eq!(HeaderExtractor(&headers).get("traceparent"), Some(TRACEPARENT));

        let extracted = propagator.extract(&HeaderExtractor(&headers));
        let span = extracted.span();
        let span_context = span.span_context();
        assert!(span_context.is_remote());
        assert_eq!(
            span_context.trace_id().to_string(),
            "4bf92f3577b34da6a3ce929d0e0e4736"
        );
    }

    #[test]
    fn test_map_extractor_reads_traceparent() {
        let mut map = HashMap::new();
        map.insert("traceparent".to_string(), TRACEPARENT.to_string());

        let cx = TraceContextPropagator::new().extract(&MapExtractor(&map));
        assert_eq!(
            cx.span().span_context().span_id().to_string(),
            "00f067aa0ba902b7"
        );
    }

    #[test]
    fn test_global_helpers_use_installed_propagator() {
        crate::ambient::install_propagator();

        let mut map = HashMap::new();
        inject_context(&remote_context(), &mut MapInjector(&mut map));
        assert_eq!(map.get("traceparent").map(String::as_str), Some(TRACEPARENT));

        let cx = extract_context(&MapExtractor(&map));
        assert!(cx.span().span_context().is_valid());

        let mut headers = MessageHeaders::new();
        let _guard = remote_context().attach();
        inject_into_headers(&mut headers);
        let cx = extract_from_headers(&headers);
        assert_eq!(
            cx.span().span_context().trace_id().to_string(),
            "4bf92f3577b34da6a3ce929d0e0e4736"
        );
    }
}
