//! Test doubles for code built on the provider cache.
//!
//! Available to this crate's tests and, with the `testing` feature, to
//! downstream crates.

use crate::provider::{Provider, ShutdownError, SignalKind};
use crate::{ExporterConfig, TelemetryError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
struct Recording {
    id: usize,
    fail: bool,
    delay: Option<Duration>,
    shutdowns: AtomicUsize,
}

/// A provider that counts its shutdown calls.
///
/// Clones share the counter, like clones of a real SDK provider share the
/// pipeline.
#[derive(Debug, Clone)]
pub struct RecordingProvider {
    inner: Arc<Recording>,
}

impl RecordingProvider {
    fn with(id: usize, fail: bool, delay: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(Recording {
                id,
                fail,
                delay,
                shutdowns: AtomicUsize::new(0),
            }),
        }
    }

    /// A provider whose shutdown succeeds.
    pub fn new(id: usize) -> Self {
        Self::with(id, false, None)
    }

    /// A provider whose shutdown reports an error.
    pub fn failing(id: usize) -> Self {
        Self::with(id, true, None)
    }

    /// A provider whose shutdown blocks for `delay` before succeeding.
    pub fn slow(id: usize, delay: Duration) -> Self {
        Self::with(id, false, Some(delay))
    }

    /// Identifier given at construction.
    pub fn id(&self) -> usize {
        self.inner.id
    }

    /// Whether two handles point at the same provider.
    pub fn same(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// How many times `shutdown` was called.
    pub fn shutdown_calls(&self) -> usize {
        self.inner.shutdowns.load(Ordering::SeqCst)
    }
}

impl Provider for RecordingProvider {
    const KIND: SignalKind = SignalKind::Traces;

    fn shutdown(&self) -> Result<(), ShutdownError> {
        self.inner.shutdowns.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.inner.delay {
            std::thread::sleep(delay);
        }
        if self.inner.fail {
            return Err(ShutdownError::Failed {
                kind: Self::KIND,
                message: format!("provider {} refused to flush", self.inner.id),
            });
        }
        Ok(())
    }
}

/// A factory with the exporter factory's contract that records every dial
/// instead of opening a connection.
#[derive(Debug, Default)]
pub struct RecordingFactory {
    dials: AtomicUsize,
    built: Mutex<Vec<RecordingProvider>>,
}

impl RecordingFactory {
    /// Create a factory with no recorded dials.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a provider for `config`, or the disabled sentinel when the
    /// config has no endpoint.
    pub fn create(
        &self,
        config: &ExporterConfig,
    ) -> Result<Option<RecordingProvider>, TelemetryError> {
        if config.is_disabled() {
            return Ok(None);
        }
        config.validate()?;

        let id = self.dials.fetch_add(1, Ordering::SeqCst);
        let provider = RecordingProvider::new(id);
        self.built.lock().push(provider.clone());
        Ok(Some(provider))
    }

    /// Number of providers built.
    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    /// Every provider built so far, in build order.
    pub fn built(&self) -> Vec<RecordingProvider> {
        self.built.lock().clone()
    }
}
