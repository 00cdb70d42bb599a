//! Lifecycle hooks.

use crate::HookError;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::future::Future;

/// Boxed future returned by a hook callback.
pub type HookFuture = BoxFuture<'static, Result<(), HookError>>;

pub(crate) type HookFn = Box<dyn FnOnce() -> HookFuture + Send>;

/// A named pair of optional start and stop callbacks.
///
/// Each callback runs at most once.
pub struct Hook {
    name: String,
    on_start: Option<HookFn>,
    on_stop: Option<HookFn>,
}

impl Hook {
    /// Create a hook with no callbacks.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            on_start: None,
            on_stop: None,
        }
    }

    /// Set the start callback.
    pub fn on_start<F, Fut>(mut self, start: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        self.on_start = Some(Box::new(move || start().boxed()));
        self
    }

    /// Set the stop callback.
    pub fn on_stop<F, Fut>(mut self, stop: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        self.on_stop = Some(Box::new(move || stop().boxed()));
        self
    }

    /// Hook name, used in logs and errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn has_start(&self) -> bool {
        self.on_start.is_some()
    }

    pub(crate) fn take_start(&mut self) -> Option<HookFn> {
        self.on_start.take()
    }

    pub(crate) fn take_stop(&mut self) -> Option<HookFn> {
        self.on_stop.take()
    }
}

impl std::fmt::Debug for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("on_start", &self.on_start.is_some())
            .field("on_stop", &self.on_stop.is_some())
            .finish()
    }
}
