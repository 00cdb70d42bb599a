//! Start/stop lifecycle for service components.
//!
//! A [`Lifecycle`] collects hooks from components while they are being
//! constructed and drives them once the service boots and shuts down:
//! - start hooks run in registration order
//! - stop hooks run in reverse registration order, and only for hooks whose
//!   start succeeded
//!
//! Every hook runs under its own timeout. A failing or hanging stop hook
//! never prevents the remaining stop hooks from running.
//!
//! # Usage
//!
//! ```ignore
//! use svckit_lifecycle::{Hook, HookError, Lifecycle};
//!
//! let lifecycle = Lifecycle::new();
//! lifecycle.append(
//!     Hook::new("database")
//!         .on_start(|| async { Ok(()) })
//!         .on_stop(|| async { Ok(()) }),
//! );
//!
//! lifecycle.start().await?;
//! // ... serve ...
//! lifecycle.stop().await?;
//! ```

mod error;
mod hook;

pub use error::{HookError, LifecycleError, StopFailure};
pub use hook::{Hook, HookFuture};

use hook::HookFn;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Default per-hook start timeout.
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(15);

/// Default per-hook stop timeout.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(15);

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Hooks are being registered; nothing has started.
    Idle,
    /// Start hooks are running.
    Starting,
    /// All start hooks completed.
    Running,
    /// Stop hooks are running.
    Stopping,
    /// Stop hooks have run (or a failed start was rolled back).
    Stopped,
}

struct Inner {
    hooks: Vec<Hook>,
    /// Number of hooks (from the front) whose start completed.
    started: usize,
    state: State,
}

/// Builder for a [`Lifecycle`] with custom timeouts.
#[derive(Debug, Clone)]
pub struct LifecycleBuilder {
    start_timeout: Duration,
    stop_timeout: Duration,
}

impl Default for LifecycleBuilder {
    fn default() -> Self {
        Self {
            start_timeout: DEFAULT_START_TIMEOUT,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

impl LifecycleBuilder {
    /// Set the timeout applied to each start hook.
    pub fn start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }

    /// Set the timeout applied to each stop hook.
    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Build the lifecycle.
    pub fn build(self) -> Lifecycle {
        Lifecycle {
            inner: Arc::new(Mutex::new(Inner {
                hooks: Vec::new(),
                started: 0,
                state: State::Idle,
            })),
            start_timeout: self.start_timeout,
            stop_timeout: self.stop_timeout,
        }
    }
}

/// Ordered collection of start/stop hooks.
///
/// Cloning is cheap; clones share the same hooks and state, so a lifecycle
/// can be handed to every component constructor.
#[derive(Clone)]
pub struct Lifecycle {
    inner: Arc<Mutex<Inner>>,
    start_timeout: Duration,
    stop_timeout: Duration,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Lifecycle")
            .field("hooks", &inner.hooks.len())
            .field("started", &inner.started)
            .field("state", &inner.state)
            .field("start_timeout", &self.start_timeout)
            .field("stop_timeout", &self.stop_timeout)
            .finish()
    }
}

impl Lifecycle {
    /// Create a lifecycle with default timeouts.
    pub fn new() -> Self {
        LifecycleBuilder::default().build()
    }

    /// Start building a lifecycle with custom timeouts.
    pub fn builder() -> LifecycleBuilder {
        LifecycleBuilder::default()
    }

    /// Register a hook.
    ///
    /// Hooks may be appended while start hooks are running; they are started
    /// in turn. Once the lifecycle is running, a stop-only hook counts as
    /// started and runs on [`stop`](Self::stop); a hook with a start callback
    /// is ignored because its start would never run. Hooks appended while
    /// stopping or after the lifecycle has stopped never run.
    pub fn append(&self, hook: Hook) {
        let mut inner = self.inner.lock();
        match inner.state {
            State::Idle | State::Starting => inner.hooks.push(hook),
            State::Running if !hook.has_start() => {
                // All earlier hooks are started, so the new one joins the prefix.
                inner.hooks.push(hook);
                inner.started = inner.hooks.len();
            }
            State::Running => {
                tracing::warn!(hook = %hook.name(), "hook with a start callback appended to a running lifecycle, ignoring");
            }
            State::Stopping | State::Stopped => {
                tracing::warn!(hook = %hook.name(), state = ?inner.state, "hook appended to a stopping lifecycle, ignoring");
            }
        }
    }

    /// Register a hook with only a start callback.
    pub fn on_start<F, Fut>(&self, name: impl Into<String>, start: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        self.append(Hook::new(name).on_start(start));
    }

    /// Register a hook with only a stop callback.
    pub fn on_stop<F, Fut>(&self, name: impl Into<String>, stop: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        self.append(Hook::new(name).on_stop(stop));
    }

    /// Register a hook with both a start and a stop callback.
    pub fn on_start_stop<S, SFut, T, TFut>(&self, name: impl Into<String>, start: S, stop: T)
    where
        S: FnOnce() -> SFut + Send + 'static,
        SFut: Future<Output = Result<(), HookError>> + Send + 'static,
        T: FnOnce() -> TFut + Send + 'static,
        TFut: Future<Output = Result<(), HookError>> + Send + 'static,
    {
        self.append(Hook::new(name).on_start(start).on_stop(stop));
    }

    /// Current state.
    pub fn state(&self) -> State {
        self.inner.lock().state
    }

    /// Number of registered hooks that have not been stopped yet.
    pub fn len(&self) -> usize {
        self.inner.lock().hooks.len()
    }

    /// Whether no hooks are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run all start hooks in registration order.
    ///
    /// On the first failure, the hooks that already started are stopped in
    /// reverse order and the start error is returned.
    pub async fn start(&self) -> Result<(), LifecycleError> {
        {
            let mut inner = self.inner.lock();
            if inner.state != State::Idle {
                return Err(LifecycleError::AlreadyStarted);
            }
            inner.state = State::Starting;
        }

        loop {
            let next = {
                let mut inner = self.inner.lock();
                let index = inner.started;
                inner
                    .hooks
                    .get_mut(index)
                    .map(|hook| (hook.name().to_string(), hook.take_start()))
            };

            let Some((name, start)) = next else {
                break;
            };

            if let Some(start) = start {
                tracing::debug!(hook = %name, "running start hook");
                if let Err(source) = run_hook(start, self.start_timeout).await {
                    tracing::error!(hook = %name, error = %source, "start hook failed, rolling back");
                    let failures = self.run_stop_hooks().await;
                    for failure in &failures {
                        tracing::warn!(hook = %failure.hook, error = %failure.error, "rollback stop hook failed");
                    }
                    return Err(LifecycleError::Start { hook: name, source });
                }
            }

            self.inner.lock().started += 1;
        }

        self.inner.lock().state = State::Running;
        Ok(())
    }

    /// Run the stop hooks of every started hook in reverse order.
    ///
    /// All hooks are attempted even when some fail; failures are aggregated
    /// into a single [`LifecycleError::Stop`].
    pub async fn stop(&self) -> Result<(), LifecycleError> {
        {
            let inner = self.inner.lock();
            if inner.state != State::Running {
                return Err(LifecycleError::NotRunning(inner.state));
            }
        }

        let failures = self.run_stop_hooks().await;
        if failures.is_empty() {
            Ok(())
        } else {
            Err(LifecycleError::Stop { failures })
        }
    }

    async fn run_stop_hooks(&self) -> Vec<StopFailure> {
        let stops: Vec<(String, Option<HookFn>)> = {
            let mut inner = self.inner.lock();
            inner.state = State::Stopping;
            let started = inner.started;
            inner.started = 0;
            inner
                .hooks
                .drain(..started)
                .rev()
                .map(|mut hook| (hook.name().to_string(), hook.take_stop()))
                .collect()
        };

        let mut failures = Vec::new();
        for (name, stop) in stops {
            let Some(stop) = stop else {
                continue;
            };
            tracing::debug!(hook = %name, "running stop hook");
            if let Err(error) = run_hook(stop, self.stop_timeout).await {
                tracing::warn!(hook = %name, error = %error, "stop hook failed");
                failures.push(StopFailure { hook: name, error });
            }
        }

        self.inner.lock().state = State::Stopped;
        failures
    }
}

async fn run_hook(hook: HookFn, timeout: Duration) -> Result<(), HookError> {
    match tokio::time::timeout(timeout, hook()).await {
        Ok(result) => result,
        Err(_) => Err(HookError::TimedOut(timeout)),
    }
}
