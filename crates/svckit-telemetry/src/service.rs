//! Span helpers for service components.
//!
//! A [`BaseService`] names every span `"{component}.{operation}"` and
//! records failures on the span. Embed one in a service struct:
//!
//! ```ignore
//! struct UserService {
//!     base: BaseService,
//!     db: Database,
//! }
//!
//! impl UserService {
//!     async fn get_user(&self, id: &str) -> Result<User, DbError> {
//!         self.base
//!             .with_span_async(&Context::current(), "GetUser", |cx| async move {
//!                 self.db.query_user(id).await
//!             })
//!             .await
//!     }
//! }
//! ```

use opentelemetry::global::BoxedTracer;
use opentelemetry::metrics::Meter;
use opentelemetry::trace::{FutureExt, Status, TraceContextExt, Tracer};
use opentelemetry::Context;
use std::error::Error;
use std::future::Future;
use std::sync::Arc;

/// Tracer, meter and component name shared by a service's operations.
#[derive(Clone)]
pub struct BaseService {
    tracer: Arc<BoxedTracer>,
    meter: Meter,
    component: String,
}

impl std::fmt::Debug for BaseService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseService")
            .field("component", &self.component)
            .finish_non_exhaustive()
    }
}

impl BaseService {
    /// Create a service base. `component` prefixes every span name, e.g.
    /// `"user.service"`.
    pub fn new(
        tracer: impl Into<Arc<BoxedTracer>>,
        meter: Meter,
        component: impl Into<String>,
    ) -> Self {
        Self {
            tracer: tracer.into(),
            meter,
            component: component.into(),
        }
    }

    /// Full span name for an operation.
    pub fn span_name(&self, operation: &str) -> String {
        format!("{}.{}", self.component, operation)
    }

    /// Start a span for `operation` as a child of `parent`.
    ///
    /// The span ends when the guard is finished or dropped.
    pub fn trace(&self, parent: &Context, operation: &str) -> SpanGuard {
        let span = self
            .tracer
            .start_with_context(self.span_name(operation), parent);
        SpanGuard {
            cx: parent.with_span(span),
            finished: false,
        }
    }

    /// Run `f` inside a span for `operation`.
    ///
    /// An `Err` is recorded on the span and marks it as failed; the result
    /// is returned unchanged.
    pub fn with_span<T, E, F>(&self, parent: &Context, operation: &str, f: F) -> Result<T, E>
    where
        E: Error,
        F: FnOnce(&Context) -> Result<T, E>,
    {
        let guard = self.trace(parent, operation);
        let result = f(guard.context());
        guard.finish(&result);
        result
    }

    /// Async form of [`with_span`](Self::with_span).
    ///
    /// The span's context is current while the future is polled.
    pub async fn with_span_async<T, E, F, Fut>(
        &self,
        parent: &Context,
        operation: &str,
        f: F,
    ) -> Result<T, E>
    where
        E: Error,
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let guard = self.trace(parent, operation);
        let cx = guard.context().clone();
        let result = f(cx.clone()).with_context(cx).await;
        guard.finish(&result);
        result
    }

    /// Underlying tracer.
    pub fn tracer(&self) -> &BoxedTracer {
        &self.tracer
    }

    /// Underlying meter, for custom instruments.
    pub fn meter(&self) -> &Meter {
        &self.meter
    }

    /// Component name used as the span prefix.
    pub fn component(&self) -> &str {
        &self.component
    }
}

/// An in-flight span started by [`BaseService::trace`].
#[must_use = "the span ends when the guard is dropped"]
pub struct SpanGuard {
    cx: Context,
    finished: bool,
}

impl SpanGuard {
    /// Context carrying the span, for child spans and propagation.
    pub fn context(&self) -> &Context {
        &self.cx
    }

    /// Record the outcome and end the span.
    pub fn finish<T, E: Error>(mut self, result: &Result<T, E>) {
        let span = self.cx.span();
        if let Err(err) = result {
            span.record_error(err);
            span.set_status(Status::error(err.to_string()));
        }
        span.end();
        self.finished = true;
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.cx.span().end();
        }
    }
}
