//! Ambient distributed-trace context.
//!
//! The SDK never installs a tracer of its own; it only reads whatever span
//! is active in the current execution context so that error reports can be
//! correlated with distributed traces server-side.

use opentelemetry::trace::TraceContextExt;

use crate::events::TraceContext;

/// Read the active trace context, if any.
///
/// Returns `None` when no span is active in the current (synchronous or
/// asynchronous) call chain, or when the active span context is invalid.
/// This is a pure read and cannot fail: degraded states collapse to `None`.
#[must_use]
pub fn active_trace_context() -> Option<TraceContext> {
    let cx = opentelemetry::Context::current();
    let span = cx.span();
    let span_context = span.span_context();

    if !span_context.is_valid() {
        return None;
    }

    Some(TraceContext {
        trace_id: span_context.trace_id().to_string(),
        span_id: span_context.span_id().to_string(),
        trace_flags: span_context.trace_flags().to_u8(),
    })
}
