use super::TraceId;
use tracing::{Level, Span};

/// Create a root span for an alerting run / feed session
pub fn root_span(task: &'static str, trace_id: &TraceId) -> Span {
    tracing::span!(
        Level::INFO,
        "run",
        task,
        trace_id = %trace_id.as_str()
    )
}

/// Create a child span (inherits trace_id automatically)
pub fn child_span(task: &'static str) -> Span {
    tracing::span!(Level::INFO, "step", task)
}
