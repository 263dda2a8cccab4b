//! Task processing span helpers.

use opentelemetry::KeyValue;
use tracing::Span;

use crate::model::TaskId;

/// Start the span covering one task's pickup-to-finish run on a worker.
pub fn start_task_span(worker_id: usize, task_id: &TaskId, url: &str) -> Span {
    tracing::info_span!(
        "task.process",
        "worker.id" = worker_id,
        "task.id" = %task_id,
        "task.url" = url,
    )
}

/// Emit a transition event inside `span` and count it.
pub fn record_state_transition(span: &Span, from: &str, to: &str) {
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "state_transition");
    });
    super::metrics::task_state_transitions().add(
        1,
        &[
            KeyValue::new("from", from.to_string()),
            KeyValue::new("to", to.to_string()),
        ],
    );
}
