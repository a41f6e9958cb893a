//! Span helpers for capital call actions.

use tracing::Span;

use crate::model::{CapitalCallId, WorkflowStatus};

/// Start a span for one service action.
///
/// `capital_call.status` is declared empty and filled in by
/// [`record_state_transition`].
pub fn start_action_span(action: &'static str, id: Option<CapitalCallId>) -> Span {
    let id = id.map(|i| i.to_string()).unwrap_or_default();
    tracing::info_span!(
        "capital_call.action",
        "capital_call.action" = action,
        "capital_call.id" = %id,
        "capital_call.status" = tracing::field::Empty,
    )
}

/// Record a workflow transition on `span` and emit an event inside it.
pub fn record_state_transition(span: &Span, from: WorkflowStatus, to: WorkflowStatus) {
    span.record("capital_call.status", to.as_str());
    span.in_scope(|| {
        tracing::info!(from = %from, to = %to, "state_transition");
    });
}
