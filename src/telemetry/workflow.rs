//! Span helpers for authoring runs.

use tracing::Span;

use crate::model::{DraftId, UserId, WorkflowState};

/// Span covering one step of a draft's authoring run: the command, a form
/// reply, or a control press.
pub fn start_workflow_span(owner: &UserId, draft_id: DraftId) -> Span {
    tracing::info_span!(
        "workflow.step",
        "workflow.owner" = %owner,
        "workflow.draft_id" = %draft_id,
    )
}

/// Record a state transition event on `span`.
pub fn record_state_transition(span: &Span, from: WorkflowState, to: WorkflowState) {
    span.in_scope(|| {
        tracing::info!(from = %from, to = %to, "state_transition");
    });
}
