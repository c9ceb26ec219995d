//! Metric instruments, all from the `"seavent"` meter on the global
//! `MeterProvider`. Without an OTLP endpoint the provider is a no-op.

use opentelemetry::metrics::{Counter, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("seavent")
}

/// Counter: drafts opened by the command.
/// Labels: `result` ("created" | "resumed").
pub fn drafts_opened() -> Counter<u64> {
    meter()
        .u64_counter("seavent.drafts.opened")
        .with_description("Drafts opened by the authoring command")
        .build()
}

/// Counter: workflow state transitions.
/// Labels: `from`, `to`.
pub fn workflow_transitions() -> Counter<u64> {
    meter()
        .u64_counter("seavent.workflow.transitions")
        .with_description("Authoring workflow state transitions")
        .build()
}

/// Counter: form replies rejected by validation.
/// Labels: `reason` ("date" | "duration").
pub fn form_rejections() -> Counter<u64> {
    meter()
        .u64_counter("seavent.form.rejections")
        .with_description("Form replies rejected by validation")
        .build()
}

/// Counter: subscriptions whose window ran out.
/// Labels: `kind` ("review" | "attendance").
pub fn subscriptions_expired() -> Counter<u64> {
    meter()
        .u64_counter("seavent.subscription.expired")
        .with_description("Action-control subscriptions that expired")
        .build()
}

/// Counter: attendance toggles.
/// Labels: `action`, `result`.
pub fn attendance_toggles() -> Counter<u64> {
    meter()
        .u64_counter("seavent.attendance.toggles")
        .with_description("Attendance control presses")
        .build()
}

/// Counter: artifacts published.
/// Labels: `category`.
pub fn artifacts_published() -> Counter<u64> {
    meter()
        .u64_counter("seavent.artifacts.published")
        .with_description("Events published from drafts")
        .build()
}
