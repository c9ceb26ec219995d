//! Attendance tracking on published artifacts.
//!
//! Each published artifact carries two controls, attending and not
//! attending, served by a subscription with no timeout that accepts presses
//! from anyone. Toggles are evaluated against the persisted roster at the
//! moment of the press; repeating a toggle is an informational no-op.

use std::sync::Arc;

use async_trait::async_trait;
use opentelemetry::KeyValue;
use tracing::info;

use crate::artifacts::ArtifactStore;
use crate::controls::{AttendanceAction, ControlAction};
use crate::error::Result;
use crate::model::{
    ArtifactId, Attendee, AttendeeEdit, AttendeeList, MessageId, PublishedArtifact, User, UserId,
};
use crate::platform::{ControlPress, Platform};
use crate::render;
use crate::subscription::PressHandler;
use crate::telemetry::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceOutcome {
    Added,
    AlreadyAttending,
    Removed,
    WasNotAttending,
}

impl AttendanceOutcome {
    pub fn changed(self) -> bool {
        matches!(self, AttendanceOutcome::Added | AttendanceOutcome::Removed)
    }

    /// Reply shown to the user who pressed.
    pub fn message(self) -> &'static str {
        match self {
            AttendanceOutcome::Added => "You're attending! See you there.",
            AttendanceOutcome::AlreadyAttending => "You're already attending this event.",
            AttendanceOutcome::Removed => "You're no longer attending this event.",
            AttendanceOutcome::WasNotAttending => "You weren't attending this event.",
        }
    }

    fn label(self) -> &'static str {
        match self {
            AttendanceOutcome::Added => "added",
            AttendanceOutcome::AlreadyAttending => "already_attending",
            AttendanceOutcome::Removed => "removed",
            AttendanceOutcome::WasNotAttending => "was_not_attending",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LedgerResult {
    pub outcome: AttendanceOutcome,
    /// Roster as persisted after the toggle.
    pub attendees: AttendeeList,
}

/// Applies attendance toggles to artifacts in an [`ArtifactStore`].
#[derive(Clone)]
pub struct AttendanceLedger {
    store: Arc<dyn ArtifactStore>,
}

impl AttendanceLedger {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }

    pub async fn mark_attending(&self, artifact: ArtifactId, user: &User) -> Result<LedgerResult> {
        let update = self
            .store
            .edit_attendees(artifact, AttendeeEdit::Add(Attendee::from_user(user)))
            .await?;
        let outcome = if update.changed {
            AttendanceOutcome::Added
        } else {
            AttendanceOutcome::AlreadyAttending
        };
        Ok(self.finish(artifact, &user.id, AttendanceAction::Attending, outcome, update.attendees))
    }

    pub async fn mark_not_attending(
        &self,
        artifact: ArtifactId,
        user: &UserId,
    ) -> Result<LedgerResult> {
        let update = self
            .store
            .edit_attendees(artifact, AttendeeEdit::Remove(user.clone()))
            .await?;
        let outcome = if update.changed {
            AttendanceOutcome::Removed
        } else {
            AttendanceOutcome::WasNotAttending
        };
        Ok(self.finish(artifact, user, AttendanceAction::NotAttending, outcome, update.attendees))
    }

    fn finish(
        &self,
        artifact: ArtifactId,
        user: &UserId,
        action: AttendanceAction,
        outcome: AttendanceOutcome,
        attendees: AttendeeList,
    ) -> LedgerResult {
        info!(
            artifact = %artifact,
            user = %user,
            outcome = outcome.label(),
            attendees = attendees.len(),
            "attendance toggled"
        );
        metrics::attendance_toggles().add(
            1,
            &[
                KeyValue::new("action", action.name()),
                KeyValue::new("result", outcome.label()),
            ],
        );
        LedgerResult { outcome, attendees }
    }
}

/// Serves the attendance controls of one published artifact.
pub struct AttendanceHandler {
    ledger: AttendanceLedger,
    platform: Arc<dyn Platform>,
    /// Snapshot used for rendering; its roster is replaced on every change.
    artifact: PublishedArtifact,
    message: MessageId,
    namespace: String,
}

impl AttendanceHandler {
    pub fn new(
        ledger: AttendanceLedger,
        platform: Arc<dyn Platform>,
        artifact: PublishedArtifact,
        message: MessageId,
        namespace: String,
    ) -> Self {
        Self {
            ledger,
            platform,
            artifact,
            message,
            namespace,
        }
    }
}

#[async_trait]
impl PressHandler for AttendanceHandler {
    type Action = AttendanceAction;

    async fn on_press(&self, action: AttendanceAction, press: ControlPress) -> Result<()> {
        let result = match action {
            AttendanceAction::Attending => {
                self.ledger.mark_attending(self.artifact.id, &press.user).await?
            }
            AttendanceAction::NotAttending => {
                self.ledger
                    .mark_not_attending(self.artifact.id, &press.user.id)
                    .await?
            }
        };

        self.platform
            .notify(&press.user.id, &press.channel, result.outcome.message())
            .await?;

        if result.outcome.changed() {
            let mut snapshot = self.artifact.clone();
            snapshot.attendees = result.attendees;
            self.platform
                .edit_message(&self.message, render::artifact(&snapshot, &self.namespace))
                .await?;
        }
        Ok(())
    }
}
