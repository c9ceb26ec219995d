//! Core data model.
//!
//! An event draft is a per-user record under construction. Publishing a
//! draft snapshots it into an immutable artifact that carries the only
//! mutable part left: its attendee list.

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::time::hours_to_offset;

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

/// Opaque platform user identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A place messages can be posted to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Platform-assigned identity of a posted message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Process-unique draft identifier. Namespaces every form field and action
/// control the draft puts on screen, so the full UUID is displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DraftId(pub Uuid);

impl DraftId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DraftId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DraftId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactId(pub Uuid);

impl ArtifactId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ArtifactId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The user behind an interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    /// Role names, used for invocation gating.
    #[serde(default)]
    pub roles: Vec<String>,
}

impl User {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: UserId::new(id),
            display_name: display_name.into(),
            roles: Vec::new(),
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }
}

// ---------------------------------------------------------------------------
// Event Draft
// ---------------------------------------------------------------------------

/// An in-progress event, owned by the draft store and keyed by its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDraft {
    pub owner: UserId,

    /// Stable across edits and resumes.
    pub id: DraftId,

    pub name: String,
    pub description: String,
    pub location: String,

    /// External attachment URL. Only referenced, never stored.
    pub image_url: Option<String>,

    /// Wall-clock start. Zone handling belongs to the publication surface.
    pub start_time: NaiveDateTime,

    pub duration_hours: f64,

    /// Name of a configured event category.
    pub category: String,
}

impl EventDraft {
    /// A fresh draft starting tomorrow at the current time of day, one hour long.
    pub fn new(owner: UserId, category: impl Into<String>, now: NaiveDateTime) -> Self {
        Self {
            owner,
            id: DraftId::new(),
            name: String::new(),
            description: String::new(),
            location: String::new(),
            image_url: None,
            start_time: default_start_time(now),
            duration_hours: 1.0,
            category: category.into(),
        }
    }

    /// `None` when the duration runs past what a calendar date can hold.
    pub fn end_time(&self) -> Option<NaiveDateTime> {
        hours_to_offset(self.duration_hours)
            .and_then(|offset| self.start_time.checked_add_signed(offset))
    }
}

/// Tomorrow, same time of day, truncated to the minute so it survives a
/// round-trip through the form's date field.
pub fn default_start_time(now: NaiveDateTime) -> NaiveDateTime {
    let tomorrow = now + chrono::Duration::days(1);
    tomorrow
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(tomorrow)
}

// ---------------------------------------------------------------------------
// Workflow State
// ---------------------------------------------------------------------------

/// Where a draft's authoring run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    /// Command received, draft resumed or created.
    New,
    /// Structured form shown, awaiting a reply.
    FormOpen,
    /// Preview rendered with action controls.
    Review,
    /// Waiting for the user to reply with an attachment.
    AwaitingImage,
    /// Parked for later. The draft stays in the store.
    Saved,
    /// Artifact created, draft removed. Terminal.
    Published,
    /// Draft discarded. Terminal.
    Cancelled,
    /// A wait ran out. The draft survives and can be resumed.
    Expired,
}

impl WorkflowState {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: WorkflowState) -> bool {
        use WorkflowState::*;
        match (self, to) {
            // Any run whose draft still exists can be restarted by the command.
            (from, New) => !from.destroys_draft(),
            (New, FormOpen)
            | (FormOpen, FormOpen)  // rejected input, user must re-invoke
            | (FormOpen, Review)
            | (FormOpen, Expired)
            | (Review, FormOpen)    // edit
            | (Review, AwaitingImage)
            | (Review, Saved)
            | (Review, Published)
            | (Review, Cancelled)
            | (Review, Expired)
            | (AwaitingImage, Review) => true,
            _ => false,
        }
    }

    /// Does the run end here?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowState::Saved
                | WorkflowState::Published
                | WorkflowState::Cancelled
                | WorkflowState::Expired
        )
    }

    /// Is the draft gone once this state is reached?
    pub fn destroys_draft(self) -> bool {
        matches!(self, WorkflowState::Published | WorkflowState::Cancelled)
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkflowState::New => "new",
            WorkflowState::FormOpen => "form_open",
            WorkflowState::Review => "review",
            WorkflowState::AwaitingImage => "awaiting_image",
            WorkflowState::Saved => "saved",
            WorkflowState::Published => "published",
            WorkflowState::Cancelled => "cancelled",
            WorkflowState::Expired => "expired",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Attendees
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    pub display_name: String,
    pub user_id: UserId,
}

impl Attendee {
    pub fn from_user(user: &User) -> Self {
        Self {
            display_name: user.display_name.clone(),
            user_id: user.id.clone(),
        }
    }

    /// Rendered roster line, `name (id)`.
    pub fn line(&self) -> String {
        format!("{} ({})", self.display_name, self.user_id)
    }
}

/// Ordered roster, unique by user id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttendeeList(Vec<Attendee>);

/// A single roster change requested by a control press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttendeeEdit {
    Add(Attendee),
    Remove(UserId),
}

impl AttendeeList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn contains(&self, user_id: &UserId) -> bool {
        self.0.iter().any(|a| &a.user_id == user_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attendee> {
        self.0.iter()
    }

    pub fn lines(&self) -> Vec<String> {
        self.0.iter().map(Attendee::line).collect()
    }

    /// Apply an edit. Returns false when it was a no-op: adding someone
    /// already present, or removing someone who is not.
    pub fn apply(&mut self, edit: &AttendeeEdit) -> bool {
        match edit {
            AttendeeEdit::Add(attendee) => {
                if self.contains(&attendee.user_id) {
                    return false;
                }
                self.0.push(attendee.clone());
                true
            }
            AttendeeEdit::Remove(user_id) => {
                let Some(existing) = self.0.iter().find(|a| &a.user_id == user_id) else {
                    return false;
                };
                let line = existing.line();
                self.0.retain(|a| a.line() != line);
                true
            }
        }
    }
}

/// Result of an attendee edit as persisted by the artifact store.
#[derive(Debug, Clone)]
pub struct AttendeeUpdate {
    pub changed: bool,
    /// The roster as persisted after the edit.
    pub attendees: AttendeeList,
}

// ---------------------------------------------------------------------------
// Published Artifact
// ---------------------------------------------------------------------------

/// Immutable snapshot of a draft at publish time plus its attendee roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedArtifact {
    pub id: ArtifactId,
    pub draft_id: DraftId,
    pub author: Attendee,
    pub name: String,
    pub description: String,
    pub location: String,
    pub image_url: Option<String>,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub duration_hours: f64,
    pub category: String,
    /// Channel the artifact was posted to.
    pub channel: ChannelId,
    pub attendees: AttendeeList,
    pub published_at: DateTime<Utc>,
}

impl PublishedArtifact {
    /// Snapshot a draft. The roster starts with the author alone.
    pub fn from_draft(draft: &EventDraft, author: &User, channel: ChannelId) -> Result<Self> {
        let end_time = draft.end_time().ok_or_else(|| {
            Error::Other(format!(
                "draft {} ends out of range ({} hours)",
                draft.id, draft.duration_hours
            ))
        })?;
        let author = Attendee::from_user(author);
        let mut attendees = AttendeeList::new();
        attendees.apply(&AttendeeEdit::Add(author.clone()));

        Ok(Self {
            id: ArtifactId::new(),
            draft_id: draft.id,
            author,
            name: draft.name.clone(),
            description: draft.description.clone(),
            location: draft.location.clone(),
            image_url: draft.image_url.clone(),
            start_time: draft.start_time,
            end_time,
            duration_hours: draft.duration_hours,
            category: draft.category.clone(),
            channel,
            attendees,
            published_at: Utc::now(),
        })
    }
}
