//! The chat platform, as seen by the workflow.
//!
//! The workflow never talks to a gateway directly. It needs four things from
//! whatever binds it to a platform: show a structured form, post and edit
//! messages carrying action controls, deliver inbound events (form replies,
//! control presses, posted messages), and signal when it is ready to serve.
//! Filtering inbound events by user and draft happens on this side.

pub mod local;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::Result;
use crate::model::{ChannelId, MessageId, User, UserId};

pub use local::{LocalPlatform, Outbound};

// ---------------------------------------------------------------------------
// Outbound views
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldStyle {
    Short,
    Paragraph,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    /// Namespaced field id, `<draftId>_<field>`.
    pub id: String,
    pub label: String,
    pub style: FieldStyle,
    /// Pre-filled value.
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Form {
    /// Equal to the draft id; replies carry it back.
    pub id: String,
    pub title: String,
    pub fields: Vec<FormField>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlStyle {
    Primary,
    Success,
    Danger,
}

/// A pressable control. `id` is already encoded for the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control {
    pub id: String,
    pub label: String,
    pub style: ControlStyle,
}

/// Rendered summary of an event, draft or published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preview {
    pub title: String,
    pub description: String,
    pub location: String,
    pub duration: String,
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageView {
    Text {
        content: String,
    },
    Review {
        heading: String,
        content: String,
        preview: Preview,
        controls: Vec<Control>,
    },
    Artifact {
        preview: Preview,
        category: String,
        author: String,
        attendees: Vec<String>,
        controls: Vec<Control>,
    },
}

impl MessageView {
    pub fn text(content: impl Into<String>) -> Self {
        MessageView::Text {
            content: content.into(),
        }
    }

    /// Free text carried by the view, if any.
    pub fn content(&self) -> Option<&str> {
        match self {
            MessageView::Text { content } | MessageView::Review { content, .. } => Some(content),
            MessageView::Artifact { .. } => None,
        }
    }

    pub fn controls(&self) -> &[Control] {
        match self {
            MessageView::Text { .. } => &[],
            MessageView::Review { controls, .. } | MessageView::Artifact { controls, .. } => {
                controls
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FormSubmission {
    pub user: User,
    pub form_id: String,
    /// Field id to submitted value.
    pub values: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ControlPress {
    pub user: User,
    pub channel: ChannelId,
    /// Encoded control id, as posted.
    pub control_id: String,
}

#[derive(Debug, Clone)]
pub struct PostedMessage {
    pub id: MessageId,
    pub author: UserId,
    pub channel: ChannelId,
    /// The message this one replies to.
    pub reply_to: Option<MessageId>,
    /// Attachment URLs.
    pub attachments: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum InboundEvent {
    FormSubmitted(FormSubmission),
    ControlPressed(ControlPress),
    MessagePosted(PostedMessage),
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Platform: Send + Sync {
    /// The platform's own identity, used to namespace artifact controls.
    fn self_id(&self) -> &str;

    /// Resolves once the binding can serve requests.
    async fn ready(&self);

    /// A fresh receiver of every inbound event from this point on.
    fn events(&self) -> broadcast::Receiver<InboundEvent>;

    async fn show_form(&self, user: &UserId, form: Form) -> Result<()>;

    async fn send_message(&self, channel: &ChannelId, view: MessageView) -> Result<MessageId>;

    async fn edit_message(&self, message: &MessageId, view: MessageView) -> Result<()>;

    async fn delete_message(&self, message: &MessageId) -> Result<()>;

    /// Short notice visible only to `user`.
    async fn notify(&self, user: &UserId, channel: &ChannelId, text: &str) -> Result<()>;
}
