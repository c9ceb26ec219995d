//! The authoring workflow.
//!
//! One run per draft owner: the command opens (or resumes) a draft and shows
//! the form; a valid reply renders a preview with review controls; the
//! controls edit, add an image, save, publish, or cancel. Each owner's steps
//! are serialized; different owners proceed independently.

mod controller;
mod review;

pub use controller::WorkflowController;

use crate::form::InputError;
use crate::model::{ChannelId, DraftId, User};

pub(crate) const DENIED_TEXT: &str = "You do not have permission to create events.";
pub(crate) const NO_CHANNEL_TEXT: &str = "This command needs to be triggered in a channel.";
pub(crate) const FORM_TIMEOUT_TEXT: &str =
    "Sorry, something went wrong creating your event. Please try again.";
pub(crate) const EDIT_TIMEOUT_TEXT: &str =
    "Sorry, you took too long to update your event! Your changes so far are kept, so just run the command again.";
pub(crate) const REVIEW_TIMEOUT_TEXT: &str =
    "Sorry, your event editing timed out! You can continue from where you left off when ready.";
pub(crate) const IMAGE_ADDED_TEXT: &str = "Image added!";
pub(crate) const ADDING_IMAGE_TEXT: &str = "Adding image...";
pub(crate) const IMAGE_TIMEOUT_TEXT: &str = "Sorry, you took too long! Please try again.";
pub(crate) const NO_IMAGE_TEXT: &str = "That reply had no image attached.";
pub(crate) const CREATING_TEXT: &str = "Creating event...";
pub(crate) const CREATED_TEXT: &str = "Event created successfully!";
pub(crate) const CANCELLED_TEXT: &str = "Cancelled event.";

pub(crate) fn image_prompt_text(user: &User) -> String {
    format!(
        "Hi {}, just reply to this message with your image!",
        user.display_name
    )
}

/// A use of the authoring command.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub user: User,
    /// Where the command was used. Required.
    pub channel: Option<ChannelId>,
    /// Category to author under; unknown names fall back to the draft's.
    pub category: Option<String>,
}

impl Invocation {
    pub fn new(user: User, channel: ChannelId) -> Self {
        Self {
            user,
            channel: Some(channel),
            category: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// How an invocation's form step ended.
#[derive(Debug, Clone, PartialEq)]
pub enum InvokeOutcome {
    /// The reply was valid; the draft is under review.
    Reviewing(DraftId),
    /// The reply was rejected. The draft is unchanged and the user must
    /// invoke again.
    InvalidInput(InputError),
    /// Nobody replied in time. The draft is kept.
    TimedOut,
    /// A later invocation for the same draft took over the form.
    Superseded,
    /// The user's roles do not allow authoring.
    Denied,
}
