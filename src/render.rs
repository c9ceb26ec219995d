//! Builds the views the workflow hands to the platform.

use chrono::NaiveDateTime;

use crate::controls::{self, AttendanceAction, ControlAction, ReviewAction};
use crate::model::{EventDraft, PublishedArtifact};
use crate::platform::{Control, ControlStyle, MessageView, Preview};

const REVIEW_HEADING: &str = "Creating an event...";

/// `25/12/2030, 6:00 pm - Potluck`
pub fn preview_title(start: NaiveDateTime, name: &str) -> String {
    format!("{} - {}", start.format("%d/%m/%Y, %-I:%M %P"), name)
}

pub fn duration_label(hours: f64) -> String {
    if hours == 1.0 {
        "1 hour".to_string()
    } else {
        format!("{hours} hours")
    }
}

pub fn draft_preview(draft: &EventDraft) -> Preview {
    Preview {
        title: preview_title(draft.start_time, &draft.name),
        description: draft.description.clone(),
        location: draft.location.clone(),
        duration: duration_label(draft.duration_hours),
        thumbnail: draft.image_url.clone(),
    }
}

/// Preview plus the five review buttons.
pub fn review(draft: &EventDraft, content: &str) -> MessageView {
    let namespace = controls::review_namespace(draft.id);
    let controls = ReviewAction::ALL
        .iter()
        .map(|&action| {
            let (label, style) = match action {
                ReviewAction::Edit => ("Edit", ControlStyle::Primary),
                ReviewAction::AddImage if draft.image_url.is_some() => {
                    ("Change Image", ControlStyle::Primary)
                }
                ReviewAction::AddImage => ("Add An Image", ControlStyle::Primary),
                ReviewAction::Save => ("Save For Later", ControlStyle::Primary),
                ReviewAction::Finish => ("Finish", ControlStyle::Success),
                ReviewAction::Cancel => ("Cancel", ControlStyle::Danger),
            };
            Control {
                id: controls::encode(&namespace, action),
                label: label.to_string(),
                style,
            }
        })
        .collect();

    MessageView::Review {
        heading: REVIEW_HEADING.to_string(),
        content: content.to_string(),
        preview: draft_preview(draft),
        controls,
    }
}

/// A published event with its current roster and attendance buttons.
pub fn artifact(artifact: &PublishedArtifact, namespace: &str) -> MessageView {
    let controls = AttendanceAction::ALL
        .iter()
        .map(|&action| {
            let (label, style) = match action {
                AttendanceAction::Attending => ("Attending", ControlStyle::Success),
                AttendanceAction::NotAttending => ("Not Attending", ControlStyle::Danger),
            };
            Control {
                id: controls::encode(namespace, action),
                label: label.to_string(),
                style,
            }
        })
        .collect();

    MessageView::Artifact {
        preview: Preview {
            title: preview_title(artifact.start_time, &artifact.name),
            description: artifact.description.clone(),
            location: artifact.location.clone(),
            duration: duration_label(artifact.duration_hours),
            thumbnail: artifact.image_url.clone(),
        },
        category: artifact.category.clone(),
        author: artifact.author.line(),
        attendees: artifact.attendees.lines(),
        controls,
    }
}
