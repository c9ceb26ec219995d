//! Structured form prompt and field validation.
//!
//! [`open`] shows a draft's form and waits for the one reply that belongs to
//! it. Validation is the caller's job: [`validate`] turns raw field text into
//! typed values, all or nothing.

use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use regex::Regex;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::controls;
use crate::error::{Error, Result};
use crate::model::{EventDraft, User};
use crate::platform::{FieldStyle, Form, FormField, InboundEvent, Platform};
use crate::time::hours_to_offset;

const FORM_TITLE: &str = "Create a New Event";

static DATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(\d{1,2})/(\d{1,2})/(\d{2,4})\s+(\d{1,2}):(\d{2})\s+(am|pm)$")
        .expect("date pattern compiles")
});

/// Form fields, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Location,
    Description,
    StartTime,
    Duration,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::Name,
        Field::Location,
        Field::Description,
        Field::StartTime,
        Field::Duration,
    ];

    /// Suffix after the draft namespace in the field id.
    pub fn key(self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Location => "location",
            Field::Description => "description",
            Field::StartTime => "startTime",
            Field::Duration => "duration",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Field::Name => "Name",
            Field::Location => "Location",
            Field::Description => "Description",
            Field::StartTime => "Date and Time (format: DD/MM/YY HH:MM AM/PM)",
            Field::Duration => "Duration (in hours)",
        }
    }

    fn style(self) -> FieldStyle {
        match self {
            Field::Description => FieldStyle::Paragraph,
            _ => FieldStyle::Short,
        }
    }
}

/// Raw text of every form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldUpdates {
    pub name: String,
    pub location: String,
    pub description: String,
    pub start_time: String,
    pub duration: String,
}

impl FieldUpdates {
    /// Pre-fill values for a draft.
    pub fn from_draft(draft: &EventDraft) -> Self {
        Self {
            name: draft.name.clone(),
            location: draft.location.clone(),
            description: draft.description.clone(),
            start_time: format_start_time(draft.start_time),
            duration: draft.duration_hours.to_string(),
        }
    }

    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::Name => &self.name,
            Field::Location => &self.location,
            Field::Description => &self.description,
            Field::StartTime => &self.start_time,
            Field::Duration => &self.duration,
        }
    }

    fn get_mut(&mut self, field: Field) -> &mut String {
        match field {
            Field::Name => &mut self.name,
            Field::Location => &mut self.location,
            Field::Description => &mut self.description,
            Field::StartTime => &mut self.start_time,
            Field::Duration => &mut self.duration,
        }
    }

    /// Read submitted values; a field missing from the reply keeps its
    /// pre-filled value.
    fn merge_submission(mut self, namespace: &str, values: &HashMap<String, String>) -> Self {
        for field in Field::ALL {
            if let Some(value) = values.get(&controls::field_id(namespace, field.key())) {
                *self.get_mut(field) = value.clone();
            }
        }
        self
    }
}

/// Build the form for a draft, pre-filled from `initial`.
pub fn build_form(draft: &EventDraft, initial: &FieldUpdates) -> Form {
    let namespace = controls::review_namespace(draft.id);
    Form {
        id: namespace.clone(),
        title: FORM_TITLE.to_string(),
        fields: Field::ALL
            .iter()
            .map(|&field| FormField {
                id: controls::field_id(&namespace, field.key()),
                label: field.label().to_string(),
                style: field.style(),
                value: initial.get(field).to_string(),
            })
            .collect(),
    }
}

#[derive(Debug, Clone)]
pub enum FormOutcome {
    Submitted { user: User, fields: FieldUpdates },
    TimedOut,
    /// A newer form for the same draft replaced this one.
    Superseded,
}

/// Show the draft's form to `user` and wait for their reply.
///
/// Only a submission from `user` carrying the draft's form id counts;
/// anything else on the event stream is skipped.
pub async fn open(
    platform: &dyn Platform,
    user: &User,
    draft: &EventDraft,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<FormOutcome> {
    let initial = FieldUpdates::from_draft(draft);
    let form = build_form(draft, &initial);
    let form_id = form.id.clone();

    // Subscribe before showing so a fast reply is not missed.
    let mut events = platform.events();
    platform.show_form(&user.id, form).await?;
    debug!(user = %user.id, form_id = %form_id, "form shown");

    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(FormOutcome::Superseded),
            _ = tokio::time::sleep_until(deadline) => return Ok(FormOutcome::TimedOut),
            event = events.recv() => event,
        };

        match event {
            Ok(InboundEvent::FormSubmitted(submission))
                if submission.user.id == user.id && submission.form_id == form_id =>
            {
                let fields = initial.merge_submission(&form_id, &submission.values);
                return Ok(FormOutcome::Submitted {
                    user: submission.user,
                    fields,
                });
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(form_id = %form_id, skipped, "form listener lagged");
            }
            Err(RecvError::Closed) => {
                return Err(Error::Platform("event stream closed".to_string()));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A field the user has to fix. The message is shown verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("Invalid date format.")]
    InvalidDate,
    #[error("Invalid duration format.")]
    InvalidDuration,
}

impl InputError {
    /// Metric label.
    pub fn reason(self) -> &'static str {
        match self {
            InputError::InvalidDate => "date",
            InputError::InvalidDuration => "duration",
        }
    }
}

/// Fully parsed form reply, ready to apply to a draft.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedFields {
    pub name: String,
    pub location: String,
    pub description: String,
    pub start_time: NaiveDateTime,
    pub duration_hours: f64,
}

impl ValidatedFields {
    pub fn apply_to(self, draft: &mut EventDraft) {
        draft.name = self.name;
        draft.location = self.location;
        draft.description = self.description;
        draft.start_time = self.start_time;
        draft.duration_hours = self.duration_hours;
    }
}

/// Date is checked before duration; the first failure wins. A duration
/// whose end falls outside the calendar counts as a bad duration.
pub fn validate(fields: &FieldUpdates) -> std::result::Result<ValidatedFields, InputError> {
    let start_time = parse_start_time(&fields.start_time)?;
    let duration_hours = parse_duration(&fields.duration)?;
    hours_to_offset(duration_hours)
        .and_then(|offset| start_time.checked_add_signed(offset))
        .ok_or(InputError::InvalidDuration)?;
    Ok(ValidatedFields {
        name: fields.name.clone(),
        location: fields.location.clone(),
        description: fields.description.clone(),
        start_time,
        duration_hours,
    })
}

/// Parse `DD/MM/YY HH:MM am|pm` (two- or four-digit year, 12-hour clock).
/// The text must also name a real calendar minute.
pub fn parse_start_time(raw: &str) -> std::result::Result<NaiveDateTime, InputError> {
    let caps = DATE_PATTERN
        .captures(raw.trim())
        .ok_or(InputError::InvalidDate)?;
    let number = |i: usize| -> std::result::Result<u32, InputError> {
        caps[i].parse().map_err(|_| InputError::InvalidDate)
    };

    let day = number(1)?;
    let month = number(2)?;
    let year_digits = &caps[3];
    let year = number(3)? as i32;
    let year = if year_digits.len() == 2 { 2000 + year } else { year };
    let hour = number(4)?;
    let minute = number(5)?;
    if !(1..=12).contains(&hour) {
        return Err(InputError::InvalidDate);
    }
    let pm = caps[6].eq_ignore_ascii_case("pm");
    let hour = match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, false) => h,
        (h, true) => h + 12,
    };

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, 0))
        .ok_or(InputError::InvalidDate)
}

/// Duration in hours: a finite, positive number.
pub fn parse_duration(raw: &str) -> std::result::Result<f64, InputError> {
    match raw.trim().parse::<f64>() {
        Ok(hours) if hours.is_finite() && hours > 0.0 => Ok(hours),
        _ => Err(InputError::InvalidDuration),
    }
}

/// Inverse of [`parse_start_time`], used to pre-fill the date field.
pub fn format_start_time(start: NaiveDateTime) -> String {
    if (2000..2100).contains(&start.year()) {
        start.format("%d/%m/%y %I:%M %P").to_string()
    } else {
        start.format("%d/%m/%Y %I:%M %P").to_string()
    }
}
