//! Integration tests for the authoring workflow.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use common::*;
use seavent::artifacts::{ArtifactStore, MemoryArtifactStore};
use seavent::controls::{self, ReviewAction};
use seavent::drafts::DraftStore;
use seavent::error::Error;
use seavent::form::InputError;
use seavent::model::{
    ArtifactId, AttendeeEdit, AttendeeUpdate, DraftId, MessageId, PublishedArtifact, User,
    WorkflowState,
};
use seavent::platform::{MessageView, Outbound};
use seavent::workflow::{Invocation, InvokeOutcome};
use seavent::config::{RoleGate, WorkflowConfig};
use tokio::task::JoinHandle;

fn alice() -> User {
    User::new("u1", "Alice")
}

fn invoke(h: &Harness, invocation: Invocation) -> JoinHandle<seavent::error::Result<InvokeOutcome>> {
    let controller = h.controller.clone();
    tokio::spawn(async move { controller.invoke(invocation).await })
}

/// Run the command and answer the form; returns the draft and its review
/// message.
async fn reach_review(h: &mut Harness, user: &User, values: &[(&str, &str)]) -> (DraftId, MessageId) {
    let task = invoke(h, Invocation::new(user.clone(), general()));
    let form = next_form(&mut h.out).await;
    h.platform
        .submit_form(user.clone(), form.id.clone(), reply(&form, values));
    let outcome = task.await.unwrap().unwrap();
    let InvokeOutcome::Reviewing(draft_id) = outcome else {
        panic!("expected review, got {outcome:?}");
    };
    let (message, _, view) = next_sent(&mut h.out).await;
    assert!(matches!(view, MessageView::Review { .. }));
    (draft_id, message)
}

fn press(h: &Harness, user: &User, draft_id: DraftId, action: ReviewAction) {
    let namespace = controls::review_namespace(draft_id);
    h.platform
        .press(user.clone(), general(), controls::encode(&namespace, action));
}

const POTLUCK: &[(&str, &str)] = &[
    ("name", "Potluck"),
    ("location", "Park"),
    ("description", "Bring a dish"),
    ("startTime", "25/12/30 06:00 pm"),
    ("duration", "3"),
];

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn potluck_is_published_with_author_attending() {
    let mut h = harness(WorkflowConfig::default()).await;
    let alice = alice();

    let (draft_id, review) = reach_review(&mut h, &alice, POTLUCK).await;
    assert_eq!(h.controller.state(&alice.id), Some(WorkflowState::Review));
    let view = h.platform.message(&review).unwrap();
    let labels: Vec<_> = view.controls().iter().map(|c| c.label.as_str()).collect();
    assert_eq!(
        labels,
        ["Edit", "Add An Image", "Save For Later", "Finish", "Cancel"]
    );

    press(&h, &alice, draft_id, ReviewAction::Finish);
    edited_to(&mut h.out, "Creating event...").await;
    let (_, channel, view) = next_sent(&mut h.out).await;
    edited_to(&mut h.out, "Event created successfully!").await;

    assert_eq!(channel.to_string(), "meetups");
    let MessageView::Artifact { attendees, .. } = view else {
        panic!("expected artifact view");
    };
    assert_eq!(attendees, ["Alice (u1)"]);

    let published = h.artifacts.all();
    assert_eq!(published.len(), 1);
    let event = &published[0];
    assert_eq!(event.name, "Potluck");
    assert_eq!(event.category, "Meetup");
    let start = NaiveDate::from_ymd_opt(2030, 12, 25)
        .unwrap()
        .and_hms_opt(18, 0, 0)
        .unwrap();
    assert_eq!(event.start_time, start);
    assert_eq!(event.end_time, start + chrono::Duration::hours(3));

    assert!(h.drafts.is_empty());
    assert_eq!(h.controller.state(&alice.id), Some(WorkflowState::Published));
    assert!(
        !h.controller
            .subscriptions()
            .is_live(&controls::review_namespace(draft_id))
    );
    let attendance = controls::attendance_namespace("bot", draft_id);
    assert!(h.controller.subscriptions().is_live(&attendance));
}

#[tokio::test]
async fn category_choice_routes_the_event() {
    let mut h = harness(WorkflowConfig::default()).await;
    let alice = alice();

    let task = invoke(
        &h,
        Invocation::new(alice.clone(), general()).with_category("happening"),
    );
    let form = next_form(&mut h.out).await;
    h.platform
        .submit_form(alice.clone(), form.id.clone(), reply(&form, POTLUCK));
    let InvokeOutcome::Reviewing(draft_id) = task.await.unwrap().unwrap() else {
        panic!("expected review");
    };

    press(&h, &alice, draft_id, ReviewAction::Finish);
    let (_, channel, _) = next(&mut h.out, |o| match o {
        Outbound::MessageSent {
            id,
            channel,
            view: view @ MessageView::Artifact { .. },
        } => Some((id, channel, view)),
        _ => None,
    })
    .await;
    assert_eq!(channel.to_string(), "happenings");
    edited_to(&mut h.out, "Event created successfully!").await;
    assert_eq!(h.artifacts.all()[0].category, "Happening");
}

// ---------------------------------------------------------------------------
// Form validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_date_keeps_the_draft_unchanged() {
    let mut h = harness(WorkflowConfig::default()).await;
    let alice = alice();

    let task = invoke(&h, Invocation::new(alice.clone(), general()));
    let form = next_form(&mut h.out).await;
    h.platform.submit_form(
        alice.clone(),
        form.id.clone(),
        reply(&form, &[("name", "Potluck"), ("startTime", "next friday")]),
    );

    assert_eq!(
        task.await.unwrap().unwrap(),
        InvokeOutcome::InvalidInput(InputError::InvalidDate)
    );
    let (user, text) = next_notice(&mut h.out).await;
    assert_eq!(user, "u1");
    assert_eq!(text, "Invalid date format.");

    let draft = h.drafts.get(&alice.id).unwrap();
    assert_eq!(draft.name, "");
    assert_eq!(h.controller.state(&alice.id), Some(WorkflowState::FormOpen));
}

#[tokio::test]
async fn invalid_duration_is_rejected() {
    let mut h = harness(WorkflowConfig::default()).await;
    let alice = alice();

    let task = invoke(&h, Invocation::new(alice.clone(), general()));
    let form = next_form(&mut h.out).await;
    h.platform.submit_form(
        alice.clone(),
        form.id.clone(),
        reply(&form, &[("duration", "a while")]),
    );

    assert_eq!(
        task.await.unwrap().unwrap(),
        InvokeOutcome::InvalidInput(InputError::InvalidDuration)
    );
    let (_, text) = next_notice(&mut h.out).await;
    assert_eq!(text, "Invalid duration format.");
    assert_eq!(h.drafts.get(&alice.id).unwrap().duration_hours, 1.0);
}

#[tokio::test]
async fn duration_ending_off_the_calendar_is_rejected() {
    let mut h = harness(WorkflowConfig::default()).await;
    let alice = alice();

    let task = invoke(&h, Invocation::new(alice.clone(), general()));
    let form = next_form(&mut h.out).await;
    h.platform.submit_form(
        alice.clone(),
        form.id.clone(),
        reply(&form, &[("duration", "1e10")]),
    );

    assert_eq!(
        task.await.unwrap().unwrap(),
        InvokeOutcome::InvalidInput(InputError::InvalidDuration)
    );
    let (_, text) = next_notice(&mut h.out).await;
    assert_eq!(text, "Invalid duration format.");
    assert_eq!(h.drafts.get(&alice.id).unwrap().duration_hours, 1.0);
    assert!(h.artifacts.all().is_empty());
}

#[tokio::test]
async fn other_users_replies_are_ignored() {
    let mut h = harness(WorkflowConfig::default()).await;
    let alice = alice();
    let mallory = User::new("u9", "Mallory");

    let task = invoke(&h, Invocation::new(alice.clone(), general()));
    let form = next_form(&mut h.out).await;
    h.platform.submit_form(
        mallory,
        form.id.clone(),
        reply(&form, &[("name", "Hijacked")]),
    );
    h.platform
        .submit_form(alice.clone(), form.id.clone(), reply(&form, &[("name", "Mine")]));

    assert!(matches!(
        task.await.unwrap().unwrap(),
        InvokeOutcome::Reviewing(_)
    ));
    assert_eq!(h.drafts.get(&alice.id).unwrap().name, "Mine");
}

// ---------------------------------------------------------------------------
// Resumption and timeouts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_invocation_resumes_the_same_draft() {
    let mut h = harness(WorkflowConfig::default()).await;
    let alice = alice();

    let (first, _) = reach_review(&mut h, &alice, POTLUCK).await;

    let task = invoke(&h, Invocation::new(alice.clone(), general()));
    let form = next_form(&mut h.out).await;
    assert_eq!(form.id, controls::review_namespace(first));
    assert_eq!(prefilled(&form, "name"), "Potluck");
    assert_eq!(prefilled(&form, "startTime"), "25/12/30 06:00 pm");
    assert_eq!(prefilled(&form, "duration"), "3");
    assert_eq!(h.drafts.len(), 1);
    assert!(
        !h.controller
            .subscriptions()
            .is_live(&controls::review_namespace(first))
    );

    h.platform.submit_form(alice.clone(), form.id.clone(), reply(&form, &[]));
    assert_eq!(
        task.await.unwrap().unwrap(),
        InvokeOutcome::Reviewing(first)
    );
}

#[tokio::test]
async fn newer_invocation_supersedes_an_open_form() {
    let mut h = harness(WorkflowConfig::default()).await;
    let alice = alice();

    let first = invoke(&h, Invocation::new(alice.clone(), general()));
    next_form(&mut h.out).await;
    let second = invoke(&h, Invocation::new(alice.clone(), general()));
    let form = next_form(&mut h.out).await;

    assert_eq!(first.await.unwrap().unwrap(), InvokeOutcome::Superseded);

    h.platform
        .submit_form(alice.clone(), form.id.clone(), reply(&form, POTLUCK));
    assert!(matches!(
        second.await.unwrap().unwrap(),
        InvokeOutcome::Reviewing(_)
    ));
}

#[tokio::test(start_paused = true)]
async fn unanswered_form_times_out_and_keeps_the_draft() {
    let mut h = harness(WorkflowConfig::default()).await;
    let alice = alice();

    let task = invoke(&h, Invocation::new(alice.clone(), general()));
    next_form(&mut h.out).await;

    assert_eq!(task.await.unwrap().unwrap(), InvokeOutcome::TimedOut);
    let (_, text) = next_notice(&mut h.out).await;
    assert_eq!(
        text,
        "Sorry, something went wrong creating your event. Please try again."
    );
    assert_eq!(h.controller.state(&alice.id), Some(WorkflowState::Expired));
    assert_eq!(h.drafts.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn review_expires_after_the_editing_window() {
    let config = WorkflowConfig {
        editing_timeout: Duration::from_secs(1),
        ..WorkflowConfig::default()
    };
    let mut h = harness(config).await;
    let alice = alice();

    let (draft_id, review) = reach_review(&mut h, &alice, POTLUCK).await;
    let expired = edited_to(
        &mut h.out,
        "Sorry, your event editing timed out! You can continue from where you left off when ready.",
    )
    .await;
    assert_eq!(expired, review);
    assert_eq!(h.controller.state(&alice.id), Some(WorkflowState::Expired));
    assert_eq!(h.drafts.get(&alice.id).unwrap().id, draft_id);

    // A press after expiry does nothing.
    press(&h, &alice, draft_id, ReviewAction::Finish);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(h.artifacts.all().is_empty());

    // The draft is resumable.
    let task = invoke(&h, Invocation::new(alice.clone(), general()));
    let form = next_form(&mut h.out).await;
    assert_eq!(prefilled(&form, "name"), "Potluck");
    h.platform.submit_form(alice.clone(), form.id.clone(), reply(&form, &[]));
    assert_eq!(
        task.await.unwrap().unwrap(),
        InvokeOutcome::Reviewing(draft_id)
    );
}

#[tokio::test(start_paused = true)]
async fn edit_timeout_notice_differs_from_command_timeout() {
    let mut h = harness(WorkflowConfig::default()).await;
    let alice = alice();

    let (draft_id, review) = reach_review(&mut h, &alice, POTLUCK).await;
    press(&h, &alice, draft_id, ReviewAction::Edit);

    let deleted = next(&mut h.out, |o| match o {
        Outbound::MessageDeleted { id } => Some(id),
        _ => None,
    })
    .await;
    assert_eq!(deleted, review);
    next_form(&mut h.out).await;

    let (_, text) = next_notice(&mut h.out).await;
    assert_ne!(
        text,
        "Sorry, something went wrong creating your event. Please try again."
    );
    assert!(text.starts_with("Sorry, you took too long to update your event!"));
    assert_eq!(h.controller.state(&alice.id), Some(WorkflowState::Expired));
    assert_eq!(h.drafts.get(&alice.id).unwrap().name, "Potluck");
}

// ---------------------------------------------------------------------------
// Review actions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn edit_reopens_the_form_prefilled() {
    let mut h = harness(WorkflowConfig::default()).await;
    let alice = alice();

    let (draft_id, _) = reach_review(&mut h, &alice, POTLUCK).await;
    press(&h, &alice, draft_id, ReviewAction::Edit);

    let form = next_form(&mut h.out).await;
    assert_eq!(prefilled(&form, "location"), "Park");
    assert_eq!(prefilled(&form, "description"), "Bring a dish");
    h.platform.submit_form(
        alice.clone(),
        form.id.clone(),
        reply(&form, &[("name", "Picnic")]),
    );

    let (review, _, view) = next_sent(&mut h.out).await;
    let MessageView::Review { preview, .. } = view else {
        panic!("expected review");
    };
    assert_eq!(preview.title, "25/12/2030, 6:00 pm - Picnic");
    assert_eq!(h.drafts.get(&alice.id).unwrap().name, "Picnic");
    assert_eq!(h.controller.state(&alice.id), Some(WorkflowState::Review));

    press(&h, &alice, draft_id, ReviewAction::Cancel);
    let cancelled = edited_to(&mut h.out, "Cancelled event.").await;
    assert_eq!(cancelled, review);
}

#[tokio::test]
async fn save_keeps_the_draft_and_stops_the_controls() {
    let mut h = harness(WorkflowConfig::default()).await;
    let alice = alice();

    let (draft_id, _) = reach_review(&mut h, &alice, POTLUCK).await;
    press(&h, &alice, draft_id, ReviewAction::Save);
    edited_to(
        &mut h.out,
        "Saved for later! You can continue from where you left off with \"/seavent\". \
         Don't wait too long, or you will have to start over again!",
    )
    .await;

    assert_eq!(h.controller.state(&alice.id), Some(WorkflowState::Saved));
    assert_eq!(h.drafts.get(&alice.id).unwrap().name, "Potluck");
    assert!(
        !h.controller
            .subscriptions()
            .is_live(&controls::review_namespace(draft_id))
    );
}

#[tokio::test]
async fn cancel_discards_the_draft() {
    let mut h = harness(WorkflowConfig::default()).await;
    let alice = alice();

    let (draft_id, _) = reach_review(&mut h, &alice, POTLUCK).await;
    press(&h, &alice, draft_id, ReviewAction::Cancel);
    edited_to(&mut h.out, "Cancelled event.").await;

    assert!(h.drafts.is_empty());
    assert_eq!(h.controller.state(&alice.id), Some(WorkflowState::Cancelled));

    // Starting again yields a fresh draft.
    let task = invoke(&h, Invocation::new(alice.clone(), general()));
    let form = next_form(&mut h.out).await;
    assert_ne!(form.id, controls::review_namespace(draft_id));
    assert_eq!(prefilled(&form, "name"), "");
    task.abort();
}

#[tokio::test]
async fn presses_from_other_users_are_ignored() {
    let mut h = harness(WorkflowConfig::default()).await;
    let alice = alice();
    let mallory = User::new("u9", "Mallory");

    let (draft_id, _) = reach_review(&mut h, &alice, POTLUCK).await;
    press(&h, &mallory, draft_id, ReviewAction::Cancel);
    press(&h, &alice, draft_id, ReviewAction::Save);

    let edited = next(&mut h.out, |o| match o {
        Outbound::MessageEdited { view, .. } => view.content().map(str::to_string),
        _ => None,
    })
    .await;
    assert!(edited.starts_with("Saved for later!"));
    assert_eq!(h.drafts.len(), 1);
}

#[tokio::test]
async fn image_reply_is_attached() {
    let mut h = harness(WorkflowConfig::default()).await;
    let alice = alice();

    let (draft_id, review) = reach_review(&mut h, &alice, POTLUCK).await;
    press(&h, &alice, draft_id, ReviewAction::AddImage);

    edited_to(&mut h.out, "Adding image...").await;
    let (prompt, _, view) = next_sent(&mut h.out).await;
    assert_eq!(
        view.content(),
        Some("Hi Alice, just reply to this message with your image!")
    );
    assert_eq!(
        h.controller.state(&alice.id),
        Some(WorkflowState::AwaitingImage)
    );

    let url = "https://cdn.example/potluck.png";
    let reply_id =
        h.platform
            .post_message(alice.id.clone(), general(), Some(prompt.clone()), vec![url.into()]);

    let mut deleted = Vec::new();
    let view = next(&mut h.out, |o| match o {
        Outbound::MessageDeleted { id } => {
            deleted.push(id);
            None
        }
        Outbound::MessageEdited { id, view } if id == review => Some(view),
        _ => None,
    })
    .await;
    assert_eq!(deleted, [reply_id, prompt]);

    let MessageView::Review {
        content,
        preview,
        controls,
        ..
    } = view
    else {
        panic!("expected review");
    };
    assert_eq!(content, "Image added!");
    assert_eq!(preview.thumbnail.as_deref(), Some(url));
    assert_eq!(controls[1].label, "Change Image");
    assert_eq!(h.controller.state(&alice.id), Some(WorkflowState::Review));
    assert_eq!(
        h.drafts.get(&alice.id).unwrap().image_url.as_deref(),
        Some(url)
    );
}

#[tokio::test]
async fn image_reply_without_attachment_returns_to_review() {
    let mut h = harness(WorkflowConfig::default()).await;
    let alice = alice();

    let (draft_id, review) = reach_review(&mut h, &alice, POTLUCK).await;
    press(&h, &alice, draft_id, ReviewAction::AddImage);
    let (prompt, _, _) = next_sent(&mut h.out).await;

    h.platform
        .post_message(alice.id.clone(), general(), Some(prompt.clone()), Vec::new());

    let (user, text) = next_notice(&mut h.out).await;
    assert_eq!(user, "u1");
    assert_eq!(text, "That reply had no image attached.");
    let removed = next(&mut h.out, |o| match o {
        Outbound::MessageDeleted { id } => Some(id),
        _ => None,
    })
    .await;
    assert_eq!(removed, prompt);

    let view = next(&mut h.out, |o| match o {
        Outbound::MessageEdited { id, view } if id == review => Some(view),
        _ => None,
    })
    .await;
    assert_eq!(view.content(), Some(""));
    assert_eq!(view.controls()[1].label, "Add An Image");
    assert_eq!(h.controller.state(&alice.id), Some(WorkflowState::Review));
    assert!(h.drafts.get(&alice.id).unwrap().image_url.is_none());
}

#[tokio::test]
async fn image_replies_from_other_users_are_ignored() {
    let mut h = harness(WorkflowConfig::default()).await;
    let alice = alice();
    let mallory = User::new("u9", "Mallory");

    let (draft_id, review) = reach_review(&mut h, &alice, POTLUCK).await;
    press(&h, &alice, draft_id, ReviewAction::AddImage);
    let (prompt, _, _) = next_sent(&mut h.out).await;

    let stranger = h.platform.post_message(
        mallory.id.clone(),
        general(),
        Some(prompt.clone()),
        vec!["https://cdn.example/spam.png".into()],
    );
    let url = "https://cdn.example/potluck.png";
    let own = h
        .platform
        .post_message(alice.id.clone(), general(), Some(prompt.clone()), vec![url.into()]);

    let mut deleted = Vec::new();
    let view = next(&mut h.out, |o| match o {
        Outbound::MessageDeleted { id } => {
            deleted.push(id);
            None
        }
        Outbound::MessageEdited { id, view } if id == review => Some(view),
        _ => None,
    })
    .await;
    assert_eq!(deleted, [own, prompt]);
    assert!(!deleted.contains(&stranger));
    assert_eq!(view.content(), Some("Image added!"));
    assert_eq!(
        h.drafts.get(&alice.id).unwrap().image_url.as_deref(),
        Some(url)
    );
}

#[tokio::test]
async fn image_reply_after_moving_on_only_removes_the_prompt() {
    let mut h = harness(WorkflowConfig::default()).await;
    let alice = alice();

    let (draft_id, _) = reach_review(&mut h, &alice, POTLUCK).await;
    press(&h, &alice, draft_id, ReviewAction::AddImage);
    let (prompt, _, _) = next_sent(&mut h.out).await;

    let _task = invoke(&h, Invocation::new(alice.clone(), general()));
    next_form(&mut h.out).await;
    assert_eq!(h.controller.state(&alice.id), Some(WorkflowState::FormOpen));

    h.platform.post_message(
        alice.id.clone(),
        general(),
        Some(prompt.clone()),
        vec!["https://cdn.example/late.png".into()],
    );
    let removed = next(&mut h.out, |o| match o {
        Outbound::MessageDeleted { id } => Some(id),
        _ => None,
    })
    .await;
    assert_eq!(removed, prompt);
    assert!(h.drafts.get(&alice.id).unwrap().image_url.is_none());
    assert_eq!(h.controller.state(&alice.id), Some(WorkflowState::FormOpen));
}

#[tokio::test(start_paused = true)]
async fn image_prompt_times_out_and_is_cleaned_up() {
    let config = WorkflowConfig {
        attachment_timeout: Duration::from_secs(10),
        ..WorkflowConfig::default()
    };
    let mut h = harness(config).await;
    let alice = alice();

    let (draft_id, review) = reach_review(&mut h, &alice, POTLUCK).await;
    press(&h, &alice, draft_id, ReviewAction::AddImage);
    let (prompt, _, _) = next_sent(&mut h.out).await;

    let timed_out = edited_to(&mut h.out, "Sorry, you took too long! Please try again.").await;
    assert_eq!(timed_out, prompt);

    let view = next(&mut h.out, |o| match o {
        Outbound::MessageEdited { id, view } if id == review => Some(view),
        _ => None,
    })
    .await;
    assert_eq!(view.content(), Some(""));
    assert_eq!(h.controller.state(&alice.id), Some(WorkflowState::Review));
    assert!(h.drafts.get(&alice.id).unwrap().image_url.is_none());

    let removed = next(&mut h.out, |o| match o {
        Outbound::MessageDeleted { id } => Some(id),
        _ => None,
    })
    .await;
    assert_eq!(removed, prompt);
}

// ---------------------------------------------------------------------------
// Refusals
// ---------------------------------------------------------------------------

#[tokio::test]
async fn role_gate_refuses_without_touching_drafts() {
    let config = WorkflowConfig {
        roles: RoleGate {
            allowed: vec!["organiser".into()],
            denied: vec![],
        },
        ..WorkflowConfig::default()
    };
    let mut h = harness(config).await;

    let outcome = h
        .controller
        .invoke(Invocation::new(alice(), general()))
        .await
        .unwrap();
    assert_eq!(outcome, InvokeOutcome::Denied);
    let (_, text) = next_notice(&mut h.out).await;
    assert_eq!(text, "You do not have permission to create events.");
    assert!(h.drafts.is_empty());

    let organiser = User::new("u2", "Olive").with_roles(["organiser"]);
    let task = invoke(&h, Invocation::new(organiser, general()));
    next_form(&mut h.out).await;
    assert_eq!(h.drafts.len(), 1);
    task.abort();
}

#[tokio::test]
async fn invocation_without_a_channel_fails() {
    let h = harness(WorkflowConfig::default()).await;
    let invocation = Invocation {
        user: alice(),
        channel: None,
        category: None,
    };

    let err = h.controller.invoke(invocation).await.unwrap_err();
    assert!(matches!(err, Error::MissingContext(_)));
    assert_eq!(
        err.to_string(),
        "This command needs to be triggered in a channel."
    );
    assert!(h.drafts.is_empty());
}

// ---------------------------------------------------------------------------
// Publishing failures
// ---------------------------------------------------------------------------

/// Refuses the first publish, then defers to the shared in-memory store.
struct RefuseFirstPublish {
    inner: Arc<MemoryArtifactStore>,
    refuse: AtomicBool,
}

#[async_trait]
impl ArtifactStore for RefuseFirstPublish {
    async fn publish(&self, artifact: &PublishedArtifact) -> seavent::error::Result<()> {
        if self.refuse.swap(false, Ordering::SeqCst) {
            return Err(Error::Other("store unavailable".into()));
        }
        self.inner.publish(artifact).await
    }

    async fn get(&self, id: ArtifactId) -> seavent::error::Result<PublishedArtifact> {
        self.inner.get(id).await
    }

    async fn edit_attendees(
        &self,
        id: ArtifactId,
        edit: AttendeeEdit,
    ) -> seavent::error::Result<AttendeeUpdate> {
        self.inner.edit_attendees(id, edit).await
    }
}

#[tokio::test]
async fn failed_publish_leaves_nothing_behind_and_can_be_retried() {
    let mut h = harness_with(WorkflowConfig::default(), |inner| {
        let store: Arc<dyn ArtifactStore> = Arc::new(RefuseFirstPublish {
            inner,
            refuse: AtomicBool::new(true),
        });
        store
    })
    .await;
    let alice = alice();

    let (draft_id, review) = reach_review(&mut h, &alice, POTLUCK).await;
    press(&h, &alice, draft_id, ReviewAction::Finish);

    edited_to(&mut h.out, "Creating event...").await;
    let (posted, _, _) = next_sent(&mut h.out).await;
    let removed = next(&mut h.out, |o| match o {
        Outbound::MessageDeleted { id } => Some(id),
        _ => None,
    })
    .await;
    assert_eq!(removed, posted);
    let view = next(&mut h.out, |o| match o {
        Outbound::MessageEdited { id, view } if id == review => Some(view),
        _ => None,
    })
    .await;
    assert!(matches!(view, MessageView::Review { .. }));

    assert!(h.artifacts.all().is_empty());
    assert!(h.platform.message(&posted).is_none());
    assert!(h.drafts.get(&alice.id).is_some());
    assert_eq!(h.controller.state(&alice.id), Some(WorkflowState::Review));
    let attendance = controls::attendance_namespace("bot", draft_id);
    assert!(!h.controller.subscriptions().is_live(&attendance));

    press(&h, &alice, draft_id, ReviewAction::Finish);
    edited_to(&mut h.out, "Event created successfully!").await;
    assert_eq!(h.artifacts.all().len(), 1);
    assert!(h.drafts.is_empty());
    assert!(h.controller.subscriptions().is_live(&attendance));
}
