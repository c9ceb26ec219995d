//! Review controls: edit, add an image, save, finish, cancel.
//!
//! Every press re-checks, under the owner's turn, that the run is still
//! reviewing this draft through this message. Presses that lost a race with
//! another step are dropped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use opentelemetry::KeyValue;
use tokio::sync::OwnedMutexGuard;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;
use tracing::{Instrument, Span, debug, info, warn};

use super::controller::{FormEntry, WorkflowController};
use super::{
    ADDING_IMAGE_TEXT, CANCELLED_TEXT, CREATED_TEXT, CREATING_TEXT, IMAGE_ADDED_TEXT,
    IMAGE_TIMEOUT_TEXT, NO_IMAGE_TEXT, REVIEW_TIMEOUT_TEXT, image_prompt_text,
};
use crate::attendance::AttendanceHandler;
use crate::controls::{self, ReviewAction};
use crate::error::{Error, Result};
use crate::model::{
    ChannelId, DraftId, EventDraft, MessageId, PublishedArtifact, User, UserId, WorkflowState,
};
use crate::platform::{ControlPress, InboundEvent, MessageView, PostedMessage};
use crate::render;
use crate::subscription::{PressFilter, PressHandler};
use crate::telemetry::metrics;
use crate::telemetry::workflow::start_workflow_span;
use crate::time::minutes;

/// Minutes the "took too long" notice stays up before it is deleted.
const PROMPT_CLEANUP_MINUTES: u64 = 1;

/// The review a handler serves.
#[derive(Debug, Clone)]
pub(super) struct ReviewRun {
    pub(super) user: User,
    pub(super) channel: ChannelId,
    pub(super) draft_id: DraftId,
    pub(super) message: MessageId,
}

pub(super) struct ReviewHandler {
    controller: WorkflowController,
    run: ReviewRun,
}

impl ReviewHandler {
    pub(super) fn new(controller: WorkflowController, run: ReviewRun) -> Self {
        Self { controller, run }
    }
}

#[async_trait]
impl PressHandler for ReviewHandler {
    type Action = ReviewAction;

    async fn on_press(&self, action: ReviewAction, press: ControlPress) -> Result<()> {
        let span = start_workflow_span(&self.run.user.id, self.run.draft_id);
        let controller = &self.controller;
        let run = &self.run;
        async move {
            match action {
                ReviewAction::Edit => controller.edit(run).await,
                ReviewAction::AddImage => controller.add_image(run).await,
                ReviewAction::Save => controller.save(run).await,
                ReviewAction::Finish => controller.finish(run, &press.user).await,
                ReviewAction::Cancel => controller.cancel(run).await,
            }
        }
        .instrument(span)
        .await
    }

    async fn on_expired(&self) -> Result<()> {
        let span = start_workflow_span(&self.run.user.id, self.run.draft_id);
        self.controller
            .expire_review(&self.run)
            .instrument(span)
            .await
    }
}

impl WorkflowController {
    /// Take the owner's turn if `run` is still the live review.
    async fn review_turn(&self, run: &ReviewRun) -> Option<OwnedMutexGuard<()>> {
        self.turn_in(run, WorkflowState::Review).await
    }

    async fn turn_in(&self, run: &ReviewRun, state: WorkflowState) -> Option<OwnedMutexGuard<()>> {
        let turn = self.turn(&run.user.id).await;
        let live = self
            .current(&run.user.id, run.draft_id)
            .is_some_and(|r| r.state == state && r.review.as_ref() == Some(&run.message));
        if live {
            Some(turn)
        } else {
            debug!(message = %run.message, expected = %state, "stale review step ignored");
            None
        }
    }

    fn stored_draft(&self, owner: &UserId, draft_id: DraftId) -> Result<EventDraft> {
        self.drafts
            .get(owner)
            .filter(|d| d.id == draft_id)
            .ok_or_else(|| Error::NotFound(format!("draft {draft_id} for {owner}")))
    }

    async fn edit(&self, run: &ReviewRun) -> Result<()> {
        let Some(turn) = self.review_turn(run).await else {
            return Ok(());
        };
        let draft = self.stored_draft(&run.user.id, run.draft_id)?;
        let span = Span::current();
        let form = self.begin_form(&span, &run.user.id, draft.id)?;
        self.platform.delete_message(&run.message).await?;
        drop(turn);

        let outcome = self
            .await_form(span, run.user.clone(), run.channel.clone(), draft, form, FormEntry::Edit)
            .await?;
        debug!(?outcome, "edit finished");
        Ok(())
    }

    async fn add_image(&self, run: &ReviewRun) -> Result<()> {
        let owner = &run.user.id;
        let Some(turn) = self.review_turn(run).await else {
            return Ok(());
        };
        let span = Span::current();
        self.transition(&span, owner, run.draft_id, WorkflowState::AwaitingImage)?;
        self.platform
            .edit_message(&run.message, MessageView::text(ADDING_IMAGE_TEXT))
            .await?;
        let mut events = self.platform.events();
        let prompt = self
            .platform
            .send_message(&run.channel, MessageView::text(image_prompt_text(&run.user)))
            .await?;
        drop(turn);

        let reply =
            await_reply(&mut events, owner, &prompt, self.config.attachment_timeout).await?;

        let Some(_turn) = self.turn_in(run, WorkflowState::AwaitingImage).await else {
            // The user moved on while we waited.
            if let Err(e) = self.platform.delete_message(&prompt).await {
                warn!(message = %prompt, "failed to delete image prompt: {e}");
            }
            return Ok(());
        };
        let mut draft = self.stored_draft(owner, run.draft_id)?;

        let content = match reply {
            Some(reply) => match reply.attachments.first() {
                Some(url) => {
                    draft.image_url = Some(url.clone());
                    self.drafts.put(draft.clone());
                    info!(image = %url, "image attached");
                    self.platform.delete_message(&reply.id).await?;
                    self.platform.delete_message(&prompt).await?;
                    IMAGE_ADDED_TEXT
                }
                None => {
                    self.platform
                        .notify(owner, &run.channel, NO_IMAGE_TEXT)
                        .await?;
                    self.platform.delete_message(&prompt).await?;
                    ""
                }
            },
            None => {
                info!("image prompt timed out");
                self.platform
                    .edit_message(&prompt, MessageView::text(IMAGE_TIMEOUT_TEXT))
                    .await?;
                let platform = Arc::clone(&self.platform);
                tokio::spawn(async move {
                    tokio::time::sleep(minutes(PROMPT_CLEANUP_MINUTES)).await;
                    if let Err(e) = platform.delete_message(&prompt).await {
                        warn!(message = %prompt, "failed to delete image prompt: {e}");
                    }
                });
                ""
            }
        };

        self.transition(&span, owner, run.draft_id, WorkflowState::Review)?;
        self.platform
            .edit_message(&run.message, render::review(&draft, content))
            .await
    }

    async fn save(&self, run: &ReviewRun) -> Result<()> {
        let Some(_turn) = self.review_turn(run).await else {
            return Ok(());
        };
        let draft = self.stored_draft(&run.user.id, run.draft_id)?;
        self.drafts.put(draft);
        self.subscriptions
            .stop(&controls::review_namespace(run.draft_id));
        self.transition(&Span::current(), &run.user.id, run.draft_id, WorkflowState::Saved)?;
        info!("draft saved for later");
        self.platform
            .edit_message(&run.message, MessageView::text(self.config.saved_text()))
            .await
    }

    async fn finish(&self, run: &ReviewRun, author: &User) -> Result<()> {
        let owner = &run.user.id;
        let Some(_turn) = self.review_turn(run).await else {
            return Ok(());
        };
        let draft = self.stored_draft(owner, run.draft_id)?;
        let channel = self
            .config
            .category(&draft.category)
            .map(|c| c.channel.clone())
            .unwrap_or_else(|| run.channel.clone());
        let artifact = PublishedArtifact::from_draft(&draft, author, channel.clone())?;
        self.platform
            .edit_message(&run.message, MessageView::text(CREATING_TEXT))
            .await?;

        let namespace = controls::attendance_namespace(self.platform.self_id(), draft.id);
        let events = self.platform.events();
        let posted = match self.post_artifact(&artifact, &namespace).await {
            Ok(posted) => posted,
            Err(e) => {
                warn!(artifact = %artifact.id, "publish failed, review restored: {e}");
                if let Err(restore) = self
                    .platform
                    .edit_message(&run.message, render::review(&draft, ""))
                    .await
                {
                    warn!(message = %run.message, "failed to restore review: {restore}");
                }
                return Err(e);
            }
        };
        let handler = AttendanceHandler::new(
            self.ledger.clone(),
            Arc::clone(&self.platform),
            artifact.clone(),
            posted,
            namespace.clone(),
        );
        self.subscriptions.get_or_create(
            PressFilter {
                namespace,
                user: None,
            },
            None,
            events,
            handler,
        );

        self.drafts.remove(owner);
        self.subscriptions
            .stop(&controls::review_namespace(run.draft_id));
        self.transition(&Span::current(), owner, run.draft_id, WorkflowState::Published)?;
        metrics::artifacts_published()
            .add(1, &[KeyValue::new("category", artifact.category.clone())]);
        info!(artifact = %artifact.id, channel = %channel, "event published");

        self.platform
            .edit_message(&run.message, MessageView::text(CREATED_TEXT))
            .await
    }

    /// Post the artifact, then persist it. A post whose artifact could not
    /// be stored is taken down again, so either both exist or neither does.
    async fn post_artifact(
        &self,
        artifact: &PublishedArtifact,
        namespace: &str,
    ) -> Result<MessageId> {
        let posted = self
            .platform
            .send_message(&artifact.channel, render::artifact(artifact, namespace))
            .await?;
        if let Err(e) = self.artifacts.publish(artifact).await {
            if let Err(cleanup) = self.platform.delete_message(&posted).await {
                warn!(message = %posted, "failed to take down unpublished artifact: {cleanup}");
            }
            return Err(e);
        }
        Ok(posted)
    }

    async fn cancel(&self, run: &ReviewRun) -> Result<()> {
        let Some(_turn) = self.review_turn(run).await else {
            return Ok(());
        };
        self.drafts.remove(&run.user.id);
        self.subscriptions
            .stop(&controls::review_namespace(run.draft_id));
        self.transition(&Span::current(), &run.user.id, run.draft_id, WorkflowState::Cancelled)?;
        info!("draft cancelled");
        self.platform
            .edit_message(&run.message, MessageView::text(CANCELLED_TEXT))
            .await
    }

    async fn expire_review(&self, run: &ReviewRun) -> Result<()> {
        let Some(_turn) = self.review_turn(run).await else {
            return Ok(());
        };
        self.subscriptions
            .stop(&controls::review_namespace(run.draft_id));
        self.transition(&Span::current(), &run.user.id, run.draft_id, WorkflowState::Expired)?;
        info!("review timed out, draft kept");
        self.platform
            .edit_message(&run.message, MessageView::text(REVIEW_TIMEOUT_TEXT))
            .await
    }
}

/// Wait for `owner` to reply to `prompt`. `None` if the window runs out.
async fn await_reply(
    events: &mut broadcast::Receiver<InboundEvent>,
    owner: &UserId,
    prompt: &MessageId,
    timeout: Duration,
) -> Result<Option<PostedMessage>> {
    let deadline = Instant::now() + timeout;
    loop {
        let event = tokio::select! {
            biased;
            _ = tokio::time::sleep_until(deadline) => return Ok(None),
            event = events.recv() => event,
        };
        match event {
            Ok(InboundEvent::MessagePosted(posted))
                if posted.reply_to.as_ref() == Some(prompt) && &posted.author == owner =>
            {
                return Ok(Some(posted));
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(prompt = %prompt, skipped, "reply listener lagged");
            }
            Err(RecvError::Closed) => {
                return Err(Error::Platform("event stream closed".to_string()));
            }
        }
    }
}
