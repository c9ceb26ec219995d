//! Run tracking, per-owner serialization, and the form step.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Local;
use dashmap::DashMap;
use opentelemetry::KeyValue;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, warn};

use super::review::{ReviewHandler, ReviewRun};
use super::{
    DENIED_TEXT, EDIT_TIMEOUT_TEXT, FORM_TIMEOUT_TEXT, Invocation, InvokeOutcome, NO_CHANNEL_TEXT,
};
use crate::artifacts::ArtifactStore;
use crate::attendance::AttendanceLedger;
use crate::config::WorkflowConfig;
use crate::controls;
use crate::drafts::DraftStore;
use crate::error::{Error, Result};
use crate::form::{self, FormOutcome};
use crate::model::{ChannelId, DraftId, EventDraft, MessageId, User, UserId, WorkflowState};
use crate::platform::Platform;
use crate::render;
use crate::subscription::{PressFilter, SubscriptionRegistry};
use crate::telemetry::metrics;
use crate::telemetry::workflow::{record_state_transition, start_workflow_span};

/// Where an owner's current run is.
#[derive(Debug, Clone)]
pub(super) struct RunState {
    pub(super) draft_id: DraftId,
    pub(super) state: WorkflowState,
    /// The review message whose controls are live, while reviewing.
    pub(super) review: Option<MessageId>,
}

impl RunState {
    fn new(draft_id: DraftId) -> Self {
        Self {
            draft_id,
            state: WorkflowState::New,
            review: None,
        }
    }
}

/// The form currently shown for a draft. A newer form cancels the older one.
struct FormSlot {
    generation: u64,
    cancel: CancellationToken,
}

pub(super) struct OpenForm {
    generation: u64,
    cancel: CancellationToken,
}

/// Which path opened the form. Their timeout notices differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum FormEntry {
    Command,
    Edit,
}

/// Drives authoring runs against a [`Platform`].
pub struct WorkflowController {
    pub(super) platform: Arc<dyn Platform>,
    pub(super) drafts: Arc<dyn DraftStore>,
    pub(super) artifacts: Arc<dyn ArtifactStore>,
    pub(super) ledger: AttendanceLedger,
    pub(super) config: Arc<WorkflowConfig>,
    pub(super) subscriptions: Arc<SubscriptionRegistry>,
    runs: Arc<DashMap<UserId, RunState>>,
    turns: Arc<DashMap<UserId, Arc<Mutex<()>>>>,
    forms: Arc<DashMap<DraftId, FormSlot>>,
    form_generation: Arc<AtomicU64>,
}

impl Clone for WorkflowController {
    fn clone(&self) -> Self {
        Self {
            platform: Arc::clone(&self.platform),
            drafts: Arc::clone(&self.drafts),
            artifacts: Arc::clone(&self.artifacts),
            ledger: self.ledger.clone(),
            config: Arc::clone(&self.config),
            subscriptions: Arc::clone(&self.subscriptions),
            runs: Arc::clone(&self.runs),
            turns: Arc::clone(&self.turns),
            forms: Arc::clone(&self.forms),
            form_generation: Arc::clone(&self.form_generation),
        }
    }
}

impl WorkflowController {
    /// Wait for the platform to report ready, then build the controller.
    pub async fn connect(
        platform: Arc<dyn Platform>,
        drafts: Arc<dyn DraftStore>,
        artifacts: Arc<dyn ArtifactStore>,
        config: WorkflowConfig,
    ) -> Self {
        platform.ready().await;
        info!(self_id = platform.self_id(), "platform ready");
        let ledger = AttendanceLedger::new(Arc::clone(&artifacts));
        Self {
            platform,
            drafts,
            artifacts,
            ledger,
            config: Arc::new(config),
            subscriptions: Arc::new(SubscriptionRegistry::new()),
            runs: Arc::new(DashMap::new()),
            turns: Arc::new(DashMap::new()),
            forms: Arc::new(DashMap::new()),
            form_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriptions
    }

    pub fn ledger(&self) -> &AttendanceLedger {
        &self.ledger
    }

    /// State of the owner's current run, if they ever started one.
    pub fn state(&self, owner: &UserId) -> Option<WorkflowState> {
        self.runs.get(owner).map(|run| run.state)
    }

    /// Stop every subscription and abandon open forms.
    pub fn shutdown(&self) {
        for slot in self.forms.iter() {
            slot.cancel.cancel();
        }
        self.subscriptions.stop_all();
        info!("workflow controller shut down");
    }

    /// Handle the authoring command: open or resume the user's draft, show
    /// the form, and wait for the reply.
    ///
    /// Returns once the form step has ended. A valid reply leaves the draft
    /// under review with its controls live in the background.
    pub async fn invoke(&self, invocation: Invocation) -> Result<InvokeOutcome> {
        let Invocation {
            user,
            channel,
            category,
        } = invocation;
        let channel = channel.ok_or_else(|| Error::MissingContext(NO_CHANNEL_TEXT.to_string()))?;

        if !self.config.roles.permits(&user.roles) {
            info!(user = %user.id, "command refused by role gate");
            self.platform.notify(&user.id, &channel, DENIED_TEXT).await?;
            return Ok(InvokeOutcome::Denied);
        }

        let default_category = self
            .config
            .default_category()
            .map(|c| c.name.clone())
            .ok_or_else(|| Error::Config("no event categories configured".to_string()))?;
        let chosen = category.and_then(|name| match self.config.category(&name) {
            Some(c) => Some(c.name.clone()),
            None => {
                warn!(user = %user.id, category = %name, "unknown category requested");
                None
            }
        });

        let turn = self.turn(&user.id).await;
        let defaults = EventDraft::new(user.id.clone(), default_category, Local::now().naive_local());
        let (mut draft, created) = self.drafts.resume_or_create(&user.id, defaults);
        if let Some(name) = chosen.filter(|name| *name != draft.category) {
            draft.category = name;
            self.drafts.put(draft.clone());
        }

        let span = start_workflow_span(&user.id, draft.id);
        metrics::drafts_opened().add(
            1,
            &[KeyValue::new(
                "result",
                if created { "created" } else { "resumed" },
            )],
        );
        info!(parent: &span, created, category = %draft.category, "draft opened");

        self.transition(&span, &user.id, draft.id, WorkflowState::New)?;
        let form = self.begin_form(&span, &user.id, draft.id)?;
        drop(turn);

        self.await_form(span, user, channel, draft, form, FormEntry::Command)
            .await
    }

    /// Serialize steps for one owner. Never held across a user-facing wait.
    pub(super) async fn turn(&self, owner: &UserId) -> OwnedMutexGuard<()> {
        let lock = self.turns.entry(owner.clone()).or_default().clone();
        lock.lock_owned().await
    }

    /// The owner's run, if it is still on `draft_id`.
    pub(super) fn current(&self, owner: &UserId, draft_id: DraftId) -> Option<RunState> {
        self.runs
            .get(owner)
            .filter(|run| run.draft_id == draft_id)
            .map(|run| run.clone())
    }

    pub(super) fn transition(
        &self,
        span: &Span,
        owner: &UserId,
        draft_id: DraftId,
        to: WorkflowState,
    ) -> Result<()> {
        let from = {
            let mut run = self
                .runs
                .entry(owner.clone())
                .or_insert_with(|| RunState::new(draft_id));
            if run.draft_id != draft_id {
                *run = RunState::new(draft_id);
            }
            let from = run.state;
            if !from.can_transition_to(to) {
                return Err(Error::InvalidTransition {
                    from: from.to_string(),
                    to: to.to_string(),
                });
            }
            run.state = to;
            if matches!(to, WorkflowState::New | WorkflowState::FormOpen) {
                run.review = None;
            }
            from
        };

        record_state_transition(span, from, to);
        metrics::workflow_transitions().add(
            1,
            &[
                KeyValue::new("from", from.to_string()),
                KeyValue::new("to", to.to_string()),
            ],
        );
        Ok(())
    }

    /// Claim the form slot for `draft_id` and move the run to FORM_OPEN.
    /// Any form already open for the draft is superseded and the review
    /// controls are stopped. Call with the owner's turn held.
    pub(super) fn begin_form(
        &self,
        span: &Span,
        owner: &UserId,
        draft_id: DraftId,
    ) -> Result<OpenForm> {
        self.transition(span, owner, draft_id, WorkflowState::FormOpen)?;
        self.subscriptions
            .stop(&controls::review_namespace(draft_id));

        let generation = self.form_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let slot = FormSlot {
            generation,
            cancel: cancel.clone(),
        };
        if let Some(previous) = self.forms.insert(draft_id, slot) {
            debug!(parent: span, "superseding open form");
            previous.cancel.cancel();
        }
        Ok(OpenForm { generation, cancel })
    }

    /// Give up the form slot. False if a newer form took it over.
    fn release_form(&self, draft_id: DraftId, generation: u64) -> bool {
        self.forms
            .remove_if(&draft_id, |_, slot| slot.generation == generation)
            .is_some()
    }

    /// Wait for the form reply, then apply it under the owner's turn.
    pub(super) async fn await_form(
        &self,
        span: Span,
        user: User,
        channel: ChannelId,
        draft: EventDraft,
        form: OpenForm,
        entry: FormEntry,
    ) -> Result<InvokeOutcome> {
        let result = form::open(
            self.platform.as_ref(),
            &user,
            &draft,
            self.config.editing_timeout,
            &form.cancel,
        )
        .instrument(span.clone())
        .await;

        let _turn = self.turn(&user.id).await;
        if !self.release_form(draft.id, form.generation) {
            debug!(parent: &span, "form superseded");
            return Ok(InvokeOutcome::Superseded);
        }

        match result? {
            FormOutcome::Superseded => Ok(InvokeOutcome::Superseded),
            FormOutcome::TimedOut => {
                self.transition(&span, &user.id, draft.id, WorkflowState::Expired)?;
                info!(parent: &span, ?entry, "form timed out, draft kept");
                let text = match entry {
                    FormEntry::Command => FORM_TIMEOUT_TEXT,
                    FormEntry::Edit => EDIT_TIMEOUT_TEXT,
                };
                self.platform.notify(&user.id, &channel, text).await?;
                Ok(InvokeOutcome::TimedOut)
            }
            FormOutcome::Submitted {
                user: submitter,
                fields,
            } => {
                let draft_id = draft.id;
                let mut current = self
                    .drafts
                    .get(&user.id)
                    .filter(|d| d.id == draft_id)
                    .unwrap_or(draft);
                match form::validate(&fields) {
                    Err(rejection) => {
                        metrics::form_rejections()
                            .add(1, &[KeyValue::new("reason", rejection.reason())]);
                        info!(parent: &span, reason = rejection.reason(), "form reply rejected");
                        self.drafts.put(current);
                        self.transition(&span, &user.id, draft_id, WorkflowState::FormOpen)?;
                        self.platform
                            .notify(&submitter.id, &channel, &rejection.to_string())
                            .await?;
                        Ok(InvokeOutcome::InvalidInput(rejection))
                    }
                    Ok(valid) => {
                        valid.apply_to(&mut current);
                        self.drafts.put(current.clone());
                        self.open_review(&span, &submitter, &channel, &current, "")
                            .await?;
                        Ok(InvokeOutcome::Reviewing(current.id))
                    }
                }
            }
        }
    }

    /// Post the preview with its review controls and start listening.
    pub(super) async fn open_review(
        &self,
        span: &Span,
        user: &User,
        channel: &ChannelId,
        draft: &EventDraft,
        content: &str,
    ) -> Result<()> {
        let namespace = controls::review_namespace(draft.id);
        self.subscriptions.stop(&namespace);

        let events = self.platform.events();
        let message = self
            .platform
            .send_message(channel, render::review(draft, content))
            .await?;
        self.transition(span, &user.id, draft.id, WorkflowState::Review)?;
        if let Some(mut run) = self.runs.get_mut(&user.id) {
            run.review = Some(message.clone());
        }

        let handler = ReviewHandler::new(
            self.clone(),
            ReviewRun {
                user: user.clone(),
                channel: channel.clone(),
                draft_id: draft.id,
                message,
            },
        );
        self.subscriptions.get_or_create(
            PressFilter {
                namespace,
                user: Some(user.id.clone()),
            },
            Some(self.config.editing_timeout),
            events,
            handler,
        );
        info!(parent: span, "review opened");
        Ok(())
    }
}
