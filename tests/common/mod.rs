//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use seavent::artifacts::{ArtifactStore, MemoryArtifactStore};
use seavent::config::WorkflowConfig;
use seavent::controls;
use seavent::drafts::MemoryDraftStore;
use seavent::model::{ChannelId, MessageId};
use seavent::platform::{Form, LocalPlatform, MessageView, Outbound};
use seavent::workflow::WorkflowController;
use tokio::sync::broadcast;

pub struct Harness {
    pub platform: Arc<LocalPlatform>,
    pub drafts: Arc<MemoryDraftStore>,
    pub artifacts: Arc<MemoryArtifactStore>,
    pub controller: WorkflowController,
    pub out: broadcast::Receiver<Outbound>,
}

pub async fn harness(config: WorkflowConfig) -> Harness {
    harness_with(config, |artifacts| artifacts as Arc<dyn ArtifactStore>).await
}

/// Like [`harness`], but the controller persists through whatever `store`
/// builds around the shared in-memory artifacts.
pub async fn harness_with(
    config: WorkflowConfig,
    store: impl FnOnce(Arc<MemoryArtifactStore>) -> Arc<dyn ArtifactStore>,
) -> Harness {
    let platform = Arc::new(LocalPlatform::new("bot"));
    let drafts = Arc::new(MemoryDraftStore::new());
    let artifacts = Arc::new(MemoryArtifactStore::new());
    let out = platform.outbound();
    let controller = WorkflowController::connect(
        platform.clone(),
        drafts.clone(),
        store(artifacts.clone()),
        config,
    )
    .await;
    Harness {
        platform,
        drafts,
        artifacts,
        controller,
        out,
    }
}

pub fn general() -> ChannelId {
    ChannelId::new("general")
}

/// Wait for the first outbound item `pick` accepts. The bound is generous
/// so paused-clock tests can auto-advance through workflow timeouts first.
pub async fn next<T>(
    out: &mut broadcast::Receiver<Outbound>,
    mut pick: impl FnMut(Outbound) -> Option<T>,
) -> T {
    tokio::time::timeout(Duration::from_secs(6 * 3600), async {
        loop {
            let item = out.recv().await.expect("outbound stream ended");
            if let Some(found) = pick(item) {
                return found;
            }
        }
    })
    .await
    .expect("timed out waiting for outbound")
}

pub async fn next_form(out: &mut broadcast::Receiver<Outbound>) -> Form {
    next(out, |o| match o {
        Outbound::FormShown { form, .. } => Some(form),
        _ => None,
    })
    .await
}

pub async fn next_sent(out: &mut broadcast::Receiver<Outbound>) -> (MessageId, ChannelId, MessageView) {
    next(out, |o| match o {
        Outbound::MessageSent { id, channel, view } => Some((id, channel, view)),
        _ => None,
    })
    .await
}

pub async fn next_notice(out: &mut broadcast::Receiver<Outbound>) -> (String, String) {
    next(out, |o| match o {
        Outbound::Notice { user, text, .. } => Some((user.to_string(), text)),
        _ => None,
    })
    .await
}

/// Next edit whose text view reads `text`.
pub async fn edited_to(out: &mut broadcast::Receiver<Outbound>, text: &str) -> MessageId {
    next(out, |o| match o {
        Outbound::MessageEdited { id, view } if view.content() == Some(text) => Some(id),
        _ => None,
    })
    .await
}

/// Build a form reply. Unnamed fields keep their pre-filled values.
pub fn reply(form: &Form, values: &[(&str, &str)]) -> HashMap<String, String> {
    values
        .iter()
        .map(|(key, value)| (controls::field_id(&form.id, key), value.to_string()))
        .collect()
}

pub fn prefilled(form: &Form, key: &str) -> String {
    let id = controls::field_id(&form.id, key);
    form.fields
        .iter()
        .find(|f| f.id == id)
        .map(|f| f.value.clone())
        .expect("field present")
}
