//! Per-user draft storage.
//!
//! At most one draft exists per owner. The store does no locking of its own
//! beyond keeping single-key operations atomic: the workflow controller
//! serializes everything that happens to one owner's draft.

use dashmap::DashMap;
use tracing::debug;

use crate::model::{EventDraft, UserId};

/// Keyed draft storage, injected into the workflow controller.
pub trait DraftStore: Send + Sync {
    /// Return the owner's existing draft, or store `defaults` and return it.
    /// The returned flag is true when `defaults` was stored.
    fn resume_or_create(&self, owner: &UserId, defaults: EventDraft) -> (EventDraft, bool);

    fn get(&self, owner: &UserId) -> Option<EventDraft>;

    /// Overwrite the draft stored under `draft.owner`.
    fn put(&self, draft: EventDraft);

    fn remove(&self, owner: &UserId) -> Option<EventDraft>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local draft store. Lost on restart, which is fine: drafts are
/// conveniences, not records.
#[derive(Debug, Default)]
pub struct MemoryDraftStore {
    drafts: DashMap<UserId, EventDraft>,
}

impl MemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DraftStore for MemoryDraftStore {
    fn resume_or_create(&self, owner: &UserId, defaults: EventDraft) -> (EventDraft, bool) {
        let mut created = false;
        let draft = self
            .drafts
            .entry(owner.clone())
            .or_insert_with(|| {
                created = true;
                EventDraft {
                    owner: owner.clone(),
                    ..defaults
                }
            })
            .clone();
        debug!(owner = %owner, draft_id = %draft.id, created, "draft opened");
        (draft, created)
    }

    fn get(&self, owner: &UserId) -> Option<EventDraft> {
        self.drafts.get(owner).map(|d| d.clone())
    }

    fn put(&self, draft: EventDraft) {
        self.drafts.insert(draft.owner.clone(), draft);
    }

    fn remove(&self, owner: &UserId) -> Option<EventDraft> {
        self.drafts.remove(owner).map(|(_, d)| d)
    }

    fn len(&self) -> usize {
        self.drafts.len()
    }
}
