//! Published artifact persistence.
//!
//! Attendee edits are applied inside the store, against whatever roster is
//! persisted at that moment, so two presses from different users can never
//! overwrite each other with stale copies.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{Error, Result};
use crate::model::{ArtifactId, AttendeeEdit, AttendeeUpdate, PublishedArtifact};

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn publish(&self, artifact: &PublishedArtifact) -> Result<()>;

    async fn get(&self, id: ArtifactId) -> Result<PublishedArtifact>;

    /// Apply `edit` to the persisted roster atomically.
    async fn edit_attendees(&self, id: ArtifactId, edit: AttendeeEdit) -> Result<AttendeeUpdate>;
}

/// Process-local artifact store.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    artifacts: DashMap<ArtifactId, PublishedArtifact>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<PublishedArtifact> {
        let mut all: Vec<_> = self.artifacts.iter().map(|a| a.value().clone()).collect();
        all.sort_by_key(|a| a.published_at);
        all
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn publish(&self, artifact: &PublishedArtifact) -> Result<()> {
        self.artifacts.insert(artifact.id, artifact.clone());
        Ok(())
    }

    async fn get(&self, id: ArtifactId) -> Result<PublishedArtifact> {
        self.artifacts
            .get(&id)
            .map(|a| a.clone())
            .ok_or_else(|| Error::NotFound(format!("artifact {id}")))
    }

    async fn edit_attendees(&self, id: ArtifactId, edit: AttendeeEdit) -> Result<AttendeeUpdate> {
        let mut artifact = self
            .artifacts
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("artifact {id}")))?;
        let changed = artifact.attendees.apply(&edit);
        Ok(AttendeeUpdate {
            changed,
            attendees: artifact.attendees.clone(),
        })
    }
}
