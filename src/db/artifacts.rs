//! Artifact persistence on Postgres.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::types::Json;
use tracing::debug;
use uuid::Uuid;

use crate::artifacts::ArtifactStore;
use crate::error::{Error, Result};
use crate::model::{
    ArtifactId, Attendee, AttendeeEdit, AttendeeList, AttendeeUpdate, ChannelId, DraftId,
    PublishedArtifact, UserId,
};

#[async_trait]
impl ArtifactStore for super::Db {
    async fn publish(&self, artifact: &PublishedArtifact) -> Result<()> {
        sqlx::query(
            "INSERT INTO artifacts (id, draft_id, author_id, author_name, name, description, location, image_url, start_time, end_time, duration_hours, category, channel, attendees, published_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
        )
        .bind(artifact.id.0)
        .bind(artifact.draft_id.0)
        .bind(artifact.author.user_id.as_str())
        .bind(&artifact.author.display_name)
        .bind(&artifact.name)
        .bind(&artifact.description)
        .bind(&artifact.location)
        .bind(&artifact.image_url)
        .bind(artifact.start_time)
        .bind(artifact.end_time)
        .bind(artifact.duration_hours)
        .bind(&artifact.category)
        .bind(&artifact.channel.0)
        .bind(Json(&artifact.attendees))
        .bind(artifact.published_at)
        .execute(&self.pool)
        .await?;
        debug!(artifact = %artifact.id, "artifact stored");
        Ok(())
    }

    async fn get(&self, id: ArtifactId) -> Result<PublishedArtifact> {
        let row: Option<ArtifactRow> = sqlx::query_as(
            "SELECT id, draft_id, author_id, author_name, name, description, location, image_url, start_time, end_time, duration_hours, category, channel, attendees, published_at
             FROM artifacts WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ArtifactRow::into_artifact)
            .ok_or_else(|| Error::NotFound(format!("artifact {id}")))
    }

    /// Lock the row, apply the edit to the roster as stored, write it back.
    async fn edit_attendees(&self, id: ArtifactId, edit: AttendeeEdit) -> Result<AttendeeUpdate> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(Json<AttendeeList>,)> =
            sqlx::query_as("SELECT attendees FROM artifacts WHERE id = $1 FOR UPDATE")
                .bind(id.0)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((Json(mut attendees),)) = row else {
            return Err(Error::NotFound(format!("artifact {id}")));
        };

        let changed = attendees.apply(&edit);
        if changed {
            sqlx::query("UPDATE artifacts SET attendees = $1 WHERE id = $2")
                .bind(Json(&attendees))
                .bind(id.0)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(AttendeeUpdate { changed, attendees })
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct ArtifactRow {
    id: Uuid,
    draft_id: Uuid,
    author_id: String,
    author_name: String,
    name: String,
    description: String,
    location: String,
    image_url: Option<String>,
    start_time: NaiveDateTime,
    end_time: NaiveDateTime,
    duration_hours: f64,
    category: String,
    channel: String,
    attendees: Json<AttendeeList>,
    published_at: DateTime<Utc>,
}

impl ArtifactRow {
    fn into_artifact(self) -> PublishedArtifact {
        PublishedArtifact {
            id: ArtifactId(self.id),
            draft_id: DraftId(self.draft_id),
            author: Attendee {
                display_name: self.author_name,
                user_id: UserId(self.author_id),
            },
            name: self.name,
            description: self.description,
            location: self.location,
            image_url: self.image_url,
            start_time: self.start_time,
            end_time: self.end_time,
            duration_hours: self.duration_hours,
            category: self.category,
            channel: ChannelId(self.channel),
            attendees: self.attendees.0,
            published_at: self.published_at,
        }
    }
}
