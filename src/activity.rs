//! Append-only activity log. Every other component writes lead history
//! through this service; entries are never mutated or deleted.

use crate::error::{CoreError, CoreResult};
use crate::models::{ActivityType, LeadActivity};
use crate::services::IdentityResolver;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

#[derive(Clone)]
pub struct ActivityService {
    pool: PgPool,
    identity: Arc<dyn IdentityResolver>,
}

impl ActivityService {
    pub fn new(pool: PgPool, identity: Arc<dyn IdentityResolver>) -> Self {
        Self { pool, identity }
    }

    /// Append an activity entry. Fails with `NotFound` if the lead does not
    /// exist. A failed actor-name lookup falls back to "Unknown"/"System"
    /// and never fails the write.
    pub async fn record(
        &self,
        lead_id: Uuid,
        activity_type: ActivityType,
        title: &str,
        description: Option<&str>,
        metadata: Option<JsonValue>,
        actor: Option<Uuid>,
        automated: bool,
    ) -> CoreResult<LeadActivity> {
        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM leads WHERE id = $1")
            .bind(lead_id)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(CoreError::not_found("Lead"));
        }

        let created_by_name = match actor {
            Some(user_id) => match self.identity.profile(user_id).await {
                Some(profile) => Some(profile.display_name()),
                None => Some("Unknown".to_string()),
            },
            None if automated => Some("System".to_string()),
            None => None,
        };

        let activity = sqlx::query_as::<_, LeadActivity>(
            r#"
            INSERT INTO lead_activities
            (id, lead_id, activity_type, title, description, metadata, created_by, created_by_name, automated, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(lead_id)
        .bind(activity_type.as_str())
        .bind(title)
        .bind(description)
        .bind(metadata)
        .bind(actor)
        .bind(created_by_name)
        .bind(automated)
        .fetch_one(&self.pool)
        .await?;

        Ok(activity)
    }

    /// Most recent activities for a lead, newest first.
    pub async fn recent_activity(&self, lead_id: Uuid, limit: i64) -> CoreResult<Vec<LeadActivity>> {
        let activities = sqlx::query_as::<_, LeadActivity>(
            "SELECT * FROM lead_activities WHERE lead_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(lead_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(activities)
    }

    /// Count of activities recorded since `since` (engagement window).
    pub async fn activity_count_since(
        &self,
        lead_id: Uuid,
        since: DateTime<Utc>,
    ) -> CoreResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM lead_activities WHERE lead_id = $1 AND created_at >= $2",
        )
        .bind(lead_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    // ===== Convenience wrappers =====
    //
    // Each wrapper performs at most ONE side-effecting counter update
    // alongside the append, so a retried append double-applies only that
    // single counter (at-least-once).

    pub async fn log_contact_attempted(
        &self,
        lead_id: Uuid,
        method: &str,
        actor: Option<Uuid>,
    ) -> CoreResult<LeadActivity> {
        self.record(
            lead_id,
            ActivityType::ContactAttempted,
            &format!("Contact attempted via {}", method),
            None,
            None,
            actor,
            false,
        )
        .await
    }

    pub async fn log_contact_made(
        &self,
        lead_id: Uuid,
        method: &str,
        notes: Option<&str>,
        actor: Option<Uuid>,
    ) -> CoreResult<LeadActivity> {
        self.record(
            lead_id,
            ActivityType::ContactMade,
            &format!("Contact made via {}", method),
            notes,
            None,
            actor,
            false,
        )
        .await
    }

    pub async fn log_email_sent(
        &self,
        lead_id: Uuid,
        subject: &str,
        automated: bool,
        actor: Option<Uuid>,
    ) -> CoreResult<LeadActivity> {
        self.record(
            lead_id,
            ActivityType::EmailSent,
            &format!("Email sent: {}", subject),
            None,
            None,
            actor,
            automated,
        )
        .await
    }

    /// Logs an email open and increments the lead's open counter.
    pub async fn log_email_opened(&self, lead_id: Uuid, subject: &str) -> CoreResult<LeadActivity> {
        let activity = self
            .record(
                lead_id,
                ActivityType::EmailOpened,
                &format!("Email opened: {}", subject),
                None,
                None,
                None,
                true,
            )
            .await?;

        sqlx::query("UPDATE leads SET email_opens = email_opens + 1, updated_at = NOW() WHERE id = $1")
            .bind(lead_id)
            .execute(&self.pool)
            .await?;

        Ok(activity)
    }

    /// Logs an email click and increments the lead's click counter.
    pub async fn log_email_clicked(
        &self,
        lead_id: Uuid,
        url: Option<&str>,
    ) -> CoreResult<LeadActivity> {
        let metadata = url.map(|u| serde_json::json!({ "url": u }));
        let activity = self
            .record(
                lead_id,
                ActivityType::EmailClicked,
                "Email link clicked",
                None,
                metadata,
                None,
                true,
            )
            .await?;

        sqlx::query("UPDATE leads SET email_clicks = email_clicks + 1, updated_at = NOW() WHERE id = $1")
            .bind(lead_id)
            .execute(&self.pool)
            .await?;

        Ok(activity)
    }

    pub async fn log_status_changed(
        &self,
        lead_id: Uuid,
        old_status: &str,
        new_status: &str,
        actor: Option<Uuid>,
        automated: bool,
    ) -> CoreResult<LeadActivity> {
        self.record(
            lead_id,
            ActivityType::StatusChanged,
            &format!("Status changed from {} to {}", old_status, new_status),
            None,
            Some(serde_json::json!({ "old_status": old_status, "new_status": new_status })),
            actor,
            automated,
        )
        .await
    }

    pub async fn log_note(
        &self,
        lead_id: Uuid,
        note: &str,
        actor: Option<Uuid>,
    ) -> CoreResult<LeadActivity> {
        self.record(
            lead_id,
            ActivityType::NoteAdded,
            "Note added",
            Some(note),
            None,
            actor,
            false,
        )
        .await
    }

    pub async fn log_task_created(
        &self,
        lead_id: Uuid,
        task_title: &str,
        actor: Option<Uuid>,
        automated: bool,
    ) -> CoreResult<LeadActivity> {
        self.record(
            lead_id,
            ActivityType::TaskCreated,
            &format!("Task created: {}", task_title),
            None,
            None,
            actor,
            automated,
        )
        .await
    }

    pub async fn log_task_completed(
        &self,
        lead_id: Uuid,
        task_title: &str,
        actor: Option<Uuid>,
    ) -> CoreResult<LeadActivity> {
        self.record(
            lead_id,
            ActivityType::TaskCompleted,
            &format!("Task completed: {}", task_title),
            None,
            None,
            actor,
            false,
        )
        .await
    }

    /// Logs a form view and stamps the lead's `last_viewed_at`.
    pub async fn log_form_viewed(&self, lead_id: Uuid, form: &str) -> CoreResult<LeadActivity> {
        let activity = self
            .record(
                lead_id,
                ActivityType::FormViewed,
                &format!("Viewed form: {}", form),
                None,
                None,
                None,
                true,
            )
            .await?;

        sqlx::query("UPDATE leads SET last_viewed_at = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(lead_id)
            .execute(&self.pool)
            .await?;

        Ok(activity)
    }

    pub async fn log_document_uploaded(
        &self,
        lead_id: Uuid,
        file_name: &str,
        actor: Option<Uuid>,
    ) -> CoreResult<LeadActivity> {
        self.record(
            lead_id,
            ActivityType::DocumentUploaded,
            &format!("Document uploaded: {}", file_name),
            None,
            None,
            actor,
            false,
        )
        .await
    }

    pub async fn log_meeting_scheduled(
        &self,
        lead_id: Uuid,
        scheduled_for: DateTime<Utc>,
        actor: Option<Uuid>,
    ) -> CoreResult<LeadActivity> {
        self.record(
            lead_id,
            ActivityType::MeetingScheduled,
            "Meeting scheduled",
            None,
            Some(serde_json::json!({ "scheduled_for": scheduled_for.to_rfc3339() })),
            actor,
            false,
        )
        .await
    }

    pub async fn log_meeting_completed(
        &self,
        lead_id: Uuid,
        notes: Option<&str>,
        actor: Option<Uuid>,
    ) -> CoreResult<LeadActivity> {
        self.record(
            lead_id,
            ActivityType::MeetingCompleted,
            "Meeting completed",
            notes,
            None,
            actor,
            false,
        )
        .await
    }

    pub async fn log_converted(
        &self,
        lead_id: Uuid,
        actor: Option<Uuid>,
        automated: bool,
    ) -> CoreResult<LeadActivity> {
        self.record(
            lead_id,
            ActivityType::Converted,
            "Lead converted to client",
            None,
            None,
            actor,
            automated,
        )
        .await
    }

    pub async fn log_assigned(
        &self,
        lead_id: Uuid,
        preparer_name: &str,
        actor: Option<Uuid>,
        automated: bool,
    ) -> CoreResult<LeadActivity> {
        self.record(
            lead_id,
            ActivityType::Assigned,
            &format!("Assigned to {}", preparer_name),
            None,
            None,
            actor,
            automated,
        )
        .await
    }
}

/// Shared helper for callers that want activity logging to be best-effort
/// (workflow handlers log but never fail their action on a log error).
pub async fn log_best_effort<F>(fut: F)
where
    F: std::future::Future<Output = CoreResult<LeadActivity>>,
{
    if let Err(e) = fut.await {
        warn!("Activity log write failed: {}", e);
    }
}
