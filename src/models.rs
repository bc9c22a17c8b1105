//! Row types and enumerations shared by the lead lifecycle services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

/// A prospective client captured via a form or marketing touchpoint.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Lead {
    pub id: Uuid,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: String,
    pub source: Option<String>,
    pub state: Option<String>,
    pub filing_status: Option<String>,
    pub annual_income: Option<i64>,
    pub lead_score: Option<i32>,
    pub lead_score_updated_at: Option<DateTime<Utc>>,
    pub urgency: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub converted: bool,
    pub email_opens: i32,
    pub email_clicks: i32,
    pub last_viewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Lead {
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(first), None) => first.clone(),
            (None, Some(last)) => last.clone(),
            (None, None) => "Unknown".to_string(),
        }
    }
}

/// Immutable activity record; never updated or deleted after insert.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LeadActivity {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub activity_type: String,
    pub title: String,
    pub description: Option<String>,
    pub metadata: Option<JsonValue>,
    pub created_by: Option<Uuid>,
    pub created_by_name: Option<String>,
    pub automated: bool,
    pub created_at: DateTime<Utc>,
}

/// Enumerated kinds of lead activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    ContactAttempted,
    ContactMade,
    EmailSent,
    EmailOpened,
    EmailClicked,
    StatusChanged,
    NoteAdded,
    TaskCreated,
    TaskCompleted,
    FormViewed,
    DocumentUploaded,
    MeetingScheduled,
    MeetingCompleted,
    Converted,
    Assigned,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContactAttempted => "contact_attempted",
            Self::ContactMade => "contact_made",
            Self::EmailSent => "email_sent",
            Self::EmailOpened => "email_opened",
            Self::EmailClicked => "email_clicked",
            Self::StatusChanged => "status_changed",
            Self::NoteAdded => "note_added",
            Self::TaskCreated => "task_created",
            Self::TaskCompleted => "task_completed",
            Self::FormViewed => "form_viewed",
            Self::DocumentUploaded => "document_uploaded",
            Self::MeetingScheduled => "meeting_scheduled",
            Self::MeetingCompleted => "meeting_completed",
            Self::Converted => "converted",
            Self::Assigned => "assigned",
        }
    }
}

/// One attributed click and its journey through the funnel.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LinkClick {
    pub id: Uuid,
    pub link_id: Uuid,
    pub tracking_code: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub clicked_at: DateTime<Utc>,
    pub intake_started_at: Option<DateTime<Utc>>,
    pub intake_completed_at: Option<DateTime<Utc>>,
    pub tax_return_completed_at: Option<DateTime<Utc>>,
    pub converted: bool,
    pub client_id: Option<Uuid>,
    pub stage_metadata: Option<JsonValue>,
}

/// Marketing link aggregate with running counters and derived rates.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MarketingLink {
    pub id: Uuid,
    pub name: String,
    pub destination_url: String,
    pub created_by: Option<Uuid>,
    pub clicks: i64,
    pub intake_starts: i64,
    pub intake_completes: i64,
    pub returns_filed: i64,
    pub conversions: i64,
    pub intake_conversion_rate: f64,
    pub complete_conversion_rate: f64,
    pub filed_conversion_rate: f64,
    pub created_at: DateTime<Utc>,
}

/// Coarse priority classification derived from score and recency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Urgency {
    Low,
    Normal,
    High,
    Urgent,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Normal => "NORMAL",
            Self::High => "HIGH",
            Self::Urgent => "URGENT",
        }
    }
}

/// An automation rule bound to a trigger and an ordered chain of actions.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowRecord {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub trigger: String,
    pub trigger_conditions: Option<JsonValue>,
    pub priority: i32,
    pub is_active: bool,
    pub created_by: Option<Uuid>,
    pub execution_count: i32,
    pub success_count: i32,
    pub failure_count: i32,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowActionRecord {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub action_type: String,
    pub action_config: JsonValue,
    pub action_order: i32,
    pub conditions: Option<JsonValue>,
    pub delay_minutes: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::Type)]
#[sqlx(type_name = "execution_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

/// Audit trail for one (workflow, lead) run; immutable once completed.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub lead_id: Uuid,
    pub status: ExecutionStatus,
    pub actions_executed: i32,
    pub actions_succeeded: i32,
    pub actions_failed: i32,
    pub execution_log: JsonValue,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A delayed workflow action waiting for its due time.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScheduledAction {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    pub lead_id: Uuid,
    pub action_id: Uuid,
    pub due_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
    pub status: String,
    pub created_by_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[test]
    fn test_activity_type_strings() {
        assert_eq!(ActivityType::ContactAttempted.as_str(), "contact_attempted");
        assert_eq!(ActivityType::EmailOpened.as_str(), "email_opened");
        assert_eq!(ActivityType::FormViewed.as_str(), "form_viewed");
        assert_eq!(ActivityType::Converted.as_str(), "converted");
        assert_eq!(ActivityType::Assigned.as_str(), "assigned");
    }

    #[test]
    fn test_urgency_strings() {
        assert_eq!(Urgency::Low.as_str(), "LOW");
        assert_eq!(Urgency::Normal.as_str(), "NORMAL");
        assert_eq!(Urgency::High.as_str(), "HIGH");
        assert_eq!(Urgency::Urgent.as_str(), "URGENT");
    }

    #[test]
    fn test_lead_display_name() {
        let mut lead = test_lead();
        assert_eq!(lead.display_name(), "Dana Whitfield");

        lead.last_name = None;
        assert_eq!(lead.display_name(), "Dana");

        lead.first_name = None;
        assert_eq!(lead.display_name(), "Unknown");
    }

    pub(crate) fn test_lead() -> Lead {
        Lead {
            id: Uuid::new_v4(),
            first_name: Some("Dana".to_string()),
            last_name: Some("Whitfield".to_string()),
            email: Some("dana@example.com".to_string()),
            phone: Some("555-0142".to_string()),
            status: "new".to_string(),
            source: Some("website".to_string()),
            state: Some("CO".to_string()),
            filing_status: Some("single".to_string()),
            annual_income: Some(82_000),
            lead_score: None,
            lead_score_updated_at: None,
            urgency: None,
            assigned_to: None,
            converted: false,
            email_opens: 0,
            email_clicks: 0,
            last_viewed_at: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}
