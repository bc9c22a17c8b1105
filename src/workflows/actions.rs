// Action types, per-action outcomes, and the execution log entry format

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// The six operations a workflow action can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    SendEmail,
    CreateTask,
    AssignPreparer,
    UpdateStatus,
    SendNotification,
    UpdateField,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendEmail => "send_email",
            Self::CreateTask => "create_task",
            Self::AssignPreparer => "assign_preparer",
            Self::UpdateStatus => "update_status",
            Self::SendNotification => "send_notification",
            Self::UpdateField => "update_field",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "send_email" => Some(Self::SendEmail),
            "create_task" => Some(Self::CreateTask),
            "assign_preparer" => Some(Self::AssignPreparer),
            "update_status" => Some(Self::UpdateStatus),
            "send_notification" => Some(Self::SendNotification),
            "update_field" => Some(Self::UpdateField),
            _ => None,
        }
    }
}

/// An action as submitted when creating a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWorkflowAction {
    pub action_type: ActionType,
    pub action_config: JsonValue,
    pub conditions: Option<JsonValue>,
    pub delay_minutes: i32,
}

impl NewWorkflowAction {
    pub fn new(action_type: ActionType, action_config: JsonValue) -> Self {
        Self {
            action_type,
            action_config,
            conditions: None,
            delay_minutes: 0,
        }
    }

    pub fn with_conditions(mut self, conditions: JsonValue) -> Self {
        self.conditions = Some(conditions);
        self
    }

    pub fn with_delay(mut self, delay_minutes: i32) -> Self {
        self.delay_minutes = delay_minutes;
        self
    }
}

/// Outcome of dispatching one action. Handlers catch their own errors and
/// report through this, never by propagating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    pub output: Option<JsonValue>,
    pub error: Option<String>,
}

impl ActionOutcome {
    pub fn success(output: JsonValue) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }
}

/// Per-action status recorded in the execution log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionLogStatus {
    Success,
    Failed,
    Skipped,
    Pending,
}

impl ActionLogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Pending => "pending",
        }
    }
}

/// One entry in a WorkflowExecution's ordered log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub action_id: Uuid,
    pub action_type: String,
    pub status: ActionLogStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

impl ExecutionLogEntry {
    pub fn new(action_id: Uuid, action_type: &str, status: ActionLogStatus) -> Self {
        Self {
            action_id,
            action_type: action_type.to_string(),
            status,
            output: None,
            error: None,
            at: Utc::now(),
        }
    }

    pub fn from_outcome(action_id: Uuid, action_type: &str, outcome: &ActionOutcome) -> Self {
        let status = if outcome.success {
            ActionLogStatus::Success
        } else {
            ActionLogStatus::Failed
        };
        Self {
            action_id,
            action_type: action_type.to_string(),
            status,
            output: outcome.output.clone(),
            error: outcome.error.clone(),
            at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_type_round_trip() {
        for action in [
            ActionType::SendEmail,
            ActionType::CreateTask,
            ActionType::AssignPreparer,
            ActionType::UpdateStatus,
            ActionType::SendNotification,
            ActionType::UpdateField,
        ] {
            assert_eq!(ActionType::parse(action.as_str()), Some(action));
        }
        assert_eq!(ActionType::parse("delete_lead"), None);
    }

    #[test]
    fn test_outcome_constructors() {
        let ok = ActionOutcome::success(json!({ "task_id": "t-1" }));
        assert!(ok.success);
        assert!(ok.error.is_none());

        let failed = ActionOutcome::failure("lead has no email address");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("lead has no email address"));
    }

    #[test]
    fn test_log_entry_from_outcome() {
        let action_id = Uuid::new_v4();
        let entry = ExecutionLogEntry::from_outcome(
            action_id,
            "send_email",
            &ActionOutcome::failure("smtp timeout"),
        );
        assert_eq!(entry.status, ActionLogStatus::Failed);
        assert_eq!(entry.error.as_deref(), Some("smtp timeout"));

        let serialized = serde_json::to_value(&entry).unwrap();
        assert_eq!(serialized["status"], "failed");
        // Empty output is omitted from the stored log.
        assert!(serialized.get("output").is_none());
    }

    #[test]
    fn test_new_action_builder() {
        let action = NewWorkflowAction::new(
            ActionType::SendEmail,
            json!({ "subject": "Welcome, {{first_name}}" }),
        )
        .with_delay(60)
        .with_conditions(json!({ "status": "new" }));

        assert_eq!(action.delay_minutes, 60);
        assert!(action.conditions.is_some());
    }
}
