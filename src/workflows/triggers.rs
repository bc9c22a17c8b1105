// Trigger events - the lifecycle events that start workflow evaluation

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Enumerated lifecycle events a workflow can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    LeadCreated,
    LeadStatusChanged,
    LeadAssigned,
    FormSubmitted,
    EmailOpened,
    EmailClicked,
    StageChanged,
    LeadConverted,
    Manual,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LeadCreated => "lead_created",
            Self::LeadStatusChanged => "lead_status_changed",
            Self::LeadAssigned => "lead_assigned",
            Self::FormSubmitted => "form_submitted",
            Self::EmailOpened => "email_opened",
            Self::EmailClicked => "email_clicked",
            Self::StageChanged => "stage_changed",
            Self::LeadConverted => "lead_converted",
            Self::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "lead_created" => Some(Self::LeadCreated),
            "lead_status_changed" => Some(Self::LeadStatusChanged),
            "lead_assigned" => Some(Self::LeadAssigned),
            "form_submitted" => Some(Self::FormSubmitted),
            "email_opened" => Some(Self::EmailOpened),
            "email_clicked" => Some(Self::EmailClicked),
            "stage_changed" => Some(Self::StageChanged),
            "lead_converted" => Some(Self::LeadConverted),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// One occurrence of a trigger, carrying the lead it concerns and any
/// event-specific payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub trigger_type: TriggerType,
    pub lead_id: Uuid,
    pub actor: Option<Uuid>,
    pub data: Option<JsonValue>,
}

impl TriggerEvent {
    pub fn new(trigger_type: TriggerType, lead_id: Uuid) -> Self {
        Self {
            trigger_type,
            lead_id,
            actor: None,
            data: None,
        }
    }

    pub fn with_actor(mut self, actor: Uuid) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = Some(data);
        self
    }

    pub fn lead_created(lead_id: Uuid) -> Self {
        Self::new(TriggerType::LeadCreated, lead_id)
    }

    pub fn status_changed(lead_id: Uuid, old_status: &str, new_status: &str) -> Self {
        Self::new(TriggerType::LeadStatusChanged, lead_id).with_data(serde_json::json!({
            "old_status": old_status,
            "new_status": new_status,
        }))
    }

    pub fn lead_assigned(lead_id: Uuid, preparer_id: Uuid) -> Self {
        Self::new(TriggerType::LeadAssigned, lead_id)
            .with_data(serde_json::json!({ "preparer_id": preparer_id }))
    }

    pub fn form_submitted(lead_id: Uuid, form: &str) -> Self {
        Self::new(TriggerType::FormSubmitted, lead_id)
            .with_data(serde_json::json!({ "form": form }))
    }

    pub fn email_opened(lead_id: Uuid, subject: &str) -> Self {
        Self::new(TriggerType::EmailOpened, lead_id)
            .with_data(serde_json::json!({ "subject": subject }))
    }

    pub fn email_clicked(lead_id: Uuid, url: Option<&str>) -> Self {
        Self::new(TriggerType::EmailClicked, lead_id).with_data(serde_json::json!({ "url": url }))
    }

    pub fn stage_changed(lead_id: Uuid, stage: &str) -> Self {
        Self::new(TriggerType::StageChanged, lead_id)
            .with_data(serde_json::json!({ "stage": stage }))
    }

    pub fn lead_converted(lead_id: Uuid) -> Self {
        Self::new(TriggerType::LeadConverted, lead_id)
    }

    pub fn manual(lead_id: Uuid, actor: Uuid) -> Self {
        Self::new(TriggerType::Manual, lead_id).with_actor(actor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_type_round_trip() {
        for trigger in [
            TriggerType::LeadCreated,
            TriggerType::LeadStatusChanged,
            TriggerType::LeadAssigned,
            TriggerType::FormSubmitted,
            TriggerType::EmailOpened,
            TriggerType::EmailClicked,
            TriggerType::StageChanged,
            TriggerType::LeadConverted,
            TriggerType::Manual,
        ] {
            assert_eq!(TriggerType::parse(trigger.as_str()), Some(trigger));
        }
        assert_eq!(TriggerType::parse("unknown_event"), None);
    }

    #[test]
    fn test_event_constructors_carry_payload() {
        let lead_id = Uuid::new_v4();
        let event = TriggerEvent::status_changed(lead_id, "new", "contacted");
        assert_eq!(event.trigger_type, TriggerType::LeadStatusChanged);
        assert_eq!(event.lead_id, lead_id);
        let data = event.data.unwrap();
        assert_eq!(data["old_status"], "new");
        assert_eq!(data["new_status"], "contacted");
    }
}
