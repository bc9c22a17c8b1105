// Action executor - dispatches workflow actions to their handlers
//
// Every handler catches its own errors and reports through ActionOutcome;
// dispatch never propagates a failure to the engine loop. Handlers reload
// the lead on entry because concurrent executions may mutate it.

use crate::activity::{log_best_effort, ActivityService};
use crate::models::{Lead, Task};
use crate::services::email::{lead_welcome_template, preparer_assignment_template};
use crate::services::{EmailSender, IdentityResolver, OutboundEmail};
use crate::workflows::actions::{ActionOutcome, ActionType};
use chrono::{Duration, Utc};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct ActionExecutor {
    pool: PgPool,
    email: Arc<dyn EmailSender>,
    identity: Arc<dyn IdentityResolver>,
    activity: ActivityService,
    portal_url: String,
}

impl ActionExecutor {
    pub fn new(
        pool: PgPool,
        email: Arc<dyn EmailSender>,
        identity: Arc<dyn IdentityResolver>,
        activity: ActivityService,
        portal_url: String,
    ) -> Self {
        Self {
            pool,
            email,
            identity,
            activity,
            portal_url,
        }
    }

    /// Dispatch one action against the lead's current state.
    pub async fn dispatch(
        &self,
        action_type: ActionType,
        config: &JsonValue,
        lead_id: Uuid,
        actor: Option<Uuid>,
    ) -> ActionOutcome {
        let lead = match self.load_lead(lead_id).await {
            Ok(lead) => lead,
            Err(e) => return ActionOutcome::failure(e),
        };

        info!(
            "Dispatching {} for lead {}",
            action_type.as_str(),
            lead_id
        );

        match action_type {
            ActionType::SendEmail => self.send_email(config, &lead).await,
            ActionType::CreateTask => self.create_task(config, &lead, actor).await,
            ActionType::AssignPreparer => self.assign_preparer(config, &lead, actor).await,
            ActionType::UpdateStatus => self.update_status(config, &lead, actor).await,
            ActionType::SendNotification => self.send_notification(config, &lead).await,
            ActionType::UpdateField => self.update_field(config, &lead).await,
        }
    }

    async fn load_lead(&self, lead_id: Uuid) -> Result<Lead, String> {
        let lead: Option<Lead> = sqlx::query_as("SELECT * FROM leads WHERE id = $1")
            .bind(lead_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| format!("failed to load lead: {}", e))?;

        lead.ok_or_else(|| format!("lead {} not found", lead_id))
    }

    async fn send_email(&self, config: &JsonValue, lead: &Lead) -> ActionOutcome {
        let outcome = send_lead_email(self.email.as_ref(), config, lead, &self.portal_url).await;

        if outcome.success {
            let subject = outcome
                .output
                .as_ref()
                .and_then(|o| o["subject"].as_str())
                .unwrap_or("(no subject)")
                .to_string();
            log_best_effort(self.activity.log_email_sent(lead.id, &subject, true, None)).await;
        }
        outcome
    }

    async fn create_task(
        &self,
        config: &JsonValue,
        lead: &Lead,
        actor: Option<Uuid>,
    ) -> ActionOutcome {
        let snapshot = match serde_json::to_value(lead) {
            Ok(v) => v,
            Err(e) => return ActionOutcome::failure(format!("snapshot failed: {}", e)),
        };

        let title = match config["title"].as_str() {
            Some(t) => render_template(t, &snapshot),
            None => return ActionOutcome::failure("create_task config requires a title"),
        };
        let description = config["description"]
            .as_str()
            .map(|d| render_template(d, &snapshot));

        // Assignment defaults to whoever owns the lead.
        let assigned_to = config["assigned_to"]
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .or(lead.assigned_to);

        let due_date = config["due_in_days"]
            .as_i64()
            .map(|days| Utc::now() + Duration::days(days));

        let created_by_name = match actor {
            Some(user_id) => match self.identity.profile(user_id).await {
                Some(profile) => profile.display_name(),
                None => "Workflow Automation".to_string(),
            },
            None => "Workflow Automation".to_string(),
        };

        let task = sqlx::query_as::<_, Task>(
            r#"
            INSERT INTO tasks (id, lead_id, title, description, assigned_to, due_date, status, created_by_name, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, 'open', $7, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(lead.id)
        .bind(&title)
        .bind(&description)
        .bind(assigned_to)
        .bind(due_date)
        .bind(&created_by_name)
        .fetch_one(&self.pool)
        .await;

        let task = match task {
            Ok(task) => task,
            Err(e) => return ActionOutcome::failure(format!("task insert failed: {}", e)),
        };

        log_best_effort(
            self.activity
                .log_task_created(lead.id, &task.title, actor, true),
        )
        .await;

        ActionOutcome::success(serde_json::json!({
            "task_id": task.id,
            "title": task.title,
            "assigned_to": task.assigned_to,
            "due_date": task.due_date,
        }))
    }

    async fn assign_preparer(
        &self,
        config: &JsonValue,
        lead: &Lead,
        actor: Option<Uuid>,
    ) -> ActionOutcome {
        let preparer_id = match config["preparer_id"]
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
        {
            Some(id) => id,
            None => return ActionOutcome::failure("assign_preparer config requires preparer_id"),
        };

        let profile = match self.identity.profile(preparer_id).await {
            Some(profile) => profile,
            None => {
                return ActionOutcome::failure(format!("preparer {} not found", preparer_id));
            }
        };

        let update = sqlx::query(
            "UPDATE leads SET assigned_to = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(lead.id)
        .bind(preparer_id)
        .execute(&self.pool)
        .await;

        if let Err(e) = update {
            return ActionOutcome::failure(format!("assignment update failed: {}", e));
        }

        let preparer_name = profile.display_name();
        log_best_effort(
            self.activity
                .log_assigned(lead.id, &preparer_name, actor, true),
        )
        .await;

        // Courtesy notification to the lead; the assignment itself already
        // succeeded, so a delivery failure only warns.
        if let Some(to) = lead.email.clone() {
            let first_name = lead.first_name.as_deref().unwrap_or("there");
            let template =
                preparer_assignment_template(first_name, &preparer_name, &self.portal_url);
            let sent = self
                .email
                .send(&OutboundEmail {
                    to,
                    subject: template.subject,
                    html_body: template.html_body,
                    text_body: template.text_body,
                })
                .await;
            if !sent.success {
                warn!(
                    "Assignment email for lead {} failed: {}",
                    lead.id,
                    sent.error.unwrap_or_default()
                );
            }
        }

        ActionOutcome::success(serde_json::json!({
            "preparer_id": preparer_id,
            "preparer_name": preparer_name,
        }))
    }

    async fn update_status(
        &self,
        config: &JsonValue,
        lead: &Lead,
        actor: Option<Uuid>,
    ) -> ActionOutcome {
        let new_status = match config["status"].as_str() {
            Some(s) => s,
            None => return ActionOutcome::failure("update_status config requires a status"),
        };

        let update = sqlx::query("UPDATE leads SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(lead.id)
            .bind(new_status)
            .execute(&self.pool)
            .await;

        if let Err(e) = update {
            return ActionOutcome::failure(format!("status update failed: {}", e));
        }

        log_best_effort(
            self.activity
                .log_status_changed(lead.id, &lead.status, new_status, actor, true),
        )
        .await;

        ActionOutcome::success(serde_json::json!({
            "old_status": lead.status,
            "new_status": new_status,
        }))
    }

    /// Fire-and-forget side channel: delivery is not guaranteed and a
    /// write failure is not an action failure.
    async fn send_notification(&self, config: &JsonValue, lead: &Lead) -> ActionOutcome {
        let recipient = config["user_id"]
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .or(lead.assigned_to);

        let Some(user_id) = recipient else {
            warn!("Notification for lead {} has no recipient, dropped", lead.id);
            return ActionOutcome::success(serde_json::json!({ "delivered": false }));
        };

        let snapshot = serde_json::to_value(lead).unwrap_or(JsonValue::Null);
        let title = config["title"].as_str().unwrap_or("Lead update");
        let message = config["message"]
            .as_str()
            .map(|m| render_template(m, &snapshot))
            .unwrap_or_else(|| format!("Update on lead {}", lead.display_name()));

        let insert = sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, title, message, notification_type, created_at)
            VALUES ($1, $2, $3, $4, 'workflow', NOW())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(title)
        .bind(&message)
        .execute(&self.pool)
        .await;

        if let Err(e) = insert {
            warn!("Notification write failed for lead {}: {}", lead.id, e);
        }

        ActionOutcome::success(serde_json::json!({ "user_id": user_id }))
    }

    async fn update_field(&self, config: &JsonValue, lead: &Lead) -> ActionOutcome {
        let field = match config["field"].as_str() {
            Some(f) => f,
            None => return ActionOutcome::failure("update_field config requires a field"),
        };
        if !is_identifier(field) {
            return ActionOutcome::failure(format!("invalid field name: {}", field));
        }
        let value = &config["value"];

        // Column name cannot be bound as a parameter; the workflow author
        // is trusted but the name is still restricted to identifier chars.
        let sql = format!(
            "UPDATE leads SET {} = $2, updated_at = NOW() WHERE id = $1",
            field
        );

        let query = sqlx::query(&sql).bind(lead.id);
        let result = match value {
            JsonValue::String(s) => query.bind(s.clone()).execute(&self.pool).await,
            JsonValue::Number(n) if n.is_i64() => {
                query.bind(n.as_i64()).execute(&self.pool).await
            }
            JsonValue::Number(n) => query.bind(n.as_f64()).execute(&self.pool).await,
            JsonValue::Bool(b) => query.bind(*b).execute(&self.pool).await,
            JsonValue::Null => query.bind(Option::<String>::None).execute(&self.pool).await,
            other => query.bind(other.clone()).execute(&self.pool).await,
        };

        match result {
            Ok(_) => ActionOutcome::success(serde_json::json!({
                "field": field,
                "value": value,
            })),
            Err(e) => ActionOutcome::failure(format!("field update failed: {}", e)),
        }
    }
}

/// Send a templated email to the lead. Separated from the executor so the
/// transport can be mocked without a database.
///
/// Config is either a named house template (`{"template": "welcome"}`) or
/// an inline `subject`/`body` pair with `{{field}}` placeholders.
pub async fn send_lead_email(
    sender: &dyn EmailSender,
    config: &JsonValue,
    lead: &Lead,
    portal_url: &str,
) -> ActionOutcome {
    let Some(to) = lead.email.clone() else {
        return ActionOutcome::failure("lead has no email address");
    };

    let (subject, html_body, text_body) = match config["template"].as_str() {
        Some("welcome") => {
            let first_name = lead.first_name.as_deref().unwrap_or("there");
            let template = lead_welcome_template(first_name, portal_url);
            (template.subject, template.html_body, template.text_body)
        }
        Some(other) => {
            return ActionOutcome::failure(format!("unknown email template: {}", other));
        }
        None => {
            let snapshot = match serde_json::to_value(lead) {
                Ok(v) => v,
                Err(e) => return ActionOutcome::failure(format!("snapshot failed: {}", e)),
            };

            let subject = config["subject"]
                .as_str()
                .map(|s| render_template(s, &snapshot))
                .unwrap_or_else(|| "Update from Meridian Tax".to_string());
            let html_body = match config["body"].as_str() {
                Some(body) => render_template(body, &snapshot),
                None => return ActionOutcome::failure("send_email config requires a body"),
            };
            let text_body = config["text_body"]
                .as_str()
                .map(|t| render_template(t, &snapshot));
            (subject, html_body, text_body)
        }
    };

    let outcome = sender
        .send(&OutboundEmail {
            to,
            subject: subject.clone(),
            html_body,
            text_body,
        })
        .await;

    if outcome.success {
        ActionOutcome::success(serde_json::json!({
            "subject": subject,
            "message_id": outcome.message_id,
        }))
    } else {
        ActionOutcome::failure(
            outcome
                .error
                .unwrap_or_else(|| "email delivery failed".to_string()),
        )
    }
}

/// Replace `{{field}}` placeholders with values from the snapshot.
/// Unresolvable placeholders are left as-is. Dotted paths descend into
/// nested objects.
pub fn render_template(template: &str, snapshot: &JsonValue) -> String {
    let re = match regex::Regex::new(r"\{\{\s*([\w.]+)\s*\}\}") {
        Ok(re) => re,
        Err(_) => return template.to_string(),
    };

    let mut result = template.to_string();
    for cap in re.captures_iter(template) {
        let Some(value) = get_nested_value(snapshot, &cap[1]) else {
            continue;
        };
        let replacement = match value {
            JsonValue::String(s) => s,
            JsonValue::Number(n) => n.to_string(),
            JsonValue::Bool(b) => b.to_string(),
            JsonValue::Null => String::new(),
            other => other.to_string(),
        };
        result = result.replace(&cap[0], &replacement);
    }

    result
}

fn get_nested_value(json: &JsonValue, path: &str) -> Option<JsonValue> {
    let mut current = json;
    for part in path.split('.') {
        current = current.get(part)?;
    }
    Some(current.clone())
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
