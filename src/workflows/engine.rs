// Workflow engine - rule management and trigger-driven execution
//
// An execution walks a workflow's actions in order. Failures are contained
// per action: one failing handler never aborts its siblings, and one failing
// workflow never aborts the other workflows matched to the same trigger.

use crate::activity::ActivityService;
use crate::error::{CoreError, CoreResult, ValidationBuilder};
use crate::models::{
    ExecutionStatus, Lead, ScheduledAction, WorkflowActionRecord, WorkflowExecution, WorkflowRecord,
};
use crate::services::{EmailSender, IdentityResolver};
use crate::workflows::actions::{
    ActionLogStatus, ActionOutcome, ActionType, ExecutionLogEntry, NewWorkflowAction,
};
use crate::workflows::conditions;
use crate::workflows::executor::ActionExecutor;
use crate::workflows::triggers::{TriggerEvent, TriggerType};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// A workflow as submitted by an operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWorkflow {
    pub name: String,
    pub description: Option<String>,
    pub trigger: TriggerType,
    pub trigger_conditions: Option<JsonValue>,
    pub priority: i32,
    pub created_by: Option<Uuid>,
    pub actions: Vec<NewWorkflowAction>,
}

/// What one run did, reported to the caller and mirrored in the
/// workflow_executions row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    pub lead_id: Uuid,
    pub actions_executed: i32,
    pub actions_succeeded: i32,
    pub actions_failed: i32,
    pub success: bool,
}

pub struct WorkflowService {
    pool: PgPool,
    executor: ActionExecutor,
}

impl WorkflowService {
    pub fn new(
        pool: PgPool,
        email: Arc<dyn EmailSender>,
        identity: Arc<dyn IdentityResolver>,
        activity: ActivityService,
        portal_url: String,
    ) -> Self {
        let executor = ActionExecutor::new(pool.clone(), email, identity, activity, portal_url);
        Self { pool, executor }
    }

    // ===== Rule management =====

    /// Create a workflow and its ordered action chain in one transaction.
    pub async fn create(&self, new: NewWorkflow) -> CoreResult<WorkflowRecord> {
        if let Some(error) = validate_new_workflow(&new) {
            return Err(error);
        }

        let mut tx = self.pool.begin().await?;

        let workflow = sqlx::query_as::<_, WorkflowRecord>(
            r#"
            INSERT INTO workflows
            (id, name, description, trigger, trigger_conditions, priority, is_active, created_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, true, $7, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.trigger.as_str())
        .bind(&new.trigger_conditions)
        .bind(new.priority)
        .bind(new.created_by)
        .fetch_one(&mut *tx)
        .await?;

        for (order, action) in new.actions.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO workflow_actions
                (id, workflow_id, action_type, action_config, action_order, conditions, delay_minutes)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(workflow.id)
            .bind(action.action_type.as_str())
            .bind(&action.action_config)
            .bind(order as i32)
            .bind(&action.conditions)
            .bind(action.delay_minutes)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!("Created workflow '{}' ({})", workflow.name, workflow.id);
        Ok(workflow)
    }

    pub async fn activate(&self, workflow_id: Uuid) -> CoreResult<()> {
        self.set_active(workflow_id, true).await
    }

    pub async fn deactivate(&self, workflow_id: Uuid) -> CoreResult<()> {
        self.set_active(workflow_id, false).await
    }

    async fn set_active(&self, workflow_id: Uuid, active: bool) -> CoreResult<()> {
        let result =
            sqlx::query("UPDATE workflows SET is_active = $2, updated_at = NOW() WHERE id = $1")
                .bind(workflow_id)
                .bind(active)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("Workflow"));
        }
        Ok(())
    }

    pub async fn delete(&self, workflow_id: Uuid) -> CoreResult<()> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = $1")
            .bind(workflow_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("Workflow"));
        }

        info!("Deleted workflow {}", workflow_id);
        Ok(())
    }

    pub async fn list_all(&self, creator: Option<Uuid>) -> CoreResult<Vec<WorkflowRecord>> {
        let workflows = match creator {
            Some(created_by) => {
                sqlx::query_as::<_, WorkflowRecord>(
                    "SELECT * FROM workflows WHERE created_by = $1 ORDER BY priority DESC, created_at",
                )
                .bind(created_by)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, WorkflowRecord>(
                    "SELECT * FROM workflows ORDER BY priority DESC, created_at",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(workflows)
    }

    // ===== Execution =====

    /// Run every active workflow matching the event's trigger, highest
    /// priority first. Returns the number actually executed; zero matches
    /// is not an error, and one failing workflow does not stop the rest.
    pub async fn execute_workflows(&self, event: &TriggerEvent) -> CoreResult<u32> {
        let lead = self.load_lead(event.lead_id).await?;
        let snapshot = conditions::lead_snapshot(&lead)?;

        let workflows = sqlx::query_as::<_, WorkflowRecord>(
            "SELECT * FROM workflows WHERE trigger = $1 AND is_active = true ORDER BY priority DESC",
        )
        .bind(event.trigger_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut executed = 0u32;
        for workflow in workflows {
            if let Some(gate) = &workflow.trigger_conditions {
                match conditions::evaluate(gate, &snapshot) {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(reason) => {
                        warn!(
                            "Workflow {} has malformed trigger conditions: {}",
                            workflow.id, reason
                        );
                        continue;
                    }
                }
            }

            match self
                .execute_workflow(workflow.id, event.lead_id, event.actor)
                .await
            {
                Ok(summary) => {
                    executed += 1;
                    info!(
                        "Workflow '{}' ran for lead {}: {}/{} actions succeeded",
                        workflow.name,
                        event.lead_id,
                        summary.actions_succeeded,
                        summary.actions_executed
                    );
                }
                Err(e) => {
                    error!(
                        "Workflow {} failed for lead {}: {}",
                        workflow.id, event.lead_id, e
                    );
                }
            }
        }

        Ok(executed)
    }

    /// Run one workflow against one lead, recording a WorkflowExecution
    /// audit row. Delayed actions are queued and logged `pending`; gated
    /// actions log `skipped`; dispatched actions log `success`/`failed`.
    pub async fn execute_workflow(
        &self,
        workflow_id: Uuid,
        lead_id: Uuid,
        actor: Option<Uuid>,
    ) -> CoreResult<ExecutionSummary> {
        let workflow: Option<WorkflowRecord> =
            sqlx::query_as("SELECT * FROM workflows WHERE id = $1")
                .bind(workflow_id)
                .fetch_optional(&self.pool)
                .await?;
        let workflow = workflow.ok_or_else(|| CoreError::not_found("Workflow"))?;

        // Lead must exist up front; handlers reload it per action.
        self.load_lead(lead_id).await?;

        let execution_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO workflow_executions (id, workflow_id, lead_id, status, started_at)
            VALUES ($1, $2, $3, $4, NOW())
            "#,
        )
        .bind(execution_id)
        .bind(workflow_id)
        .bind(lead_id)
        .bind(ExecutionStatus::Running)
        .execute(&self.pool)
        .await?;

        let actions = sqlx::query_as::<_, WorkflowActionRecord>(
            "SELECT * FROM workflow_actions WHERE workflow_id = $1 ORDER BY action_order",
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;

        let mut log: Vec<ExecutionLogEntry> = Vec::with_capacity(actions.len());

        for action in &actions {
            let Some(action_type) = ActionType::parse(&action.action_type) else {
                let mut entry =
                    ExecutionLogEntry::new(action.id, &action.action_type, ActionLogStatus::Failed);
                entry.error = Some(format!("unknown action type: {}", action.action_type));
                log.push(entry);
                continue;
            };

            if action.delay_minutes > 0 {
                let due_at = Utc::now() + Duration::minutes(action.delay_minutes as i64);
                self.enqueue_delayed(execution_id, workflow_id, lead_id, action.id, due_at)
                    .await?;
                log.push(ExecutionLogEntry::new(
                    action.id,
                    action.action_type.as_str(),
                    ActionLogStatus::Pending,
                ));
                continue;
            }

            log.push(
                self.run_action(action, action_type, lead_id, actor)
                    .await,
            );
        }

        let (executed, succeeded, failed) = fold_outcomes(&log);

        sqlx::query(
            r#"
            UPDATE workflow_executions
            SET status = $2, actions_executed = $3, actions_succeeded = $4, actions_failed = $5,
                execution_log = $6, completed_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(execution_id)
        .bind(ExecutionStatus::Completed)
        .bind(executed)
        .bind(succeeded)
        .bind(failed)
        .bind(serde_json::to_value(&log)?)
        .execute(&self.pool)
        .await?;

        // Success rolls up only when no action failed.
        let success = failed == 0;
        sqlx::query(
            r#"
            UPDATE workflows
            SET execution_count = execution_count + 1,
                success_count = success_count + CASE WHEN $2 THEN 1 ELSE 0 END,
                failure_count = failure_count + CASE WHEN $2 THEN 0 ELSE 1 END,
                last_executed_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(workflow_id)
        .bind(success)
        .execute(&self.pool)
        .await?;

        Ok(ExecutionSummary {
            execution_id,
            workflow_id: workflow.id,
            lead_id,
            actions_executed: executed,
            actions_succeeded: succeeded,
            actions_failed: failed,
            success,
        })
    }

    /// Evaluate the action's own conditions against the lead's current
    /// state, then dispatch. Never returns Err; every failure becomes a
    /// log entry.
    async fn run_action(
        &self,
        action: &WorkflowActionRecord,
        action_type: ActionType,
        lead_id: Uuid,
        actor: Option<Uuid>,
    ) -> ExecutionLogEntry {
        if let Some(gate) = &action.conditions {
            let snapshot = match self.load_lead(lead_id).await {
                Ok(lead) => conditions::lead_snapshot(&lead).unwrap_or(JsonValue::Null),
                Err(_) => JsonValue::Null,
            };

            match conditions::evaluate(gate, &snapshot) {
                Ok(true) => {}
                Ok(false) => {
                    return ExecutionLogEntry::new(
                        action.id,
                        action_type.as_str(),
                        ActionLogStatus::Skipped,
                    );
                }
                Err(reason) => {
                    let outcome =
                        ActionOutcome::failure(format!("malformed conditions: {}", reason));
                    return ExecutionLogEntry::from_outcome(
                        action.id,
                        action_type.as_str(),
                        &outcome,
                    );
                }
            }
        }

        let outcome = self
            .executor
            .dispatch(action_type, &action.action_config, lead_id, actor)
            .await;
        ExecutionLogEntry::from_outcome(action.id, action_type.as_str(), &outcome)
    }

    async fn enqueue_delayed(
        &self,
        execution_id: Uuid,
        workflow_id: Uuid,
        lead_id: Uuid,
        action_id: Uuid,
        due_at: DateTime<Utc>,
    ) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO scheduled_actions
            (id, execution_id, workflow_id, lead_id, action_id, due_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(execution_id)
        .bind(workflow_id)
        .bind(lead_id)
        .bind(action_id)
        .bind(due_at)
        .execute(&self.pool)
        .await?;

        info!(
            "Queued delayed action {} for lead {} due {}",
            action_id, lead_id, due_at
        );
        Ok(())
    }

    /// Consume due queue entries one at a time and run their actions. Each
    /// entry's claim and log patch share one transaction: a patch failure
    /// rolls the claim back and the entry is retried on a later tick
    /// (at-least-once). Invoked by an external scheduler; overlapping ticks
    /// skip each other's claimed entries.
    pub async fn run_due_actions(&self, now: DateTime<Utc>) -> CoreResult<u32> {
        let mut ran = 0u32;
        loop {
            let mut tx = self.pool.begin().await?;

            let entry: Option<ScheduledAction> = sqlx::query_as(
                r#"
                UPDATE scheduled_actions
                SET consumed_at = NOW()
                WHERE id = (
                    SELECT id FROM scheduled_actions
                    WHERE due_at <= $1 AND consumed_at IS NULL
                    ORDER BY due_at
                    LIMIT 1
                    FOR UPDATE SKIP LOCKED
                )
                RETURNING *
                "#,
            )
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?;
            let Some(entry) = entry else {
                break;
            };

            let action: Option<WorkflowActionRecord> =
                sqlx::query_as("SELECT * FROM workflow_actions WHERE id = $1")
                    .bind(entry.action_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            let Some(action) = action else {
                warn!(
                    "Scheduled action {} no longer exists, dropping queue entry",
                    entry.action_id
                );
                tx.commit().await?;
                continue;
            };
            let Some(action_type) = ActionType::parse(&action.action_type) else {
                warn!("Scheduled action {} has unknown type", entry.action_id);
                tx.commit().await?;
                continue;
            };

            // Side effects run outside the transaction; only the claim and
            // the audit patch are transactional.
            let outcome_entry = self
                .run_action(&action, action_type, entry.lead_id, None)
                .await;

            match self
                .resolve_pending_entry(&mut tx, entry.execution_id, &outcome_entry)
                .await
            {
                Ok(()) => {
                    tx.commit().await?;
                    ran += 1;
                }
                Err(e) => {
                    error!(
                        "Failed to record delayed action outcome for execution {}: {}",
                        entry.execution_id, e
                    );
                    // Rolls back the claim; the entry stays queued.
                    break;
                }
            }
        }

        if ran > 0 {
            info!("Ran {} due scheduled actions", ran);
        }
        Ok(ran)
    }

    /// Patch the owning execution's log: the `pending` entry for this
    /// action becomes the final outcome, and the counters absorb it. The
    /// row lock serializes overlapping patches of the same execution, so
    /// two delayed actions resolving concurrently cannot overwrite each
    /// other's outcome.
    async fn resolve_pending_entry(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        execution_id: Uuid,
        resolved: &ExecutionLogEntry,
    ) -> CoreResult<()> {
        let execution: Option<WorkflowExecution> =
            sqlx::query_as("SELECT * FROM workflow_executions WHERE id = $1 FOR UPDATE")
                .bind(execution_id)
                .fetch_optional(&mut **tx)
                .await?;
        let Some(execution) = execution else {
            warn!(
                "Execution {} no longer exists, dropping delayed outcome",
                execution_id
            );
            return Ok(());
        };

        let mut log: Vec<ExecutionLogEntry> = serde_json::from_value(execution.execution_log)?;
        if !apply_resolution(&mut log, resolved) {
            warn!(
                "No pending log entry for action {} on execution {}",
                resolved.action_id, execution_id
            );
            return Ok(());
        }

        let (executed, succeeded, failed) = fold_outcomes(&log);
        sqlx::query(
            r#"
            UPDATE workflow_executions
            SET actions_executed = $2, actions_succeeded = $3, actions_failed = $4, execution_log = $5
            WHERE id = $1
            "#,
        )
        .bind(execution_id)
        .bind(executed)
        .bind(succeeded)
        .bind(failed)
        .bind(serde_json::to_value(&log)?)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Watchdog: a crash mid-execution leaves the row `running` forever,
    /// so anything running past the timeout is marked failed.
    pub async fn fail_stale_executions(&self, older_than: Duration) -> CoreResult<u64> {
        let cutoff = Utc::now() - older_than;
        let result = sqlx::query(
            r#"
            UPDATE workflow_executions
            SET status = $2, completed_at = NOW()
            WHERE status = $3 AND started_at < $1
            "#,
        )
        .bind(cutoff)
        .bind(ExecutionStatus::Failed)
        .bind(ExecutionStatus::Running)
        .execute(&self.pool)
        .await?;

        let stale = result.rows_affected();
        if stale > 0 {
            warn!("Marked {} stale workflow executions as failed", stale);
        }
        Ok(stale)
    }

    /// Recent execution audit trail, optionally for one workflow.
    pub async fn get_execution_history(
        &self,
        workflow_id: Option<Uuid>,
        limit: i64,
    ) -> CoreResult<Vec<WorkflowExecution>> {
        let executions = match workflow_id {
            Some(id) => {
                sqlx::query_as::<_, WorkflowExecution>(
                    "SELECT * FROM workflow_executions WHERE workflow_id = $1 ORDER BY started_at DESC LIMIT $2",
                )
                .bind(id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, WorkflowExecution>(
                    "SELECT * FROM workflow_executions ORDER BY started_at DESC LIMIT $1",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(executions)
    }

    async fn load_lead(&self, lead_id: Uuid) -> CoreResult<Lead> {
        let lead: Option<Lead> = sqlx::query_as("SELECT * FROM leads WHERE id = $1")
            .bind(lead_id)
            .fetch_optional(&self.pool)
            .await?;
        lead.ok_or_else(|| CoreError::not_found("Lead"))
    }
}

/// Field-level checks before a workflow is written.
pub fn validate_new_workflow(new: &NewWorkflow) -> Option<CoreError> {
    let mut builder = ValidationBuilder::new();

    if new.name.trim().is_empty() {
        builder = builder.error("name", "Workflow name must not be empty");
    }
    if let Some(conditions) = &new.trigger_conditions {
        if !conditions.is_object() {
            builder = builder.error(
                "trigger_conditions",
                "Trigger conditions must be a JSON object",
            );
        }
    }
    for (index, action) in new.actions.iter().enumerate() {
        let field = format!("actions[{}]", index);
        if let Some(conditions) = &action.conditions {
            if !conditions.is_object() {
                builder = builder.error(&field, "Action conditions must be a JSON object");
            }
        }
        if action.delay_minutes < 0 {
            builder = builder.error(&field, "delay_minutes must not be negative");
        }
    }

    builder.build()
}

/// Swap the `pending` log entry for `resolved`'s action with its final
/// outcome. Returns false when no pending slot matches, including when the
/// same resolution is applied twice.
pub(crate) fn apply_resolution(log: &mut [ExecutionLogEntry], resolved: &ExecutionLogEntry) -> bool {
    match log
        .iter_mut()
        .find(|e| e.action_id == resolved.action_id && e.status == ActionLogStatus::Pending)
    {
        Some(slot) => {
            *slot = resolved.clone();
            true
        }
        None => false,
    }
}

/// Counts over an execution log: (executed, succeeded, failed). Skipped
/// and pending entries were not dispatched and count toward none.
pub fn fold_outcomes(log: &[ExecutionLogEntry]) -> (i32, i32, i32) {
    let mut executed = 0;
    let mut succeeded = 0;
    let mut failed = 0;
    for entry in log {
        match entry.status {
            ActionLogStatus::Success => {
                executed += 1;
                succeeded += 1;
            }
            ActionLogStatus::Failed => {
                executed += 1;
                failed += 1;
            }
            ActionLogStatus::Skipped | ActionLogStatus::Pending => {}
        }
    }
    (executed, succeeded, failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(status: ActionLogStatus) -> ExecutionLogEntry {
        ExecutionLogEntry::new(Uuid::new_v4(), "send_email", status)
    }

    #[test]
    fn test_fold_outcomes_middle_action_fails() {
        // Three dispatched actions, the middle one fails.
        let log = vec![
            entry(ActionLogStatus::Success),
            entry(ActionLogStatus::Failed),
            entry(ActionLogStatus::Success),
        ];

        let (executed, succeeded, failed) = fold_outcomes(&log);
        assert_eq!((executed, succeeded, failed), (3, 2, 1));
        assert_eq!(log[0].status, ActionLogStatus::Success);
        assert_eq!(log[2].status, ActionLogStatus::Success);
    }

    #[test]
    fn test_fold_outcomes_ignores_skipped_and_pending() {
        let log = vec![
            entry(ActionLogStatus::Success),
            entry(ActionLogStatus::Skipped),
            entry(ActionLogStatus::Pending),
        ];

        assert_eq!(fold_outcomes(&log), (1, 1, 0));
    }

    #[test]
    fn test_fold_outcomes_empty_log() {
        assert_eq!(fold_outcomes(&[]), (0, 0, 0));
    }

    #[test]
    fn test_validate_new_workflow_collects_field_errors() {
        let new = NewWorkflow {
            name: "   ".to_string(),
            description: None,
            trigger: TriggerType::LeadCreated,
            trigger_conditions: Some(json!("status = new")),
            priority: 0,
            created_by: None,
            actions: vec![NewWorkflowAction::new(ActionType::SendEmail, json!({}))
                .with_delay(-5)],
        };

        let error = validate_new_workflow(&new);
        let Some(CoreError::ValidationDetails { details }) = error else {
            panic!("expected field-level validation errors");
        };
        assert!(details.contains_key("name"));
        assert!(details.contains_key("trigger_conditions"));
        assert!(details.contains_key("actions[0]"));
    }

    #[test]
    fn test_validate_new_workflow_accepts_well_formed() {
        let new = NewWorkflow {
            name: "Welcome new leads".to_string(),
            description: None,
            trigger: TriggerType::LeadCreated,
            trigger_conditions: Some(json!({ "status": "new" })),
            priority: 0,
            created_by: None,
            actions: vec![NewWorkflowAction::new(
                ActionType::SendEmail,
                json!({ "subject": "Hi", "body": "<p>Hi</p>" }),
            )],
        };

        assert!(validate_new_workflow(&new).is_none());
    }

    #[test]
    fn test_apply_resolution_keeps_sibling_outcomes() {
        // Two delayed actions on one execution resolve separately; both
        // final outcomes must survive in the log.
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let mut log = vec![
            ExecutionLogEntry::new(first, "send_email", ActionLogStatus::Pending),
            ExecutionLogEntry::new(second, "create_task", ActionLogStatus::Pending),
        ];

        assert!(apply_resolution(
            &mut log,
            &ExecutionLogEntry::new(first, "send_email", ActionLogStatus::Success),
        ));
        assert!(apply_resolution(
            &mut log,
            &ExecutionLogEntry::new(second, "create_task", ActionLogStatus::Failed),
        ));

        assert_eq!(log[0].status, ActionLogStatus::Success);
        assert_eq!(log[1].status, ActionLogStatus::Failed);
        assert_eq!(fold_outcomes(&log), (2, 1, 1));
    }

    #[test]
    fn test_apply_resolution_only_patches_pending_slots() {
        let action_id = Uuid::new_v4();
        let mut log = vec![ExecutionLogEntry::new(
            action_id,
            "update_status",
            ActionLogStatus::Pending,
        )];

        let resolved = ExecutionLogEntry::new(action_id, "update_status", ActionLogStatus::Success);
        assert!(apply_resolution(&mut log, &resolved));
        // Applying the same resolution again finds no pending slot.
        assert!(!apply_resolution(&mut log, &resolved));

        // Unknown action ids patch nothing.
        let stranger = ExecutionLogEntry::new(Uuid::new_v4(), "send_email", ActionLogStatus::Failed);
        assert!(!apply_resolution(&mut log, &stranger));
        assert_eq!(log[0].status, ActionLogStatus::Success);
    }

    #[test]
    fn test_new_workflow_shape() {
        let new = NewWorkflow {
            name: "Welcome new leads".to_string(),
            description: None,
            trigger: TriggerType::LeadCreated,
            trigger_conditions: Some(json!({ "status": "new" })),
            priority: 10,
            created_by: None,
            actions: vec![NewWorkflowAction::new(
                ActionType::SendEmail,
                json!({ "subject": "Welcome, {{first_name}}", "body": "<p>Hi</p>" }),
            )
            .with_delay(30)],
        };

        assert_eq!(new.actions.len(), 1);
        assert_eq!(new.actions[0].delay_minutes, 30);
    }
}
