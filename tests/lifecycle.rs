// End-to-end lifecycle tests against a live Postgres.
//
// These need a database: set TEST_DATABASE_URL and run
// `cargo test -- --ignored`. Migrations are applied on connect.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use meridian_core::activity::ActivityService;
use meridian_core::error::CoreError;
use meridian_core::journey::{JourneyService, JourneyStage};
use meridian_core::models::{MarketingLink, WorkflowExecution};
use meridian_core::services::{EmailSender, IdentityResolver, OutboundEmail, Profile, SendOutcome};
use meridian_core::workflows::{
    ActionLogStatus, ActionType, ExecutionLogEntry, NewWorkflow, NewWorkflowAction, TriggerType,
    WorkflowService,
};
use serde_json::json;
use serial_test::serial;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

struct NullEmailSender;

#[async_trait]
impl EmailSender for NullEmailSender {
    async fn send(&self, _email: &OutboundEmail) -> SendOutcome {
        SendOutcome::delivered("<test@meridiantax.com>".to_string())
    }
}

struct NoIdentity;

#[async_trait]
impl IdentityResolver for NoIdentity {
    async fn profile(&self, _user_id: Uuid) -> Option<Profile> {
        None
    }
}

async fn test_pool() -> PgPool {
    let database_url =
        std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set for these tests");
    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to test database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

fn workflow_service(pool: &PgPool) -> WorkflowService {
    let identity: Arc<dyn IdentityResolver> = Arc::new(NoIdentity);
    let activity = ActivityService::new(pool.clone(), identity.clone());
    WorkflowService::new(
        pool.clone(),
        Arc::new(NullEmailSender),
        identity,
        activity,
        "https://app.meridiantax.com".to_string(),
    )
}

async fn insert_link(pool: &PgPool) -> Uuid {
    let link_id = Uuid::new_v4();
    sqlx::query("INSERT INTO marketing_links (id, name, destination_url) VALUES ($1, $2, $3)")
        .bind(link_id)
        .bind(format!("Spring campaign {}", link_id))
        .bind("https://meridiantax.com/intake")
        .execute(pool)
        .await
        .unwrap();
    link_id
}

async fn insert_lead(pool: &PgPool) -> Uuid {
    let lead_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO leads (id, first_name, last_name, email, status, source) VALUES ($1, 'Dana', 'Whitfield', $2, 'new', 'website')",
    )
    .bind(lead_id)
    .bind(format!("{}@example.com", lead_id))
    .execute(pool)
    .await
    .unwrap();
    lead_id
}

async fn fetch_link(pool: &PgPool, link_id: Uuid) -> MarketingLink {
    sqlx::query_as("SELECT * FROM marketing_links WHERE id = $1")
        .bind(link_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn fetch_execution(pool: &PgPool, execution_id: Uuid) -> (WorkflowExecution, Vec<ExecutionLogEntry>) {
    let execution: WorkflowExecution =
        sqlx::query_as("SELECT * FROM workflow_executions WHERE id = $1")
            .bind(execution_id)
            .fetch_one(pool)
            .await
            .unwrap();
    let log = serde_json::from_value(execution.execution_log.clone()).unwrap();
    (execution, log)
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_journey_counter_conservation_end_to_end() {
    let pool = test_pool().await;
    let journey = JourneyService::new(pool.clone());

    let link_id = insert_link(&pool).await;
    let click = journey
        .create_click(link_id, None, None, None, None)
        .await
        .unwrap();

    let link = fetch_link(&pool, link_id).await;
    assert_eq!(link.clicks, 1);
    assert_eq!(link.intake_starts, 0);

    let result = journey
        .track(&click.tracking_code, JourneyStage::IntakeStarted, None, None)
        .await
        .unwrap();
    assert!(result.click.intake_started_at.is_some());

    let link = fetch_link(&pool, link_id).await;
    assert_eq!(link.intake_starts, 1);
    assert!((link.intake_conversion_rate - 100.0).abs() < f64::EPSILON);

    // Repeating the transition is a stage violation and moves nothing.
    let repeat = journey
        .track(&click.tracking_code, JourneyStage::IntakeStarted, None, None)
        .await;
    assert!(matches!(repeat, Err(CoreError::StageViolation { .. })));

    let link = fetch_link(&pool, link_id).await;
    assert_eq!(link.intake_starts, 1);
    assert!((link.intake_conversion_rate - 100.0).abs() < f64::EPSILON);
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_execute_workflow_logs_skipped_and_pending() {
    let pool = test_pool().await;
    let service = workflow_service(&pool);
    let lead_id = insert_lead(&pool).await;

    let workflow = service
        .create(NewWorkflow {
            name: "Contact fresh leads".to_string(),
            description: None,
            trigger: TriggerType::LeadCreated,
            trigger_conditions: None,
            priority: 0,
            created_by: None,
            actions: vec![
                NewWorkflowAction::new(ActionType::UpdateStatus, json!({ "status": "contacted" })),
                // Gated on the status the first action just replaced.
                NewWorkflowAction::new(
                    ActionType::SendNotification,
                    json!({ "title": "New lead", "message": "Follow up" }),
                )
                .with_conditions(json!({ "status": "new" })),
                NewWorkflowAction::new(
                    ActionType::UpdateField,
                    json!({ "field": "source", "value": "nurtured" }),
                )
                .with_delay(1),
            ],
        })
        .await
        .unwrap();

    let summary = service
        .execute_workflow(workflow.id, lead_id, None)
        .await
        .unwrap();
    assert_eq!(summary.actions_executed, 1);
    assert_eq!(summary.actions_succeeded, 1);
    assert_eq!(summary.actions_failed, 0);
    assert!(summary.success);

    let (_, log) = fetch_execution(&pool, summary.execution_id).await;
    assert_eq!(log.len(), 3);
    assert_eq!(log[0].status, ActionLogStatus::Success);
    assert_eq!(log[1].status, ActionLogStatus::Skipped);
    assert_eq!(log[2].status, ActionLogStatus::Pending);

    // Not due yet.
    assert_eq!(service.run_due_actions(Utc::now()).await.unwrap(), 0);

    let ran = service
        .run_due_actions(Utc::now() + Duration::minutes(5))
        .await
        .unwrap();
    assert_eq!(ran, 1);

    let (execution, log) = fetch_execution(&pool, summary.execution_id).await;
    assert_eq!(log[2].status, ActionLogStatus::Success);
    assert_eq!(execution.actions_executed, 2);
    assert_eq!(execution.actions_succeeded, 2);

    let (source,): (String,) = sqlx::query_as("SELECT source FROM leads WHERE id = $1")
        .bind(lead_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(source, "nurtured");
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_execution_audit_survives_workflow_delete() {
    let pool = test_pool().await;
    let service = workflow_service(&pool);
    let lead_id = insert_lead(&pool).await;

    let workflow = service
        .create(NewWorkflow {
            name: "One-shot status bump".to_string(),
            description: None,
            trigger: TriggerType::Manual,
            trigger_conditions: None,
            priority: 0,
            created_by: None,
            actions: vec![NewWorkflowAction::new(
                ActionType::UpdateStatus,
                json!({ "status": "contacted" }),
            )],
        })
        .await
        .unwrap();

    let summary = service
        .execute_workflow(workflow.id, lead_id, None)
        .await
        .unwrap();
    service.delete(workflow.id).await.unwrap();

    let (execution, log) = fetch_execution(&pool, summary.execution_id).await;
    assert_eq!(execution.workflow_id, workflow.id);
    assert_eq!(log[0].status, ActionLogStatus::Success);
    assert!(service
        .get_execution_history(Some(workflow.id), 10)
        .await
        .unwrap()
        .iter()
        .any(|e| e.id == summary.execution_id));
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_delayed_siblings_both_recorded() {
    let pool = test_pool().await;
    let service = workflow_service(&pool);
    let lead_id = insert_lead(&pool).await;

    let workflow = service
        .create(NewWorkflow {
            name: "Drip updates".to_string(),
            description: None,
            trigger: TriggerType::Manual,
            trigger_conditions: None,
            priority: 0,
            created_by: None,
            actions: vec![
                NewWorkflowAction::new(
                    ActionType::UpdateField,
                    json!({ "field": "source", "value": "drip_one" }),
                )
                .with_delay(1),
                NewWorkflowAction::new(
                    ActionType::UpdateField,
                    json!({ "field": "state", "value": "CO" }),
                )
                .with_delay(1),
            ],
        })
        .await
        .unwrap();

    let summary = service
        .execute_workflow(workflow.id, lead_id, None)
        .await
        .unwrap();
    let (_, log) = fetch_execution(&pool, summary.execution_id).await;
    assert_eq!(log[0].status, ActionLogStatus::Pending);
    assert_eq!(log[1].status, ActionLogStatus::Pending);

    let ran = service
        .run_due_actions(Utc::now() + Duration::minutes(5))
        .await
        .unwrap();
    assert_eq!(ran, 2);

    // Both outcomes must survive in the audit log, neither reverts to
    // pending once its sibling resolves.
    let (execution, log) = fetch_execution(&pool, summary.execution_id).await;
    assert_eq!(log[0].status, ActionLogStatus::Success);
    assert_eq!(log[1].status, ActionLogStatus::Success);
    assert_eq!(execution.actions_executed, 2);
    assert_eq!(execution.actions_succeeded, 2);
    assert_eq!(execution.actions_failed, 0);
}
