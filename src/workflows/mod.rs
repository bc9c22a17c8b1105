// Workflow Automation Engine
//
// Trigger -> condition -> ordered-action rule engine for the lead
// lifecycle. Workflows subscribe to lifecycle events, gate on flat
// field-equality conditions, and run typed action chains with a durable
// per-execution audit log.

pub mod actions;
pub mod conditions;
pub mod engine;
pub mod executor;
pub mod triggers;

pub use actions::{ActionLogStatus, ActionOutcome, ActionType, ExecutionLogEntry, NewWorkflowAction};
pub use engine::{ExecutionSummary, NewWorkflow, WorkflowService};
pub use executor::ActionExecutor;
pub use triggers::{TriggerEvent, TriggerType};
