use std::sync::Arc;

use serde_json::Value;
use sirocco_definition::WorkflowDefinition;
use sirocco_event_log::ExecutionStatus;

/// In-memory cursor of one running execution: where it is in the
/// definition and the data context that has accumulated so far.
/// Everything else about the execution lives in the event log.
#[derive(Debug, Clone)]
pub struct ExecutionInstance {
  pub execution_id: String,
  pub definition: Arc<WorkflowDefinition>,
  pub current_state: String,
  pub data_context: Value,
}

impl ExecutionInstance {
  pub fn new(execution_id: &str, definition: Arc<WorkflowDefinition>, input: Value) -> Self {
    Self {
      execution_id: execution_id.to_string(),
      current_state: definition.start_at.clone(),
      definition,
      data_context: input,
    }
  }

  /// Position the cursor explicitly, as recovery does after replay.
  pub fn at(
    execution_id: &str,
    definition: Arc<WorkflowDefinition>,
    current_state: &str,
    data_context: Value,
  ) -> Self {
    Self {
      execution_id: execution_id.to_string(),
      definition,
      current_state: current_state.to_string(),
      data_context,
    }
  }
}

/// Final result of a driven execution, as returned to the submitter.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
  pub execution_id: String,
  pub status: ExecutionStatus,
  pub output: Option<Value>,
  pub error: Option<String>,
}
