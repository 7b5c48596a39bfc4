use serde::{Deserialize, Serialize};

/// Correlates an in-flight task attempt with its completion event.
///
/// The token crosses the process boundary with the dispatch request
/// and comes back with the completion; it is the only piece of state
/// a completion needs to find its waiting execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContinuationToken {
  pub execution_id: String,
  pub state_name: String,
  pub attempt: u32,
}

impl ContinuationToken {
  pub fn new(execution_id: &str, state_name: &str, attempt: u32) -> Self {
    Self {
      execution_id: execution_id.to_string(),
      state_name: state_name.to_string(),
      attempt,
    }
  }
}

impl std::fmt::Display for ContinuationToken {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "{}/{}#{}",
      self.execution_id, self.state_name, self.attempt
    )
  }
}

/// Outbound task invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRequest {
  pub token: ContinuationToken,
  /// Executor identifier, opaque to the engine.
  pub resource: String,
  /// Resolved parameter payload.
  pub parameters: serde_json::Value,
}

/// Result reported by an external executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TriggerOutcome {
  Success { output: serde_json::Value },
  Failure { error: String },
}

/// Inbound completion notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerCompletion {
  pub token: ContinuationToken,
  pub outcome: TriggerOutcome,
}
