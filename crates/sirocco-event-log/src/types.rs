use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EventLogError;

/// Lifecycle status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
  Running,
  Succeeded,
  Failed,
  Aborted,
}

impl ExecutionStatus {
  pub fn is_terminal(&self) -> bool {
    !matches!(self, ExecutionStatus::Running)
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      ExecutionStatus::Running => "running",
      ExecutionStatus::Succeeded => "succeeded",
      ExecutionStatus::Failed => "failed",
      ExecutionStatus::Aborted => "aborted",
    }
  }
}

impl std::str::FromStr for ExecutionStatus {
  type Err = EventLogError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "running" => Ok(ExecutionStatus::Running),
      "succeeded" => Ok(ExecutionStatus::Succeeded),
      "failed" => Ok(ExecutionStatus::Failed),
      "aborted" => Ok(ExecutionStatus::Aborted),
      other => Err(EventLogError::InvalidStatus(other.to_string())),
    }
  }
}

impl std::fmt::Display for ExecutionStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Persisted execution bookkeeping row.
///
/// Root executions carry their serialized definition and initial input
/// so an interrupted run can be resumed after a restart; branch and
/// iteration children carry a `parent_id` instead and are re-run by
/// their parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
  pub execution_id: String,
  pub parent_id: Option<String>,
  pub status: ExecutionStatus,
  pub started_at: DateTime<Utc>,
  pub ended_at: Option<DateTime<Utc>>,
  /// Serialized `WorkflowDefinition` JSON, present for root executions.
  pub definition: Option<String>,
  /// Serialized initial data context, present for root executions.
  pub input: Option<String>,
}

impl ExecutionRecord {
  /// A root execution record, as created at submission.
  pub fn root(execution_id: &str, definition: String, input: String) -> Self {
    Self {
      execution_id: execution_id.to_string(),
      parent_id: None,
      status: ExecutionStatus::Running,
      started_at: Utc::now(),
      ended_at: None,
      definition: Some(definition),
      input: Some(input),
    }
  }

  /// A branch/iteration child record, owned by its parent execution.
  pub fn child(execution_id: &str, parent_id: &str) -> Self {
    Self {
      execution_id: execution_id.to_string(),
      parent_id: Some(parent_id.to_string()),
      status: ExecutionStatus::Running,
      started_at: Utc::now(),
      ended_at: None,
      definition: None,
      input: None,
    }
  }
}

/// An event as recorded in the log: immutable, ordered by `sequence`
/// within its execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEvent {
  pub execution_id: String,
  pub sequence: i64,
  pub timestamp: DateTime<Utc>,
  pub state_name: String,
  pub payload: EventPayload,
}

/// What happened, with the data needed to replay it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
  /// The interpreter entered a state; `input` is the full context at
  /// entry.
  StateEntered { input: serde_json::Value },

  /// A task invocation left for its external executor.
  TaskDispatched {
    resource: String,
    parameters: serde_json::Value,
    attempt: u32,
  },

  /// The executor reported success for an attempt.
  TaskCompleted {
    output: serde_json::Value,
    attempt: u32,
  },

  /// The executor reported failure for an attempt.
  TaskFailed { error: String, attempt: u32 },

  /// The state finished; `output` is the context after result merging
  /// and `next` the transition decided before it is acted upon
  /// (`None` when the state ends its scope).
  StateExited {
    output: serde_json::Value,
    next: Option<String>,
  },

  ExecutionSucceeded { output: serde_json::Value },

  ExecutionFailed { error: String },
}

/// An event about to be appended; the store assigns `sequence` and
/// `timestamp`.
#[derive(Debug, Clone)]
pub struct NewEvent {
  pub execution_id: String,
  pub state_name: String,
  pub payload: EventPayload,
}

impl NewEvent {
  pub fn new(execution_id: &str, state_name: &str, payload: EventPayload) -> Self {
    Self {
      execution_id: execution_id.to_string(),
      state_name: state_name.to_string(),
      payload,
    }
  }

  pub fn state_entered(execution_id: &str, state_name: &str, input: serde_json::Value) -> Self {
    Self::new(execution_id, state_name, EventPayload::StateEntered { input })
  }

  pub fn task_dispatched(
    execution_id: &str,
    state_name: &str,
    resource: &str,
    parameters: serde_json::Value,
    attempt: u32,
  ) -> Self {
    Self::new(
      execution_id,
      state_name,
      EventPayload::TaskDispatched {
        resource: resource.to_string(),
        parameters,
        attempt,
      },
    )
  }

  pub fn task_completed(
    execution_id: &str,
    state_name: &str,
    output: serde_json::Value,
    attempt: u32,
  ) -> Self {
    Self::new(
      execution_id,
      state_name,
      EventPayload::TaskCompleted { output, attempt },
    )
  }

  pub fn task_failed(execution_id: &str, state_name: &str, error: &str, attempt: u32) -> Self {
    Self::new(
      execution_id,
      state_name,
      EventPayload::TaskFailed {
        error: error.to_string(),
        attempt,
      },
    )
  }

  pub fn state_exited(
    execution_id: &str,
    state_name: &str,
    output: serde_json::Value,
    next: Option<String>,
  ) -> Self {
    Self::new(
      execution_id,
      state_name,
      EventPayload::StateExited { output, next },
    )
  }

  pub fn execution_succeeded(
    execution_id: &str,
    state_name: &str,
    output: serde_json::Value,
  ) -> Self {
    Self::new(
      execution_id,
      state_name,
      EventPayload::ExecutionSucceeded { output },
    )
  }

  pub fn execution_failed(execution_id: &str, state_name: &str, error: &str) -> Self {
    Self::new(
      execution_id,
      state_name,
      EventPayload::ExecutionFailed {
        error: error.to_string(),
      },
    )
  }
}
