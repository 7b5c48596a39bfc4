use sirocco_definition::DefinitionError;
use sirocco_event_log::EventLogError;
use sirocco_path::PathError;
use sirocco_trigger::DispatchError;
use thiserror::Error;

/// Error name reported when a task attempt exceeds its deadline.
pub const TIMEOUT_ERROR: &str = "States.Timeout";

/// Default error name of a `Fail` state that does not set one.
pub const FAIL_ERROR: &str = "States.Fail";

#[derive(Debug, Error)]
pub enum ExecutionError {
  #[error(transparent)]
  Definition(#[from] DefinitionError),

  #[error("path resolution failed in state '{state}': {source}")]
  Path {
    state: String,
    #[source]
    source: PathError,
  },

  #[error("no choice rule matched in state '{state}' and no default is set")]
  NoMatchingChoice { state: String },

  #[error("task '{state}' failed after {attempts} attempt(s): {error}")]
  TaskFailed {
    state: String,
    attempts: u32,
    error: String,
  },

  #[error("branch {index} of state '{state}' failed: {error}")]
  BranchFailed {
    state: String,
    index: usize,
    error: String,
  },

  #[error("items path '{path}' in state '{state}' did not resolve to an array")]
  InvalidItems { state: String, path: String },

  #[error("state '{state}' exceeds the maximum nesting depth of {max}")]
  DepthExceeded { state: String, max: usize },

  #[error("execution reached Fail state '{state}': {error}")]
  FailState {
    state: String,
    error: String,
    cause: Option<String>,
  },

  #[error("state '{0}' is not defined")]
  UnknownState(String),

  #[error("state '{0}' finished without a transition")]
  MissingTransition(String),

  #[error("completion channel closed while state '{state}' was waiting")]
  CompletionLost { state: String },

  #[error("execution was cancelled")]
  Cancelled,

  #[error(transparent)]
  EventLog(#[from] EventLogError),

  #[error(transparent)]
  Dispatch(#[from] DispatchError),
}

impl ExecutionError {
  /// The error name catch rules match against. Task failures carry the
  /// name the executor reported (including `States.Timeout` for missed
  /// deadlines); the interpreter's own failures map to stable names.
  pub fn error_name(&self) -> &str {
    match self {
      ExecutionError::TaskFailed { error, .. } => error,
      ExecutionError::FailState { error, .. } => error,
      ExecutionError::BranchFailed { .. } => "States.BranchFailed",
      ExecutionError::NoMatchingChoice { .. } => "States.NoChoiceMatched",
      ExecutionError::Path { .. } | ExecutionError::InvalidItems { .. } => "States.PathFailure",
      _ => "States.Runtime",
    }
  }

  /// Whether catch rules may redirect this failure. Cancellation and
  /// storage failures always propagate.
  pub(crate) fn is_catchable(&self) -> bool {
    !matches!(
      self,
      ExecutionError::Cancelled | ExecutionError::EventLog(_) | ExecutionError::Dispatch(_)
    )
  }
}
