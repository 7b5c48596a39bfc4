use thiserror::Error;

#[derive(Debug, Error)]
pub enum DefinitionError {
  #[error("invalid definition JSON: {0}")]
  Json(#[from] serde_json::Error),

  #[error("definition has no states")]
  EmptyStates,

  #[error("start state '{0}' does not exist")]
  UnknownStartAt(String),

  #[error("state '{state}' transitions to unknown state '{target}'")]
  UnknownTarget { state: String, target: String },

  #[error("state '{0}' is neither terminal nor has a Next transition")]
  MissingTransition(String),

  #[error("state '{0}' declares both End and Next")]
  ConflictingTransition(String),

  #[error("state '{0}' is unreachable from the start state")]
  UnreachableState(String),

  #[error("state '{0}' cannot reach a terminal state")]
  NoTerminalPath(String),

  #[error("choice state '{0}' has no rules")]
  EmptyChoices(String),

  #[error("wait state '{0}' needs Seconds or SecondsPath")]
  MissingWaitDuration(String),

  #[error("parallel state '{0}' has no branches")]
  EmptyBranches(String),

  #[error("in branch {index} of state '{state}': {source}")]
  InvalidBranch {
    state: String,
    index: usize,
    #[source]
    source: Box<DefinitionError>,
  },

  #[error("in iterator of state '{state}': {source}")]
  InvalidIterator {
    state: String,
    #[source]
    source: Box<DefinitionError>,
  },
}
