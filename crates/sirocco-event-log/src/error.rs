use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventLogError {
  #[error("execution '{0}' not found")]
  ExecutionNotFound(String),

  #[error("invalid execution status '{0}'")]
  InvalidStatus(String),

  #[error("event payload serialization failed: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error(transparent)]
  Database(#[from] sqlx::Error),
}
