use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
  #[error("trigger transport failed for resource '{resource}': {message}")]
  Transport { resource: String, message: String },
}
