use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
  #[error("invalid path '{path}': {reason}")]
  Invalid { path: String, reason: String },

  #[error("path '{path}' not found")]
  NotFound { path: String },

  #[error("cannot write result at '{path}': would overwrite a non-container value")]
  Unmergeable { path: String },

  #[error("parameter '{key}' must hold a path string")]
  InvalidParameter { key: String },
}

impl PathError {
  pub(crate) fn invalid(path: &str, reason: &str) -> Self {
    Self::Invalid {
      path: path.to_string(),
      reason: reason.to_string(),
    }
  }

  pub(crate) fn not_found(path: &str) -> Self {
    Self::NotFound {
      path: path.to_string(),
    }
  }
}
