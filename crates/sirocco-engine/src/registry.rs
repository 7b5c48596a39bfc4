use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;

/// Cancellation tokens of the executions currently running in this
/// process, keyed by execution id. Entries are added at submission and
/// recovery and pruned when the interpreter task settles.
#[derive(Default)]
pub(crate) struct ExecutionRegistry {
  running: Mutex<HashMap<String, CancellationToken>>,
}

impl ExecutionRegistry {
  fn lock(&self) -> MutexGuard<'_, HashMap<String, CancellationToken>> {
    self.running.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  pub fn insert(&self, execution_id: &str, token: CancellationToken) {
    self.lock().insert(execution_id.to_string(), token);
  }

  pub fn remove(&self, execution_id: &str) {
    self.lock().remove(execution_id);
  }

  /// Cancel a running execution. Returns `false` when the id is not
  /// running in this process.
  pub fn cancel(&self, execution_id: &str) -> bool {
    match self.lock().get(execution_id) {
      Some(token) => {
        token.cancel();
        true
      }
      None => false,
    }
  }

  pub fn running_count(&self) -> usize {
    self.lock().len()
  }
}
