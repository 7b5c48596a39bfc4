//! Completion correlation and deduplication.

use std::collections::HashMap;

use tokio::sync::{Mutex, oneshot};
use tracing::{debug, warn};

use crate::types::{ContinuationToken, TriggerCompletion, TriggerOutcome};

/// Routes inbound completions to the task attempt waiting on them.
///
/// Exactly one outcome is delivered per registered token; later
/// completions for the same token (at-least-once transports redeliver)
/// are dropped.
#[derive(Default)]
pub struct CompletionRouter {
  pending: Mutex<HashMap<ContinuationToken, oneshot::Sender<TriggerOutcome>>>,
}

impl CompletionRouter {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register interest in a token before dispatching its request.
  /// Registration must precede dispatch or a fast completion could
  /// arrive with nobody waiting.
  pub async fn register(&self, token: ContinuationToken) -> oneshot::Receiver<TriggerOutcome> {
    let (sender, receiver) = oneshot::channel();
    if self.pending.lock().await.insert(token.clone(), sender).is_some() {
      warn!(token = %token, "replaced a pending completion registration");
    }
    receiver
  }

  /// Deliver a completion. Returns `false` when the token is unknown
  /// or already completed, i.e. the notification was a duplicate.
  pub async fn complete(&self, completion: TriggerCompletion) -> bool {
    let sender = self.pending.lock().await.remove(&completion.token);
    match sender {
      Some(sender) => {
        if sender.send(completion.outcome).is_err() {
          debug!(token = %completion.token, "completion receiver dropped");
          return false;
        }
        true
      }
      None => {
        debug!(token = %completion.token, "dropping duplicate or unknown completion");
        false
      }
    }
  }

  /// Abandon a registration (cancellation, timeout). A completion
  /// arriving later is treated as a duplicate.
  pub async fn forget(&self, token: &ContinuationToken) {
    self.pending.lock().await.remove(token);
  }

  /// Number of attempts currently awaiting completion.
  pub async fn pending_count(&self) -> usize {
    self.pending.lock().await.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn token() -> ContinuationToken {
    ContinuationToken::new("exec", "DoWork", 0)
  }

  #[tokio::test]
  async fn test_completion_reaches_registered_receiver() {
    let router = CompletionRouter::new();
    let receiver = router.register(token()).await;

    let delivered = router
      .complete(TriggerCompletion {
        token: token(),
        outcome: TriggerOutcome::Success {
          output: json!({"ok": true}),
        },
      })
      .await;

    assert!(delivered);
    assert_eq!(
      receiver.await.unwrap(),
      TriggerOutcome::Success {
        output: json!({"ok": true})
      }
    );
  }

  #[tokio::test]
  async fn test_duplicate_completion_is_dropped() {
    let router = CompletionRouter::new();
    let _receiver = router.register(token()).await;

    let first = router
      .complete(TriggerCompletion {
        token: token(),
        outcome: TriggerOutcome::Success { output: json!(1) },
      })
      .await;
    let second = router
      .complete(TriggerCompletion {
        token: token(),
        outcome: TriggerOutcome::Success { output: json!(2) },
      })
      .await;

    assert!(first);
    assert!(!second);
  }

  #[tokio::test]
  async fn test_forget_abandons_registration() {
    let router = CompletionRouter::new();
    let _receiver = router.register(token()).await;
    router.forget(&token()).await;

    assert_eq!(router.pending_count().await, 0);
    let delivered = router
      .complete(TriggerCompletion {
        token: token(),
        outcome: TriggerOutcome::Failure {
          error: "late".to_string(),
        },
      })
      .await;
    assert!(!delivered);
  }

  #[tokio::test]
  async fn test_attempts_are_independent() {
    let router = CompletionRouter::new();
    let first = router.register(ContinuationToken::new("exec", "S", 0)).await;
    let second = router.register(ContinuationToken::new("exec", "S", 1)).await;

    router
      .complete(TriggerCompletion {
        token: ContinuationToken::new("exec", "S", 1),
        outcome: TriggerOutcome::Success { output: json!(2) },
      })
      .await;

    assert_eq!(
      second.await.unwrap(),
      TriggerOutcome::Success { output: json!(2) }
    );
    drop(first);
  }
}
