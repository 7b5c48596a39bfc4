//! In-process dispatcher backed by registered async handlers.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::dispatcher::TriggerDispatcher;
use crate::error::DispatchError;
use crate::router::CompletionRouter;
use crate::types::{TriggerCompletion, TriggerOutcome, TriggerRequest};

type HandlerFuture = Pin<Box<dyn Future<Output = Result<serde_json::Value, String>> + Send>>;
type TaskHandler = Arc<dyn Fn(serde_json::Value) -> HandlerFuture + Send + Sync>;

/// Dispatcher that runs executors as local tokio tasks.
///
/// Each dispatch spawns the handler registered for the request's
/// resource and posts its outcome back through the completion router,
/// exactly as a remote executor would over a callback transport. An
/// unknown resource completes as a failure rather than failing the
/// dispatch, matching the asynchronous error path of a real transport.
pub struct LocalDispatcher {
  router: Arc<CompletionRouter>,
  handlers: RwLock<HashMap<String, TaskHandler>>,
}

impl LocalDispatcher {
  pub fn new(router: Arc<CompletionRouter>) -> Self {
    Self {
      router,
      handlers: RwLock::new(HashMap::new()),
    }
  }

  /// Register the executor for a resource name. Replaces any previous
  /// handler for the same resource.
  pub async fn register<F, Fut>(&self, resource: &str, handler: F)
  where
    F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<serde_json::Value, String>> + Send + 'static,
  {
    let handler: TaskHandler = Arc::new(move |input| Box::pin(handler(input)));
    self
      .handlers
      .write()
      .await
      .insert(resource.to_string(), handler);
  }
}

#[async_trait]
impl TriggerDispatcher for LocalDispatcher {
  async fn dispatch(&self, request: TriggerRequest) -> Result<(), DispatchError> {
    let handler = self.handlers.read().await.get(&request.resource).cloned();
    let router = self.router.clone();

    match handler {
      Some(handler) => {
        debug!(token = %request.token, resource = %request.resource, "dispatching task");
        tokio::spawn(async move {
          let outcome = match handler(request.parameters).await {
            Ok(output) => TriggerOutcome::Success { output },
            Err(error) => TriggerOutcome::Failure { error },
          };
          router
            .complete(TriggerCompletion {
              token: request.token,
              outcome,
            })
            .await;
        });
      }
      None => {
        warn!(resource = %request.resource, "no executor registered for resource");
        router
          .complete(TriggerCompletion {
            token: request.token,
            outcome: TriggerOutcome::Failure {
              error: format!("no executor registered for resource '{}'", request.resource),
            },
          })
          .await;
      }
    }

    Ok(())
  }
}
