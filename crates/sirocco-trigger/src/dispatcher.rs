use async_trait::async_trait;

use crate::error::DispatchError;
use crate::types::TriggerRequest;

/// Sends task invocations toward external executors.
///
/// Implementations deliver the request at least once and report the
/// outcome asynchronously through the [`CompletionRouter`]; `dispatch`
/// returning `Ok` only means the request left the engine. Transports
/// that can fail synchronously surface that as a `DispatchError`.
///
/// [`CompletionRouter`]: crate::CompletionRouter
#[async_trait]
pub trait TriggerDispatcher: Send + Sync {
  async fn dispatch(&self, request: TriggerRequest) -> Result<(), DispatchError>;
}
