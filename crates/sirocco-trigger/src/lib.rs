//! Sirocco Trigger
//!
//! The asynchronous boundary between the interpreter and external task
//! executors. Outbound, a [`TriggerDispatcher`] fires a
//! [`TriggerRequest`] toward whatever reaches the executor (a function
//! invocation queue, an HTTP call, a pub/sub publish); delivery is
//! at-least-once and the transport is opaque to the engine. Inbound,
//! completions are correlated back to their waiting task by a
//! [`ContinuationToken`] (`execution_id` + `state_name` + `attempt`)
//! through the [`CompletionRouter`], which deduplicates duplicate
//! external notifications so the interpreter sees exactly one outcome
//! per logical attempt.
//!
//! [`LocalDispatcher`] is an in-process implementation backed by a
//! registry of async handlers, used by tests and embedded deployments.

mod dispatcher;
mod error;
mod local;
mod router;
mod types;

pub use dispatcher::TriggerDispatcher;
pub use error::DispatchError;
pub use local::LocalDispatcher;
pub use router::CompletionRouter;
pub use types::{ContinuationToken, TriggerCompletion, TriggerOutcome, TriggerRequest};
