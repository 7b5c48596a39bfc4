//! Coordination of Parallel branches and Map iterations.
//!
//! Every branch and iteration runs as a child execution with its own
//! event stream and execution record, identified by
//! `{parent}/{state}[{index}]#{run}`. The run discriminator is fresh
//! per state entry, so when recovery re-runs a Parallel/Map state the
//! new children get their own streams instead of appending to the
//! interrupted run's. Children share a derived cancellation token so
//! the first failure stops the rest; outputs come back in branch order
//! no matter which child finishes first.

use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use serde_json::Value;
use sirocco_definition::WorkflowDefinition;
use sirocco_event_log::{EventStore, ExecutionRecord, ExecutionStatus, NewEvent};
use sirocco_path::resolve;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ExecutionError;
use crate::instance::ExecutionInstance;
use crate::interpreter::Interpreter;

type ChildFuture = BoxFuture<'static, (usize, Result<Value, ExecutionError>)>;

impl Interpreter {
  pub(crate) async fn run_parallel(
    &self,
    instance: &ExecutionInstance,
    state_name: &str,
    branches: &[WorkflowDefinition],
    effective: &Value,
    cancel: &CancellationToken,
    depth: usize,
  ) -> Result<Value, ExecutionError> {
    self.check_depth(state_name, depth)?;
    let child_cancel = cancel.child_token();
    let run = run_token();

    let tasks: FuturesUnordered<ChildFuture> = branches
      .iter()
      .enumerate()
      .map(|(index, branch)| {
        let child = self.run_child(
          child_id(&instance.execution_id, state_name, index, &run),
          instance.execution_id.clone(),
          Arc::new(branch.clone()),
          effective.clone(),
          child_cancel.clone(),
          depth + 1,
        );
        Box::pin(async move { (index, child.await) }) as ChildFuture
      })
      .collect();

    join_ordered(state_name, branches.len(), tasks, &child_cancel, cancel).await
  }

  #[allow(clippy::too_many_arguments)]
  pub(crate) async fn run_map(
    &self,
    instance: &ExecutionInstance,
    state_name: &str,
    items_path: Option<&str>,
    iterator: &WorkflowDefinition,
    max_concurrency: Option<usize>,
    effective: &Value,
    cancel: &CancellationToken,
    depth: usize,
  ) -> Result<Value, ExecutionError> {
    self.check_depth(state_name, depth)?;

    let items = match items_path {
      Some(path) => resolve(effective, path).map_err(|source| ExecutionError::Path {
        state: state_name.to_string(),
        source,
      })?,
      None => effective.clone(),
    };
    let Value::Array(items) = items else {
      return Err(ExecutionError::InvalidItems {
        state: state_name.to_string(),
        path: items_path.unwrap_or("$").to_string(),
      });
    };

    let limit = max_concurrency
      .unwrap_or(self.config.max_map_concurrency)
      .min(self.config.max_map_concurrency)
      .max(1);
    let semaphore = Arc::new(Semaphore::new(limit));
    let iterator = Arc::new(iterator.clone());
    let child_cancel = cancel.child_token();
    let run = run_token();
    let count = items.len();

    let tasks: FuturesUnordered<ChildFuture> = items
      .into_iter()
      .enumerate()
      .map(|(index, item)| {
        let child = self.run_child(
          child_id(&instance.execution_id, state_name, index, &run),
          instance.execution_id.clone(),
          iterator.clone(),
          item,
          child_cancel.clone(),
          depth + 1,
        );
        let semaphore = semaphore.clone();
        Box::pin(async move {
          let _permit = match semaphore.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return (index, Err(ExecutionError::Cancelled)),
          };
          (index, child.await)
        }) as ChildFuture
      })
      .collect();

    join_ordered(state_name, count, tasks, &child_cancel, cancel).await
  }

  /// Run one child scope to completion, maintaining its own record and
  /// terminal events. Boxed to break the recursion through nested
  /// Parallel/Map states.
  fn run_child(
    &self,
    child_id: String,
    parent_id: String,
    definition: Arc<WorkflowDefinition>,
    input: Value,
    cancel: CancellationToken,
    depth: usize,
  ) -> BoxFuture<'static, Result<Value, ExecutionError>> {
    let interpreter = self.clone();
    Box::pin(async move {
      interpreter
        .store
        .put_execution(&ExecutionRecord::child(&child_id, &parent_id))
        .await?;
      debug!(execution_id = %child_id, parent_id = %parent_id, "starting child execution");

      let mut instance = ExecutionInstance::new(&child_id, definition, input);
      let result = interpreter.drive(&mut instance, &cancel, depth, None).await;

      match &result {
        Ok(output) => {
          interpreter
            .store
            .append(NewEvent::execution_succeeded(&child_id, &instance.current_state, output.clone()))
            .await?;
          interpreter
            .store
            .set_status(&child_id, ExecutionStatus::Succeeded, Some(Utc::now()))
            .await?;
        }
        Err(ExecutionError::Cancelled) => {
          interpreter
            .store
            .set_status(&child_id, ExecutionStatus::Aborted, Some(Utc::now()))
            .await?;
        }
        Err(child_error) => {
          interpreter
            .store
            .append(NewEvent::execution_failed(&child_id, &instance.current_state, &child_error.to_string()))
            .await?;
          interpreter
            .store
            .set_status(&child_id, ExecutionStatus::Failed, Some(Utc::now()))
            .await?;
        }
      }
      result
    })
  }

  fn check_depth(&self, state_name: &str, depth: usize) -> Result<(), ExecutionError> {
    if depth + 1 > self.config.max_branch_depth {
      return Err(ExecutionError::DepthExceeded {
        state: state_name.to_string(),
        max: self.config.max_branch_depth,
      });
    }
    Ok(())
  }
}

fn child_id(parent: &str, state_name: &str, index: usize, run: &str) -> String {
  format!("{parent}/{state_name}[{index}]#{run}")
}

fn run_token() -> String {
  Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Drain the children, slotting outputs by branch index. The first
/// failure cancels the siblings; the rest are drained so their records
/// settle before the state fails.
async fn join_ordered(
  state_name: &str,
  count: usize,
  mut tasks: FuturesUnordered<ChildFuture>,
  child_cancel: &CancellationToken,
  cancel: &CancellationToken,
) -> Result<Value, ExecutionError> {
  let mut results: Vec<Option<Value>> = vec![None; count];
  let mut failure: Option<(usize, ExecutionError)> = None;

  while let Some((index, result)) = tasks.next().await {
    match result {
      Ok(output) => results[index] = Some(output),
      Err(child_error) => {
        if failure.is_none() {
          warn!(state = %state_name, index, error = %child_error, "child execution failed, cancelling siblings");
          child_cancel.cancel();
          failure = Some((index, child_error));
        } else {
          debug!(state = %state_name, index, "sibling settled after cancellation");
        }
      }
    }
  }

  if cancel.is_cancelled() {
    return Err(ExecutionError::Cancelled);
  }
  if let Some((index, child_error)) = failure {
    return Err(ExecutionError::BranchFailed {
      state: state_name.to_string(),
      index,
      error: child_error.to_string(),
    });
  }

  Ok(Value::Array(results.into_iter().flatten().collect()))
}
