//! Submission, query and recovery surface.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use sirocco_definition::WorkflowDefinition;
use sirocco_event_log::{
  EventLogError, EventPayload, EventStore, ExecutionEvent, ExecutionRecord, ExecutionStatus,
  NewEvent,
};
use sirocco_trigger::{CompletionRouter, TriggerDispatcher};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::ExecutionError;
use crate::instance::{ExecutionInstance, ExecutionOutcome};
use crate::interpreter::{Interpreter, ResumePoint};
use crate::recovery::{Replayed, replay};
use crate::registry::ExecutionRegistry;

/// The orchestration engine: owns the interpreter and the registry of
/// running executions. Cheap to share behind an `Arc`.
pub struct Engine {
  interpreter: Interpreter,
  store: Arc<dyn EventStore>,
  registry: Arc<ExecutionRegistry>,
}

/// Handle to one spawned execution.
pub struct ExecutionHandle {
  execution_id: String,
  cancel: CancellationToken,
  join: JoinHandle<ExecutionOutcome>,
}

impl ExecutionHandle {
  pub fn execution_id(&self) -> &str {
    &self.execution_id
  }

  /// Request cooperative cancellation; the execution settles as
  /// `Aborted` once the interpreter observes the token.
  pub fn abort(&self) {
    self.cancel.cancel();
  }

  /// Wait for the execution to settle.
  pub async fn wait(self) -> ExecutionOutcome {
    match self.join.await {
      Ok(outcome) => outcome,
      Err(join_error) => ExecutionOutcome {
        execution_id: self.execution_id,
        status: ExecutionStatus::Aborted,
        output: None,
        error: Some(format!("interpreter task failed: {join_error}")),
      },
    }
  }
}

impl Engine {
  pub fn new(
    store: Arc<dyn EventStore>,
    dispatcher: Arc<dyn TriggerDispatcher>,
    router: Arc<CompletionRouter>,
    config: EngineConfig,
  ) -> Self {
    Self {
      interpreter: Interpreter::new(store.clone(), dispatcher, router, config),
      store,
      registry: Arc::new(ExecutionRegistry::default()),
    }
  }

  /// Validate and submit a workflow. The definition and input are
  /// persisted with the execution record before the interpreter task
  /// starts, so a crash at any later point can be recovered.
  pub async fn start_execution(
    &self,
    definition: WorkflowDefinition,
    input: Value,
  ) -> Result<ExecutionHandle, ExecutionError> {
    definition.validate()?;

    let execution_id = Uuid::new_v4().to_string();
    let record = ExecutionRecord::root(
      &execution_id,
      serde_json::to_string(&definition).map_err(EventLogError::from)?,
      serde_json::to_string(&input).map_err(EventLogError::from)?,
    );
    self.store.put_execution(&record).await?;
    info!(execution_id = %execution_id, start_at = %definition.start_at, "execution submitted");

    let instance = ExecutionInstance::new(&execution_id, Arc::new(definition), input);
    Ok(self.spawn(instance, None))
  }

  fn spawn(&self, instance: ExecutionInstance, resume: Option<ResumePoint>) -> ExecutionHandle {
    let execution_id = instance.execution_id.clone();
    let cancel = CancellationToken::new();
    self.registry.insert(&execution_id, cancel.clone());

    let interpreter = self.interpreter.clone();
    let registry = self.registry.clone();
    let task_cancel = cancel.clone();
    let task_id = execution_id.clone();
    let join = tokio::spawn(async move {
      let outcome = match resume {
        Some(point) => interpreter.resume(instance, point, task_cancel).await,
        None => interpreter.run(instance, task_cancel).await,
      };
      registry.remove(&task_id);
      outcome
    });

    ExecutionHandle {
      execution_id,
      cancel,
      join,
    }
  }

  /// Current record of an execution.
  pub async fn status(&self, execution_id: &str) -> Result<ExecutionRecord, ExecutionError> {
    Ok(self.store.get_execution(execution_id).await?)
  }

  /// Full event history of an execution, in sequence order.
  pub async fn history(&self, execution_id: &str) -> Result<Vec<ExecutionEvent>, ExecutionError> {
    Ok(self.store.read_all(execution_id).await?)
  }

  /// Direct child executions (Parallel branches, Map iterations) of an
  /// execution, ordered by id. Child ids carry a per-run discriminator,
  /// so look them up here rather than deriving them.
  pub async fn children(
    &self,
    execution_id: &str,
  ) -> Result<Vec<ExecutionRecord>, ExecutionError> {
    Ok(self.store.list_children(execution_id).await?)
  }

  /// The execution's current data context, as committed to the log:
  /// the context of the last entered or exited state, or the initial
  /// input when nothing ran yet.
  pub async fn data_context(&self, execution_id: &str) -> Result<Value, ExecutionError> {
    let record = self.store.get_execution(execution_id).await?;
    let mut context = match &record.input {
      Some(input) => serde_json::from_str(input).map_err(EventLogError::from)?,
      None => Value::Null,
    };
    for event in self.store.read_all(execution_id).await? {
      match event.payload {
        EventPayload::StateEntered { input } => context = input,
        EventPayload::StateExited { output, .. } => context = output,
        EventPayload::ExecutionSucceeded { output } => context = output,
        _ => {}
      }
    }
    Ok(context)
  }

  /// Cancel an execution running in this process. Returns `false` when
  /// the id is unknown or already settled.
  pub fn abort(&self, execution_id: &str) -> bool {
    self.registry.cancel(execution_id)
  }

  pub fn running_count(&self) -> usize {
    self.registry.running_count()
  }

  /// Resume every open execution left behind by a previous process.
  ///
  /// Roots are replayed from their event log and either settled (the
  /// log already reached a terminal point) or resumed from where they
  /// stopped. Orphaned branch children are marked aborted; their parent
  /// re-runs the whole Parallel/Map state.
  pub async fn recover(&self) -> Result<Vec<ExecutionHandle>, ExecutionError> {
    let open = self.store.list_open_executions().await?;
    let mut handles = Vec::new();

    for record in open {
      if record.parent_id.is_some() {
        self
          .store
          .set_status(&record.execution_id, ExecutionStatus::Aborted, Some(Utc::now()))
          .await?;
        continue;
      }

      let Some((definition, input)) = self.decode_root(&record).await? else {
        continue;
      };
      let events = self.store.read_all(&record.execution_id).await?;

      match replay(&record.execution_id, Arc::new(definition), input, &events) {
        Replayed::Finished {
          status,
          output,
          error,
          needs_terminal_event,
          last_state,
        } => {
          info!(execution_id = %record.execution_id, status = %status, "settling finished execution");
          if needs_terminal_event {
            let event = match &error {
              None => NewEvent::execution_succeeded(
                &record.execution_id,
                &last_state,
                output.unwrap_or(Value::Null),
              ),
              Some(message) => NewEvent::execution_failed(&record.execution_id, &last_state, message),
            };
            self.store.append(event).await?;
          }
          self
            .store
            .set_status(&record.execution_id, status, Some(Utc::now()))
            .await?;
        }
        Replayed::Resume { instance, point } => {
          info!(
            execution_id = %record.execution_id,
            state = %instance.current_state,
            "resuming interrupted execution"
          );
          handles.push(self.spawn(instance, Some(point)));
        }
      }
    }

    Ok(handles)
  }

  /// Decode the definition and input persisted with a root record. A
  /// record that cannot be decoded is settled as failed rather than
  /// blocking recovery of the rest.
  async fn decode_root(
    &self,
    record: &ExecutionRecord,
  ) -> Result<Option<(WorkflowDefinition, Value)>, ExecutionError> {
    let decoded = record
      .definition
      .as_deref()
      .zip(record.input.as_deref())
      .and_then(|(definition, input)| {
        let definition: WorkflowDefinition = serde_json::from_str(definition).ok()?;
        let input: Value = serde_json::from_str(input).ok()?;
        Some((definition, input))
      });

    if decoded.is_none() {
      warn!(execution_id = %record.execution_id, "stored definition could not be decoded");
      self
        .store
        .append(NewEvent::execution_failed(
          &record.execution_id,
          "",
          "stored definition could not be decoded",
        ))
        .await?;
      self
        .store
        .set_status(&record.execution_id, ExecutionStatus::Failed, Some(Utc::now()))
        .await?;
    }
    Ok(decoded)
  }
}
