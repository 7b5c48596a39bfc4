//! The state machine interpreter.
//!
//! One `Interpreter` is shared by every execution the engine drives; it
//! owns no per-execution state. `run` takes an [`ExecutionInstance`]
//! from its current state to a terminal state, appending an event for
//! everything that happens, so that replaying the log reproduces the
//! exact context the instance held at any point.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Value, json};
use sirocco_definition::{RetryPolicy, State, StateKind};
use sirocco_event_log::{EventStore, ExecutionStatus, NewEvent};
use sirocco_path::{PathError, apply_input_path, apply_result_path, resolve, resolve_parameters};
use sirocco_trigger::{CompletionRouter, ContinuationToken, TriggerDispatcher, TriggerOutcome, TriggerRequest};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::EngineConfig;
use crate::error::{ExecutionError, FAIL_ERROR, TIMEOUT_ERROR};
use crate::instance::{ExecutionInstance, ExecutionOutcome};

/// Where to pick an interrupted execution back up after replay.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResumePoint {
  /// The current state's `StateEntered` event is already in the log.
  pub entered: bool,
  /// Attempt number of a task dispatch whose completion never arrived;
  /// re-dispatching reuses it so a late completion deduplicates.
  pub in_flight_attempt: Option<u32>,
}

/// How a state hands control onward.
enum Transition {
  Next(String),
  /// The state ends its scope with the execution succeeding.
  Finish,
  /// A `Fail` state ends its scope with the execution failing.
  Fail { error: String, cause: Option<String> },
}

#[derive(Clone)]
pub struct Interpreter {
  pub(crate) store: Arc<dyn EventStore>,
  pub(crate) dispatcher: Arc<dyn TriggerDispatcher>,
  pub(crate) router: Arc<CompletionRouter>,
  pub(crate) config: EngineConfig,
}

impl Interpreter {
  pub fn new(
    store: Arc<dyn EventStore>,
    dispatcher: Arc<dyn TriggerDispatcher>,
    router: Arc<CompletionRouter>,
    config: EngineConfig,
  ) -> Self {
    Self {
      store,
      dispatcher,
      router,
      config,
    }
  }

  /// Drive an execution from its current state to a terminal state,
  /// recording the terminal event and status.
  pub async fn run(&self, instance: ExecutionInstance, cancel: CancellationToken) -> ExecutionOutcome {
    self.run_with(instance, cancel, None).await
  }

  /// Like [`run`](Self::run), but for an instance rebuilt by replay:
  /// the resume point says which log entries already exist for the
  /// current state.
  pub async fn resume(
    &self,
    instance: ExecutionInstance,
    point: ResumePoint,
    cancel: CancellationToken,
  ) -> ExecutionOutcome {
    self.run_with(instance, cancel, Some(point)).await
  }

  #[instrument(skip_all, fields(execution_id = %instance.execution_id))]
  async fn run_with(
    &self,
    mut instance: ExecutionInstance,
    cancel: CancellationToken,
    resume: Option<ResumePoint>,
  ) -> ExecutionOutcome {
    let execution_id = instance.execution_id.clone();
    info!(state = %instance.current_state, "driving execution");

    match self.drive(&mut instance, &cancel, 0, resume).await {
      Ok(output) => {
        info!("execution succeeded");
        if let Err(store_error) = self
          .record_terminal(
            &execution_id,
            NewEvent::execution_succeeded(&execution_id, &instance.current_state, output.clone()),
            ExecutionStatus::Succeeded,
          )
          .await
        {
          error!(error = %store_error, "failed to record execution success");
        }
        ExecutionOutcome {
          execution_id,
          status: ExecutionStatus::Succeeded,
          output: Some(output),
          error: None,
        }
      }
      Err(ExecutionError::Cancelled) => {
        info!(state = %instance.current_state, "execution aborted");
        if let Err(store_error) = self
          .store
          .set_status(&execution_id, ExecutionStatus::Aborted, Some(Utc::now()))
          .await
        {
          error!(error = %store_error, "failed to record execution abort");
        }
        ExecutionOutcome {
          execution_id,
          status: ExecutionStatus::Aborted,
          output: None,
          error: Some(ExecutionError::Cancelled.to_string()),
        }
      }
      Err(run_error) => {
        let message = run_error.to_string();
        warn!(state = %instance.current_state, error = %message, "execution failed");
        if let Err(store_error) = self
          .record_terminal(
            &execution_id,
            NewEvent::execution_failed(&execution_id, &instance.current_state, &message),
            ExecutionStatus::Failed,
          )
          .await
        {
          error!(error = %store_error, "failed to record execution failure");
        }
        ExecutionOutcome {
          execution_id,
          status: ExecutionStatus::Failed,
          output: None,
          error: Some(message),
        }
      }
    }
  }

  async fn record_terminal(
    &self,
    execution_id: &str,
    event: NewEvent,
    status: ExecutionStatus,
  ) -> Result<(), ExecutionError> {
    self.store.append(event).await?;
    self.store.set_status(execution_id, status, Some(Utc::now())).await?;
    Ok(())
  }

  /// The interpretation loop for one scope: the root definition, a
  /// Parallel branch or a Map iterator. Returns the scope's output.
  pub(crate) async fn drive(
    &self,
    instance: &mut ExecutionInstance,
    cancel: &CancellationToken,
    depth: usize,
    mut resume: Option<ResumePoint>,
  ) -> Result<Value, ExecutionError> {
    loop {
      if cancel.is_cancelled() {
        return Err(ExecutionError::Cancelled);
      }

      let state_name = instance.current_state.clone();
      let definition = instance.definition.clone();
      let state = definition
        .get_state(&state_name)
        .ok_or_else(|| ExecutionError::UnknownState(state_name.clone()))?;

      let point = resume.take().unwrap_or_default();
      if !point.entered {
        self
          .store
          .append(NewEvent::state_entered(
            &instance.execution_id,
            &state_name,
            instance.data_context.clone(),
          ))
          .await?;
      }
      debug!(execution_id = %instance.execution_id, state = %state_name, "entering state");

      let step = self
        .execute_state(instance, &state_name, state, cancel, depth, point.in_flight_attempt)
        .await;

      let (output, transition) = match step {
        Ok(step) => step,
        Err(step_error) => match self.try_catch(&state_name, state, &instance.data_context, &step_error)? {
          Some((caught, next)) => {
            info!(
              execution_id = %instance.execution_id,
              state = %state_name,
              error = %step_error.error_name(),
              next = %next,
              "catch rule redirected failure"
            );
            (caught, Transition::Next(next))
          }
          None => return Err(step_error),
        },
      };

      match transition {
        Transition::Next(next) => {
          self
            .store
            .append(NewEvent::state_exited(
              &instance.execution_id,
              &state_name,
              output.clone(),
              Some(next.clone()),
            ))
            .await?;
          instance.data_context = output;
          instance.current_state = next;
        }
        Transition::Finish => {
          self
            .store
            .append(NewEvent::state_exited(
              &instance.execution_id,
              &state_name,
              output.clone(),
              None,
            ))
            .await?;
          return Ok(output);
        }
        Transition::Fail { error, cause } => {
          return Err(ExecutionError::FailState {
            state: state_name,
            error,
            cause,
          });
        }
      }
    }
  }

  async fn execute_state(
    &self,
    instance: &ExecutionInstance,
    state_name: &str,
    state: &State,
    cancel: &CancellationToken,
    depth: usize,
    in_flight_attempt: Option<u32>,
  ) -> Result<(Value, Transition), ExecutionError> {
    let effective = apply_input_path(&instance.data_context, state.input_path.as_deref())
      .map_err(|source| path_failure(state_name, source))?;

    match &state.kind {
      StateKind::Task {
        resource,
        parameters,
        timeout_seconds,
        retry,
        catch: _,
      } => {
        let result = self
          .run_task(
            &instance.execution_id,
            state_name,
            resource,
            parameters.as_ref(),
            *timeout_seconds,
            retry.as_ref(),
            &effective,
            cancel,
            in_flight_attempt.unwrap_or(0),
          )
          .await?;
        let output = apply_result_path(&instance.data_context, state.result_path.as_deref(), result)
          .map_err(|source| path_failure(state_name, source))?;
        Ok((output, transition_of(state_name, state)?))
      }

      StateKind::Choice { choices, default } => {
        for rule in choices {
          let matched = match resolve(&effective, &rule.variable) {
            Ok(value) => rule.comparison.evaluate(&value),
            // An absent variable fails the rule, not the execution,
            // mirroring how a type mismatch is handled.
            Err(PathError::NotFound { .. }) => false,
            Err(source) => return Err(path_failure(state_name, source)),
          };
          if matched {
            debug!(state = %state_name, variable = %rule.variable, next = %rule.next, "choice rule matched");
            return Ok((effective, Transition::Next(rule.next.clone())));
          }
        }
        match default {
          Some(next) => Ok((effective, Transition::Next(next.clone()))),
          None => Err(ExecutionError::NoMatchingChoice {
            state: state_name.to_string(),
          }),
        }
      }

      StateKind::Pass { result } => {
        let result = result.clone().unwrap_or_else(|| effective.clone());
        let output = apply_result_path(&instance.data_context, state.result_path.as_deref(), result)
          .map_err(|source| path_failure(state_name, source))?;
        Ok((output, transition_of(state_name, state)?))
      }

      StateKind::Wait {
        seconds,
        seconds_path,
      } => {
        let duration = match seconds_path {
          Some(path) => {
            let value = resolve(&effective, path).map_err(|source| path_failure(state_name, source))?;
            value.as_u64().ok_or_else(|| {
              path_failure(
                state_name,
                PathError::Invalid {
                  path: path.clone(),
                  reason: "expected a non-negative integer".to_string(),
                },
              )
            })?
          }
          None => seconds.unwrap_or(0),
        };
        debug!(state = %state_name, seconds = duration, "waiting");
        tokio::select! {
          _ = cancel.cancelled() => return Err(ExecutionError::Cancelled),
          _ = tokio::time::sleep(Duration::from_secs(duration)) => {}
        }
        Ok((effective, transition_of(state_name, state)?))
      }

      StateKind::Parallel { branches, catch: _ } => {
        let results = self
          .run_parallel(instance, state_name, branches, &effective, cancel, depth)
          .await?;
        let output = apply_result_path(&instance.data_context, state.result_path.as_deref(), results)
          .map_err(|source| path_failure(state_name, source))?;
        Ok((output, transition_of(state_name, state)?))
      }

      StateKind::Map {
        items_path,
        iterator,
        max_concurrency,
        catch: _,
      } => {
        let results = self
          .run_map(
            instance,
            state_name,
            items_path.as_deref(),
            iterator,
            *max_concurrency,
            &effective,
            cancel,
            depth,
          )
          .await?;
        let output = apply_result_path(&instance.data_context, state.result_path.as_deref(), results)
          .map_err(|source| path_failure(state_name, source))?;
        Ok((output, transition_of(state_name, state)?))
      }

      StateKind::Succeed => Ok((effective, Transition::Finish)),

      StateKind::Fail { error, cause } => Ok((
        Value::Null,
        Transition::Fail {
          error: error.clone().unwrap_or_else(|| FAIL_ERROR.to_string()),
          cause: cause.clone(),
        },
      )),
    }
  }

  /// Dispatch a task and await its completion, retrying per policy.
  /// `start_attempt` is non-zero only when recovery re-dispatches an
  /// attempt that was in flight at the crash.
  #[allow(clippy::too_many_arguments)]
  async fn run_task(
    &self,
    execution_id: &str,
    state_name: &str,
    resource: &str,
    parameters: Option<&Value>,
    timeout_seconds: Option<u64>,
    retry: Option<&RetryPolicy>,
    effective_input: &Value,
    cancel: &CancellationToken,
    start_attempt: u32,
  ) -> Result<Value, ExecutionError> {
    let policy = retry.or(self.config.default_retry.as_ref());
    let max_attempts = policy.map_or(1, |p| p.max_attempts.max(1));

    let params = match parameters {
      Some(template) => resolve_parameters(template, effective_input)
        .map_err(|source| path_failure(state_name, source))?,
      None => effective_input.clone(),
    };

    let mut attempt = start_attempt;
    loop {
      if cancel.is_cancelled() {
        return Err(ExecutionError::Cancelled);
      }

      let token = ContinuationToken::new(execution_id, state_name, attempt);
      // Register before dispatch: a completion may beat the dispatch
      // call returning.
      let receiver = self.router.register(token.clone()).await;

      self
        .store
        .append(NewEvent::task_dispatched(
          execution_id,
          state_name,
          resource,
          params.clone(),
          attempt,
        ))
        .await?;
      debug!(execution_id = %execution_id, state = %state_name, resource = %resource, attempt, "dispatching task");
      self
        .dispatcher
        .dispatch(TriggerRequest {
          token: token.clone(),
          resource: resource.to_string(),
          parameters: params.clone(),
        })
        .await?;

      match self.await_completion(state_name, receiver, timeout_seconds, cancel, &token).await? {
        TriggerOutcome::Success { output } => {
          self
            .store
            .append(NewEvent::task_completed(execution_id, state_name, output.clone(), attempt))
            .await?;
          return Ok(output);
        }
        TriggerOutcome::Failure { error: task_error } => {
          self
            .store
            .append(NewEvent::task_failed(execution_id, state_name, &task_error, attempt))
            .await?;
          warn!(execution_id = %execution_id, state = %state_name, attempt, error = %task_error, "task attempt failed");

          // Attempt numbers are monotonic from the state's first
          // entry, so the budget also counts attempts consumed before
          // a crash when recovery re-dispatches attempt N.
          let consumed = attempt + 1;
          if consumed >= max_attempts {
            return Err(ExecutionError::TaskFailed {
              state: state_name.to_string(),
              attempts: consumed,
              error: task_error,
            });
          }
          let Some(policy) = policy else {
            return Err(ExecutionError::TaskFailed {
              state: state_name.to_string(),
              attempts: consumed,
              error: task_error,
            });
          };
          attempt += 1;
          let delay = policy.interval_seconds as f64 * policy.backoff_rate.powi(attempt as i32 - 1);
          debug!(state = %state_name, attempt, delay_seconds = delay, "backing off before retry");
          tokio::select! {
            _ = cancel.cancelled() => return Err(ExecutionError::Cancelled),
            _ = tokio::time::sleep(Duration::from_secs_f64(delay)) => {}
          }
        }
      }
    }
  }

  async fn await_completion(
    &self,
    state_name: &str,
    receiver: oneshot::Receiver<TriggerOutcome>,
    timeout_seconds: Option<u64>,
    cancel: &CancellationToken,
    token: &ContinuationToken,
  ) -> Result<TriggerOutcome, ExecutionError> {
    let deadline = async {
      match timeout_seconds {
        Some(seconds) => tokio::time::sleep(Duration::from_secs(seconds)).await,
        None => std::future::pending().await,
      }
    };

    tokio::select! {
      _ = cancel.cancelled() => {
        self.router.forget(token).await;
        Err(ExecutionError::Cancelled)
      }
      _ = deadline => {
        self.router.forget(token).await;
        warn!(token = %token, "task attempt timed out");
        Ok(TriggerOutcome::Failure { error: TIMEOUT_ERROR.to_string() })
      }
      outcome = receiver => match outcome {
        Ok(outcome) => Ok(outcome),
        Err(_) => Err(ExecutionError::CompletionLost { state: state_name.to_string() }),
      }
    }
  }

  /// Match a failure against the state's catch rules. A hit merges
  /// `{Error, Cause}` at the rule's result path and redirects there.
  fn try_catch(
    &self,
    state_name: &str,
    state: &State,
    context: &Value,
    failure: &ExecutionError,
  ) -> Result<Option<(Value, String)>, ExecutionError> {
    if !failure.is_catchable() {
      return Ok(None);
    }
    let name = failure.error_name();
    for rule in state.catch_rules() {
      if rule.matches(name) {
        let info = json!({ "Error": name, "Cause": failure.to_string() });
        let merged = apply_result_path(context, rule.result_path.as_deref(), info)
          .map_err(|source| path_failure(state_name, source))?;
        return Ok(Some((merged, rule.next.clone())));
      }
    }
    Ok(None)
  }
}

fn path_failure(state_name: &str, source: PathError) -> ExecutionError {
  ExecutionError::Path {
    state: state_name.to_string(),
    source,
  }
}

fn transition_of(state_name: &str, state: &State) -> Result<Transition, ExecutionError> {
  if let Some(next) = &state.next {
    Ok(Transition::Next(next.clone()))
  } else if state.end {
    Ok(Transition::Finish)
  } else {
    // Unreachable for a validated definition.
    Err(ExecutionError::MissingTransition(state_name.to_string()))
  }
}
