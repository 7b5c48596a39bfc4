//! Event log replay.
//!
//! Replay folds an execution's history back into the in-memory cursor
//! the interpreter had when the event was written: `StateEntered` moves
//! the cursor, `StateExited` commits the context and the chosen
//! successor, a trailing `TaskDispatched` without a completion marks an
//! attempt still in flight. The fold is pure; the engine decides what
//! to do with the result.

use std::sync::Arc;

use serde_json::Value;
use sirocco_definition::WorkflowDefinition;
use sirocco_event_log::{EventPayload, ExecutionEvent, ExecutionStatus};

use crate::instance::ExecutionInstance;
use crate::interpreter::ResumePoint;

/// What the log says about an interrupted execution.
#[derive(Debug)]
pub(crate) enum Replayed {
  /// The execution had already reached a terminal point; only its
  /// record (and possibly the terminal event) needs settling.
  Finished {
    status: ExecutionStatus,
    output: Option<Value>,
    error: Option<String>,
    /// The terminal event itself is missing from the log.
    needs_terminal_event: bool,
    last_state: String,
  },
  /// The execution stopped mid-flight and can be resumed.
  Resume {
    instance: ExecutionInstance,
    point: ResumePoint,
  },
}

pub(crate) fn replay(
  execution_id: &str,
  definition: Arc<WorkflowDefinition>,
  input: Value,
  events: &[ExecutionEvent],
) -> Replayed {
  let mut current_state = definition.start_at.clone();
  let mut context = input;
  let mut last_state = current_state.clone();
  let mut entered = false;
  let mut in_flight: Option<u32> = None;
  let mut scope_ended = false;

  for event in events {
    match &event.payload {
      EventPayload::StateEntered { input } => {
        current_state = event.state_name.clone();
        last_state = event.state_name.clone();
        context = input.clone();
        entered = true;
        in_flight = None;
        scope_ended = false;
      }
      EventPayload::TaskDispatched { attempt, .. } => {
        in_flight = Some(*attempt);
      }
      EventPayload::TaskCompleted { .. } | EventPayload::TaskFailed { .. } => {
        in_flight = None;
      }
      EventPayload::StateExited { output, next } => {
        context = output.clone();
        entered = false;
        in_flight = None;
        match next {
          Some(next) => current_state = next.clone(),
          None => scope_ended = true,
        }
      }
      EventPayload::ExecutionSucceeded { output } => {
        return Replayed::Finished {
          status: ExecutionStatus::Succeeded,
          output: Some(output.clone()),
          error: None,
          needs_terminal_event: false,
          last_state,
        };
      }
      EventPayload::ExecutionFailed { error } => {
        return Replayed::Finished {
          status: ExecutionStatus::Failed,
          output: None,
          error: Some(error.clone()),
          needs_terminal_event: false,
          last_state,
        };
      }
    }
  }

  if scope_ended {
    // The last state exited the scope but the terminal event never
    // made it to the log.
    return Replayed::Finished {
      status: ExecutionStatus::Succeeded,
      output: Some(context),
      error: None,
      needs_terminal_event: true,
      last_state,
    };
  }

  Replayed::Resume {
    instance: ExecutionInstance::at(execution_id, definition, &current_state, context),
    point: ResumePoint {
      entered,
      in_flight_attempt: in_flight.filter(|_| entered),
    },
  }
}
