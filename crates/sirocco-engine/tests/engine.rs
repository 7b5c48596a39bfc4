//! Integration tests for the interpreter, driven end to end through
//! the engine with an in-memory store and local executors.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use sirocco_definition::WorkflowDefinition;
use sirocco_engine::{Engine, EngineConfig};
use sirocco_event_log::{EventPayload, ExecutionStatus, MemoryEventStore};
use sirocco_trigger::{CompletionRouter, LocalDispatcher};

struct Harness {
  engine: Engine,
  dispatcher: Arc<LocalDispatcher>,
}

fn init_tracing() {
  static INIT: std::sync::Once = std::sync::Once::new();
  INIT.call_once(|| {
    let _ = tracing_subscriber::fmt()
      .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
      .with_test_writer()
      .try_init();
  });
}

fn harness() -> Harness {
  harness_with(EngineConfig::default())
}

fn harness_with(config: EngineConfig) -> Harness {
  init_tracing();
  let router = Arc::new(CompletionRouter::new());
  let dispatcher = Arc::new(LocalDispatcher::new(router.clone()));
  let store = Arc::new(MemoryEventStore::new());
  let engine = Engine::new(store, dispatcher.clone(), router, config);
  Harness { engine, dispatcher }
}

fn definition(value: Value) -> WorkflowDefinition {
  WorkflowDefinition::parse(&value.to_string()).unwrap()
}

#[tokio::test]
async fn test_linear_workflow_records_deterministic_history() {
  let harness = harness();
  harness
    .dispatcher
    .register("fn:double", |input: Value| async move {
      let n = input["n"].as_i64().ok_or("missing n")?;
      Ok(json!(n * 2))
    })
    .await;

  let workflow = definition(json!({
    "StartAt": "Double",
    "States": {
      "Double": {
        "Type": "Task",
        "Resource": "fn:double",
        "ResultPath": "$.doubled",
        "Next": "Done"
      },
      "Done": {"Type": "Succeed"}
    }
  }));

  let handle = harness.engine.start_execution(workflow, json!({"n": 21})).await.unwrap();
  let execution_id = handle.execution_id().to_string();
  let outcome = handle.wait().await;

  assert_eq!(outcome.status, ExecutionStatus::Succeeded);
  assert_eq!(outcome.output, Some(json!({"n": 21, "doubled": 42})));

  let events = harness.engine.history(&execution_id).await.unwrap();
  let kinds: Vec<&str> = events
    .iter()
    .map(|event| match &event.payload {
      EventPayload::StateEntered { .. } => "entered",
      EventPayload::TaskDispatched { .. } => "dispatched",
      EventPayload::TaskCompleted { .. } => "completed",
      EventPayload::TaskFailed { .. } => "failed",
      EventPayload::StateExited { .. } => "exited",
      EventPayload::ExecutionSucceeded { .. } => "succeeded",
      EventPayload::ExecutionFailed { .. } => "exec_failed",
    })
    .collect();
  assert_eq!(
    kinds,
    vec!["entered", "dispatched", "completed", "exited", "entered", "exited", "succeeded"]
  );
  for (index, event) in events.iter().enumerate() {
    assert_eq!(event.sequence, index as i64);
  }

  let record = harness.engine.status(&execution_id).await.unwrap();
  assert_eq!(record.status, ExecutionStatus::Succeeded);
  assert!(record.ended_at.is_some());
  assert_eq!(
    harness.engine.data_context(&execution_id).await.unwrap(),
    json!({"n": 21, "doubled": 42})
  );
}

#[tokio::test]
async fn test_choice_takes_first_matching_rule() {
  let harness = harness();

  // Both rules match n = 5; rule order decides.
  let workflow = definition(json!({
    "StartAt": "Decide",
    "States": {
      "Decide": {
        "Type": "Choice",
        "Choices": [
          {"Variable": "$.n", "NumericGreaterThan": 0, "Next": "First"},
          {"Variable": "$.n", "NumericGreaterThan": -10, "Next": "Second"}
        ],
        "Default": "Second"
      },
      "First": {"Type": "Pass", "Result": "first", "ResultPath": "$.took", "End": true},
      "Second": {"Type": "Pass", "Result": "second", "ResultPath": "$.took", "End": true}
    }
  }));

  let outcome = harness
    .engine
    .start_execution(workflow, json!({"n": 5}))
    .await
    .unwrap()
    .wait()
    .await;

  assert_eq!(outcome.status, ExecutionStatus::Succeeded);
  assert_eq!(outcome.output, Some(json!({"n": 5, "took": "first"})));
}

#[tokio::test]
async fn test_choice_without_match_or_default_fails() {
  let harness = harness();

  let workflow = definition(json!({
    "StartAt": "Decide",
    "States": {
      "Decide": {
        "Type": "Choice",
        "Choices": [{"Variable": "$.n", "NumericLessThan": 0, "Next": "Done"}]
      },
      "Done": {"Type": "Succeed"}
    }
  }));

  let outcome = harness
    .engine
    .start_execution(workflow, json!({"n": 5}))
    .await
    .unwrap()
    .wait()
    .await;

  assert_eq!(outcome.status, ExecutionStatus::Failed);
  assert!(outcome.error.unwrap().contains("no choice rule matched"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_map_preserves_item_order_despite_completion_order() {
  let harness = harness();
  harness
    .dispatcher
    .register("fn:add100", |input: Value| async move {
      let n = input.as_i64().ok_or("not a number")?;
      // Later items finish first.
      tokio::time::sleep(Duration::from_millis(300 - 100 * n as u64)).await;
      Ok(json!(n + 100))
    })
    .await;

  let workflow = definition(json!({
    "StartAt": "AddAll",
    "States": {
      "AddAll": {
        "Type": "Map",
        "ItemsPath": "$.items",
        "Iterator": {
          "StartAt": "Add",
          "States": {"Add": {"Type": "Task", "Resource": "fn:add100", "End": true}}
        },
        "ResultPath": "$.sums",
        "End": true
      }
    }
  }));

  let outcome = harness
    .engine
    .start_execution(workflow, json!({"items": [1, 2, 3]}))
    .await
    .unwrap()
    .wait()
    .await;

  assert_eq!(outcome.status, ExecutionStatus::Succeeded);
  assert_eq!(
    outcome.output,
    Some(json!({"items": [1, 2, 3], "sums": [101, 102, 103]}))
  );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_map_respects_max_concurrency() {
  let harness = harness();
  let in_flight = Arc::new(AtomicUsize::new(0));
  let peak = Arc::new(AtomicUsize::new(0));

  let gauge = in_flight.clone();
  let high_water = peak.clone();
  harness
    .dispatcher
    .register("fn:slot", move |input: Value| {
      let gauge = gauge.clone();
      let high_water = high_water.clone();
      async move {
        let now = gauge.fetch_add(1, Ordering::SeqCst) + 1;
        high_water.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        gauge.fetch_sub(1, Ordering::SeqCst);
        Ok(input)
      }
    })
    .await;

  let workflow = definition(json!({
    "StartAt": "OneByOne",
    "States": {
      "OneByOne": {
        "Type": "Map",
        "Iterator": {
          "StartAt": "Slot",
          "States": {"Slot": {"Type": "Task", "Resource": "fn:slot", "End": true}}
        },
        "MaxConcurrency": 1,
        "End": true
      }
    }
  }));

  let outcome = harness
    .engine
    .start_execution(workflow, json!([1, 2, 3]))
    .await
    .unwrap()
    .wait()
    .await;

  assert_eq!(outcome.status, ExecutionStatus::Succeeded);
  assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_parallel_failure_cancels_siblings() {
  let harness = harness();
  harness
    .dispatcher
    .register("fn:boom", |_: Value| async move { Err::<Value, _>("kaput".to_string()) })
    .await;

  let workflow = definition(json!({
    "StartAt": "Fanout",
    "States": {
      "Fanout": {
        "Type": "Parallel",
        "Branches": [
          {
            "StartAt": "Linger",
            "States": {"Linger": {"Type": "Wait", "Seconds": 3600, "End": true}}
          },
          {
            "StartAt": "Boom",
            "States": {"Boom": {"Type": "Task", "Resource": "fn:boom", "End": true}}
          }
        ],
        "End": true
      }
    }
  }));

  let handle = harness.engine.start_execution(workflow, json!({})).await.unwrap();
  let execution_id = handle.execution_id().to_string();
  let outcome = handle.wait().await;

  assert_eq!(outcome.status, ExecutionStatus::Failed);
  let message = outcome.error.unwrap();
  assert!(message.contains("branch 1"), "unexpected error: {message}");
  assert!(message.contains("kaput"), "unexpected error: {message}");

  // The waiting sibling was cancelled, not failed.
  let children = harness.engine.children(&execution_id).await.unwrap();
  assert_eq!(children.len(), 2);
  let linger = children
    .iter()
    .find(|c| c.execution_id.contains("Fanout[0]"))
    .unwrap();
  assert_eq!(linger.status, ExecutionStatus::Aborted);
  let boom = children
    .iter()
    .find(|c| c.execution_id.contains("Fanout[1]"))
    .unwrap();
  assert_eq!(boom.status, ExecutionStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_retry_until_success_with_backoff() {
  let harness = harness();
  let calls = Arc::new(AtomicUsize::new(0));
  let counter = calls.clone();
  harness
    .dispatcher
    .register("fn:flaky", move |_: Value| {
      let counter = counter.clone();
      async move {
        if counter.fetch_add(1, Ordering::SeqCst) < 2 {
          Err("transient".to_string())
        } else {
          Ok(json!("finally"))
        }
      }
    })
    .await;

  let workflow = definition(json!({
    "StartAt": "Flaky",
    "States": {
      "Flaky": {
        "Type": "Task",
        "Resource": "fn:flaky",
        "Retry": {"IntervalSeconds": 1, "MaxAttempts": 3, "BackoffRate": 2.0},
        "ResultPath": "$.result",
        "End": true
      }
    }
  }));

  let handle = harness.engine.start_execution(workflow, json!({})).await.unwrap();
  let execution_id = handle.execution_id().to_string();
  let outcome = handle.wait().await;

  assert_eq!(outcome.status, ExecutionStatus::Succeeded);
  assert_eq!(outcome.output, Some(json!({"result": "finally"})));
  assert_eq!(calls.load(Ordering::SeqCst), 3);

  let events = harness.engine.history(&execution_id).await.unwrap();
  let failed_attempts: Vec<u32> = events
    .iter()
    .filter_map(|event| match &event.payload {
      EventPayload::TaskFailed { attempt, .. } => Some(*attempt),
      _ => None,
    })
    .collect();
  assert_eq!(failed_attempts, vec![0, 1]);
  assert!(events.iter().any(|event| matches!(
    &event.payload,
    EventPayload::TaskCompleted { attempt: 2, .. }
  )));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_fall_through_to_catch() {
  let harness = harness();
  harness
    .dispatcher
    .register("fn:doomed", |_: Value| async move { Err::<Value, _>("Boom".to_string()) })
    .await;

  let workflow = definition(json!({
    "StartAt": "Doomed",
    "States": {
      "Doomed": {
        "Type": "Task",
        "Resource": "fn:doomed",
        "Retry": {"IntervalSeconds": 1, "MaxAttempts": 2},
        "Catch": [
          {"ErrorEquals": ["States.ALL"], "ResultPath": "$.failure", "Next": "Recover"}
        ],
        "End": true
      },
      "Recover": {"Type": "Pass", "Result": true, "ResultPath": "$.recovered", "End": true}
    }
  }));

  let outcome = harness
    .engine
    .start_execution(workflow, json!({"n": 1}))
    .await
    .unwrap()
    .wait()
    .await;

  assert_eq!(outcome.status, ExecutionStatus::Succeeded);
  let output = outcome.output.unwrap();
  assert_eq!(output["n"], json!(1));
  assert_eq!(output["failure"]["Error"], json!("Boom"));
  assert_eq!(output["recovered"], json!(true));
}

#[tokio::test(start_paused = true)]
async fn test_task_timeout_is_catchable_by_name() {
  let harness = harness();
  harness
    .dispatcher
    .register("fn:stuck", |_: Value| async move {
      tokio::time::sleep(Duration::from_secs(3600)).await;
      Ok(json!("too late"))
    })
    .await;

  let workflow = definition(json!({
    "StartAt": "Stuck",
    "States": {
      "Stuck": {
        "Type": "Task",
        "Resource": "fn:stuck",
        "TimeoutSeconds": 2,
        "Catch": [
          {"ErrorEquals": ["States.Timeout"], "ResultPath": "$.failure", "Next": "TimedOut"}
        ],
        "End": true
      },
      "TimedOut": {"Type": "Pass", "Result": "timed out", "ResultPath": "$.note", "End": true}
    }
  }));

  let outcome = harness
    .engine
    .start_execution(workflow, json!({}))
    .await
    .unwrap()
    .wait()
    .await;

  assert_eq!(outcome.status, ExecutionStatus::Succeeded);
  let output = outcome.output.unwrap();
  assert_eq!(output["failure"]["Error"], json!("States.Timeout"));
  assert_eq!(output["note"], json!("timed out"));
}

#[tokio::test(start_paused = true)]
async fn test_wait_honors_seconds_path() {
  let harness = harness();

  let workflow = definition(json!({
    "StartAt": "Hold",
    "States": {
      "Hold": {"Type": "Wait", "SecondsPath": "$.delay", "Next": "Done"},
      "Done": {"Type": "Succeed"}
    }
  }));

  let started = tokio::time::Instant::now();
  let outcome = harness
    .engine
    .start_execution(workflow, json!({"delay": 5}))
    .await
    .unwrap()
    .wait()
    .await;

  assert_eq!(outcome.status, ExecutionStatus::Succeeded);
  assert!(started.elapsed() >= Duration::from_secs(5));
}

#[tokio::test]
async fn test_abort_settles_execution_as_aborted() {
  let harness = harness();
  harness
    .dispatcher
    .register("fn:forever", |_: Value| async move {
      std::future::pending::<()>().await;
      Ok(json!(null))
    })
    .await;

  let workflow = definition(json!({
    "StartAt": "Forever",
    "States": {
      "Forever": {"Type": "Task", "Resource": "fn:forever", "End": true}
    }
  }));

  let handle = harness.engine.start_execution(workflow, json!({})).await.unwrap();
  let execution_id = handle.execution_id().to_string();
  assert_eq!(harness.engine.running_count(), 1);

  handle.abort();
  let outcome = handle.wait().await;

  assert_eq!(outcome.status, ExecutionStatus::Aborted);
  assert_eq!(harness.engine.running_count(), 0);
  let record = harness.engine.status(&execution_id).await.unwrap();
  assert_eq!(record.status, ExecutionStatus::Aborted);
}

#[tokio::test]
async fn test_fail_state_reports_error_and_cause() {
  let harness = harness();

  let workflow = definition(json!({
    "StartAt": "Decide",
    "States": {
      "Decide": {
        "Type": "Choice",
        "Choices": [{"Variable": "$.ok", "BooleanEquals": true, "Next": "Done"}],
        "Default": "GiveUp"
      },
      "Done": {"Type": "Succeed"},
      "GiveUp": {"Type": "Fail", "Error": "NotOk", "Cause": "input rejected"}
    }
  }));

  let outcome = harness
    .engine
    .start_execution(workflow, json!({"ok": false}))
    .await
    .unwrap()
    .wait()
    .await;

  assert_eq!(outcome.status, ExecutionStatus::Failed);
  assert!(outcome.error.unwrap().contains("NotOk"));
}

#[tokio::test]
async fn test_invalid_definition_is_rejected_at_submission() {
  let harness = harness();

  let workflow: WorkflowDefinition = serde_json::from_str(
    &json!({
      "StartAt": "Missing",
      "States": {"Other": {"Type": "Succeed"}}
    })
    .to_string(),
  )
  .unwrap();

  let submitted = harness.engine.start_execution(workflow, json!({})).await;
  assert!(submitted.is_err());
  assert_eq!(harness.engine.running_count(), 0);
}

#[tokio::test]
async fn test_nested_depth_limit_is_enforced() {
  let harness = harness_with(EngineConfig {
    max_branch_depth: 1,
    ..EngineConfig::default()
  });

  let workflow = definition(json!({
    "StartAt": "Outer",
    "States": {
      "Outer": {
        "Type": "Parallel",
        "Branches": [{
          "StartAt": "Inner",
          "States": {
            "Inner": {
              "Type": "Parallel",
              "Branches": [{
                "StartAt": "Leaf",
                "States": {"Leaf": {"Type": "Succeed"}}
              }],
              "End": true
            }
          }
        }],
        "End": true
      }
    }
  }));

  let outcome = harness
    .engine
    .start_execution(workflow, json!({}))
    .await
    .unwrap()
    .wait()
    .await;

  assert_eq!(outcome.status, ExecutionStatus::Failed);
  assert!(outcome.error.unwrap().contains("nesting depth"));
}
