use serde::{Deserialize, Serialize};

use crate::definition::WorkflowDefinition;

/// Wildcard error name that matches any failure in a catch rule.
pub const CATCH_ALL: &str = "States.ALL";

/// One named step in a workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
  #[serde(flatten)]
  pub kind: StateKind,

  #[serde(rename = "Comment", default, skip_serializing_if = "Option::is_none")]
  pub comment: Option<String>,

  /// Narrows the data context before the state runs.
  #[serde(rename = "InputPath", default, skip_serializing_if = "Option::is_none")]
  pub input_path: Option<String>,

  /// Where the state's output is merged back into the context.
  #[serde(rename = "ResultPath", default, skip_serializing_if = "Option::is_none")]
  pub result_path: Option<String>,

  #[serde(rename = "Next", default, skip_serializing_if = "Option::is_none")]
  pub next: Option<String>,

  #[serde(rename = "End", default)]
  pub end: bool,
}

impl State {
  /// Whether this state ends its scope.
  pub fn is_terminal(&self) -> bool {
    self.end || matches!(self.kind, StateKind::Succeed | StateKind::Fail { .. })
  }

  /// Catch rules for state types that support local error recovery.
  pub fn catch_rules(&self) -> &[CatchRule] {
    match &self.kind {
      StateKind::Task { catch, .. }
      | StateKind::Parallel { catch, .. }
      | StateKind::Map { catch, .. } => catch,
      _ => &[],
    }
  }
}

/// Type-specific fields, tagged by the definition's `Type` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Type", rename_all_fields = "PascalCase")]
pub enum StateKind {
  /// Dispatches work to an external executor and suspends until the
  /// matching completion event arrives.
  Task {
    /// Executor identifier, opaque to the engine.
    resource: String,
    /// Parameter template; keys ending in `.$` are path substitutions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parameters: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    retry: Option<RetryPolicy>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    catch: Vec<CatchRule>,
  },

  /// Ordered rule evaluation; the first matching rule's `Next` wins.
  Choice {
    choices: Vec<ChoiceRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<String>,
  },

  /// Pure data shaping: merges an optional literal result and moves on.
  Pass {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,
  },

  /// Suspends the execution for a fixed or computed duration.
  Wait {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    seconds_path: Option<String>,
  },

  /// Runs every branch concurrently against a copy of the context.
  Parallel {
    branches: Vec<WorkflowDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    catch: Vec<CatchRule>,
  },

  /// Runs the iterator definition once per element of `ItemsPath`.
  Map {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    items_path: Option<String>,
    iterator: Box<WorkflowDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_concurrency: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    catch: Vec<CatchRule>,
  },

  Succeed,

  Fail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cause: Option<String>,
  },
}

/// Bounded exponential backoff applied to failed Task attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RetryPolicy {
  #[serde(default = "default_interval_seconds")]
  pub interval_seconds: u64,
  #[serde(default = "default_max_attempts")]
  pub max_attempts: u32,
  #[serde(default = "default_backoff_rate")]
  pub backoff_rate: f64,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      interval_seconds: default_interval_seconds(),
      max_attempts: default_max_attempts(),
      backoff_rate: default_backoff_rate(),
    }
  }
}

fn default_interval_seconds() -> u64 {
  1
}

fn default_max_attempts() -> u32 {
  3
}

fn default_backoff_rate() -> f64 {
  2.0
}

/// Redirects a failed state to an alternate transition when the error
/// name matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CatchRule {
  pub error_equals: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub result_path: Option<String>,
  pub next: String,
}

impl CatchRule {
  /// Whether this rule catches the given error name.
  pub fn matches(&self, error_name: &str) -> bool {
    self
      .error_equals
      .iter()
      .any(|name| name == CATCH_ALL || name == error_name)
  }
}

/// One rule of a Choice state: a path, a comparison and a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChoiceRule {
  pub variable: String,
  #[serde(flatten)]
  pub comparison: Comparison,
  pub next: String,
}

/// Comparison operators, keyed by operator name in the definition JSON
/// (`{"Variable": "$.n", "NumericLessThan": 0, "Next": "Negative"}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Comparison {
  NumericEquals(f64),
  NumericLessThan(f64),
  NumericGreaterThan(f64),
  NumericLessThanEquals(f64),
  NumericGreaterThanEquals(f64),
  StringEquals(String),
  BooleanEquals(bool),
}

impl Comparison {
  /// Evaluate this comparison against a resolved value. Type mismatch
  /// is not an error; the rule simply does not match.
  pub fn evaluate(&self, value: &serde_json::Value) -> bool {
    match self {
      Comparison::NumericEquals(expected) => value.as_f64().is_some_and(|n| n == *expected),
      Comparison::NumericLessThan(expected) => value.as_f64().is_some_and(|n| n < *expected),
      Comparison::NumericGreaterThan(expected) => value.as_f64().is_some_and(|n| n > *expected),
      Comparison::NumericLessThanEquals(expected) => value.as_f64().is_some_and(|n| n <= *expected),
      Comparison::NumericGreaterThanEquals(expected) => {
        value.as_f64().is_some_and(|n| n >= *expected)
      }
      Comparison::StringEquals(expected) => value.as_str() == Some(expected.as_str()),
      Comparison::BooleanEquals(expected) => value.as_bool() == Some(*expected),
    }
  }
}
