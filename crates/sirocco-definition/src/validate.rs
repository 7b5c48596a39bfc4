//! Graph validation.
//!
//! Walks a definition scope once, confirming that every transition
//! target exists, that every state is reachable from the start state,
//! and that every state can reach a terminal state. Parallel branches
//! and Map iterators are independent scopes and are validated with the
//! same rules recursively.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::definition::WorkflowDefinition;
use crate::error::DefinitionError;
use crate::state::{State, StateKind};

pub(crate) fn validate_scope(definition: &WorkflowDefinition) -> Result<(), DefinitionError> {
  if definition.states.is_empty() {
    return Err(DefinitionError::EmptyStates);
  }
  if !definition.states.contains_key(&definition.start_at) {
    return Err(DefinitionError::UnknownStartAt(definition.start_at.clone()));
  }

  for (name, state) in &definition.states {
    validate_state(name, state)?;

    for target in transition_targets(state) {
      if !definition.states.contains_key(target) {
        return Err(DefinitionError::UnknownTarget {
          state: name.clone(),
          target: target.to_string(),
        });
      }
    }

    match &state.kind {
      StateKind::Parallel { branches, .. } => {
        for (index, branch) in branches.iter().enumerate() {
          validate_scope(branch).map_err(|source| DefinitionError::InvalidBranch {
            state: name.clone(),
            index,
            source: Box::new(source),
          })?;
        }
      }
      StateKind::Map { iterator, .. } => {
        validate_scope(iterator).map_err(|source| DefinitionError::InvalidIterator {
          state: name.clone(),
          source: Box::new(source),
        })?;
      }
      _ => {}
    }
  }

  // Sorted so the reported state is deterministic when several fail.
  let mut names: Vec<&String> = definition.states.keys().collect();
  names.sort();

  let reachable = reachable_from_start(definition);
  for name in &names {
    if !reachable.contains(name.as_str()) {
      return Err(DefinitionError::UnreachableState((*name).clone()));
    }
  }

  let closing = reaches_terminal(definition);
  for name in &names {
    if !closing.contains(name.as_str()) {
      return Err(DefinitionError::NoTerminalPath((*name).clone()));
    }
  }

  Ok(())
}

/// Per-state structural checks: required type fields and a coherent
/// transition (terminal xor `Next`).
fn validate_state(name: &str, state: &State) -> Result<(), DefinitionError> {
  if state.end && state.next.is_some() {
    return Err(DefinitionError::ConflictingTransition(name.to_string()));
  }

  match &state.kind {
    StateKind::Choice { choices, .. } => {
      if choices.is_empty() {
        return Err(DefinitionError::EmptyChoices(name.to_string()));
      }
    }
    StateKind::Wait {
      seconds,
      seconds_path,
    } => {
      if seconds.is_none() && seconds_path.is_none() {
        return Err(DefinitionError::MissingWaitDuration(name.to_string()));
      }
    }
    StateKind::Parallel { branches, .. } => {
      if branches.is_empty() {
        return Err(DefinitionError::EmptyBranches(name.to_string()));
      }
    }
    _ => {}
  }

  let needs_next = !state.is_terminal() && !matches!(state.kind, StateKind::Choice { .. });
  if needs_next && state.next.is_none() {
    return Err(DefinitionError::MissingTransition(name.to_string()));
  }

  Ok(())
}

/// All state names this state can transition to within its scope.
fn transition_targets(state: &State) -> Vec<&str> {
  let mut targets = Vec::new();
  if let Some(next) = &state.next {
    targets.push(next.as_str());
  }
  if let StateKind::Choice { choices, default } = &state.kind {
    for rule in choices {
      targets.push(rule.next.as_str());
    }
    if let Some(default) = default {
      targets.push(default.as_str());
    }
  }
  for rule in state.catch_rules() {
    targets.push(rule.next.as_str());
  }
  targets
}

fn reachable_from_start(definition: &WorkflowDefinition) -> HashSet<&str> {
  let mut reachable = HashSet::new();
  let mut queue = VecDeque::from([definition.start_at.as_str()]);

  while let Some(name) = queue.pop_front() {
    if !reachable.insert(name) {
      continue;
    }
    if let Some(state) = definition.states.get(name) {
      queue.extend(transition_targets(state));
    }
  }

  reachable
}

/// Reverse walk from the scope's terminal states: every state in the
/// returned set has at least one path that ends the scope.
fn reaches_terminal(definition: &WorkflowDefinition) -> HashSet<&str> {
  let mut incoming: HashMap<&str, Vec<&str>> = HashMap::new();
  let mut queue = VecDeque::new();

  for (name, state) in &definition.states {
    for target in transition_targets(state) {
      incoming.entry(target).or_default().push(name.as_str());
    }
    if state.is_terminal() {
      queue.push_back(name.as_str());
    }
  }

  let mut closing = HashSet::new();
  while let Some(name) = queue.pop_front() {
    if !closing.insert(name) {
      continue;
    }
    if let Some(upstream) = incoming.get(name) {
      queue.extend(upstream.iter().copied());
    }
  }

  closing
}

#[cfg(test)]
mod tests {
  use crate::definition::WorkflowDefinition;
  use crate::error::DefinitionError;
  use serde_json::json;

  fn parse(value: serde_json::Value) -> Result<WorkflowDefinition, DefinitionError> {
    WorkflowDefinition::parse(&value.to_string())
  }

  #[test]
  fn test_minimal_definition_validates() {
    let definition = parse(json!({
      "StartAt": "Done",
      "States": {
        "Done": { "Type": "Pass", "End": true }
      }
    }))
    .unwrap();

    assert_eq!(definition.start_at, "Done");
    assert!(definition.get_state("Done").unwrap().is_terminal());
  }

  #[test]
  fn test_unknown_next_target_rejected() {
    let err = parse(json!({
      "StartAt": "A",
      "States": {
        "A": { "Type": "Pass", "Next": "Missing" }
      }
    }))
    .unwrap_err();

    assert!(matches!(
      err,
      DefinitionError::UnknownTarget { state, target } if state == "A" && target == "Missing"
    ));
  }

  #[test]
  fn test_unknown_start_at_rejected() {
    let err = parse(json!({
      "StartAt": "Nope",
      "States": {
        "A": { "Type": "Succeed" }
      }
    }))
    .unwrap_err();

    assert!(matches!(err, DefinitionError::UnknownStartAt(name) if name == "Nope"));
  }

  #[test]
  fn test_unreachable_state_rejected() {
    let err = parse(json!({
      "StartAt": "A",
      "States": {
        "A": { "Type": "Pass", "End": true },
        "Orphan": { "Type": "Pass", "End": true }
      }
    }))
    .unwrap_err();

    assert!(matches!(err, DefinitionError::UnreachableState(name) if name == "Orphan"));
  }

  #[test]
  fn test_cycle_without_exit_rejected() {
    let err = parse(json!({
      "StartAt": "A",
      "States": {
        "A": { "Type": "Pass", "Next": "B" },
        "B": { "Type": "Pass", "Next": "A" }
      }
    }))
    .unwrap_err();

    assert!(matches!(err, DefinitionError::NoTerminalPath(_)));
  }

  #[test]
  fn test_cycle_with_exit_accepted() {
    // A retry loop through a Choice is fine as long as one rule leaves it.
    parse(json!({
      "StartAt": "Work",
      "States": {
        "Work": { "Type": "Pass", "Next": "Check" },
        "Check": {
          "Type": "Choice",
          "Choices": [
            { "Variable": "$.done", "BooleanEquals": true, "Next": "Finish" }
          ],
          "Default": "Work"
        },
        "Finish": { "Type": "Succeed" }
      }
    }))
    .unwrap();
  }

  #[test]
  fn test_missing_transition_rejected() {
    let err = parse(json!({
      "StartAt": "A",
      "States": {
        "A": { "Type": "Pass" }
      }
    }))
    .unwrap_err();

    assert!(matches!(err, DefinitionError::MissingTransition(name) if name == "A"));
  }

  #[test]
  fn test_end_and_next_conflict_rejected() {
    let err = parse(json!({
      "StartAt": "A",
      "States": {
        "A": { "Type": "Pass", "End": true, "Next": "A" }
      }
    }))
    .unwrap_err();

    assert!(matches!(err, DefinitionError::ConflictingTransition(name) if name == "A"));
  }

  #[test]
  fn test_wait_without_duration_rejected() {
    let err = parse(json!({
      "StartAt": "W",
      "States": {
        "W": { "Type": "Wait", "End": true }
      }
    }))
    .unwrap_err();

    assert!(matches!(err, DefinitionError::MissingWaitDuration(name) if name == "W"));
  }

  #[test]
  fn test_invalid_branch_names_parent_state() {
    let err = parse(json!({
      "StartAt": "P",
      "States": {
        "P": {
          "Type": "Parallel",
          "End": true,
          "Branches": [
            {
              "StartAt": "Inner",
              "States": {
                "Inner": { "Type": "Pass", "Next": "Missing" }
              }
            }
          ]
        }
      }
    }))
    .unwrap_err();

    match err {
      DefinitionError::InvalidBranch {
        state,
        index,
        source,
      } => {
        assert_eq!(state, "P");
        assert_eq!(index, 0);
        assert!(matches!(*source, DefinitionError::UnknownTarget { .. }));
      }
      other => panic!("expected InvalidBranch, got {other:?}"),
    }
  }

  #[test]
  fn test_nested_parallel_and_map_definition_validates() {
    // Mirrors a Pass -> Parallel[Map[Parallel], Choice] shape with
    // deeply nested scopes.
    parse(json!({
      "StartAt": "SetupParameters",
      "States": {
        "SetupParameters": {
          "Type": "Pass",
          "Result": 2,
          "ResultPath": "$.my_number",
          "Next": "Fan"
        },
        "Fan": {
          "Type": "Parallel",
          "End": true,
          "Branches": [
            {
              "StartAt": "Each",
              "States": {
                "Each": {
                  "Type": "Map",
                  "ItemsPath": "$.items",
                  "Iterator": {
                    "StartAt": "Both",
                    "States": {
                      "Both": {
                        "Type": "Parallel",
                        "End": true,
                        "Branches": [
                          {
                            "StartAt": "One",
                            "States": {
                              "One": { "Type": "Pass", "Next": "Two" },
                              "Two": { "Type": "Pass", "End": true }
                            }
                          },
                          {
                            "StartAt": "Only",
                            "States": {
                              "Only": { "Type": "Pass", "End": true }
                            }
                          }
                        ]
                      }
                    }
                  },
                  "Next": "Reduce"
                },
                "Reduce": { "Type": "Pass", "End": true }
              }
            },
            {
              "StartAt": "Branching",
              "States": {
                "Branching": {
                  "Type": "Choice",
                  "Choices": [
                    { "Variable": "$.my_number", "NumericEquals": 1, "Next": "Result1" },
                    { "Variable": "$.my_number", "NumericEquals": 2, "Next": "Result2" }
                  ]
                },
                "Result1": { "Type": "Pass", "End": true },
                "Result2": { "Type": "Pass", "End": true }
              }
            }
          ]
        }
      }
    }))
    .unwrap();
  }
}
