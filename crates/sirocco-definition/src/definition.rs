use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::DefinitionError;
use crate::state::State;
use crate::validate;

/// A validated state-machine definition.
///
/// Immutable once validated; the interpreter shares it by reference
/// across an execution and all of its Parallel/Map children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WorkflowDefinition {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub comment: Option<String>,
  pub start_at: String,
  pub states: HashMap<String, State>,
}

impl WorkflowDefinition {
  /// Parse and validate raw definition text.
  pub fn parse(text: &str) -> Result<Self, DefinitionError> {
    let definition: Self = serde_json::from_str(text)?;
    definition.validate()?;
    Ok(definition)
  }

  /// Validate the graph: every transition target exists in its scope,
  /// every state is reachable and can reach a terminal state, and each
  /// state type carries its required fields. Parallel branches and Map
  /// iterators are validated recursively.
  pub fn validate(&self) -> Result<(), DefinitionError> {
    validate::validate_scope(self)
  }

  /// Look up a state by name.
  pub fn get_state(&self, name: &str) -> Option<&State> {
    self.states.get(name)
  }
}
