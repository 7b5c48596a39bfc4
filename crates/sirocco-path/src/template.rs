//! Parameter templating.
//!
//! A parameter template is an ordinary JSON value. Object keys ending
//! in the reserved `.$` suffix mark path substitutions: the key's
//! string value is resolved against the current context and the result
//! is stored under the key without the suffix. Every other literal
//! passes through unchanged.

use serde_json::Value;

use crate::error::PathError;
use crate::resolve::resolve;

/// Suffix marking a template key as a path substitution.
const PATH_SUFFIX: &str = ".$";

/// Resolve a parameter template against a context, producing the
/// payload handed to an external executor.
pub fn resolve_parameters(template: &Value, context: &Value) -> Result<Value, PathError> {
  match template {
    Value::Object(map) => {
      let mut resolved = serde_json::Map::with_capacity(map.len());
      for (key, value) in map {
        if let Some(name) = key.strip_suffix(PATH_SUFFIX) {
          let path = value.as_str().ok_or_else(|| PathError::InvalidParameter {
            key: key.clone(),
          })?;
          resolved.insert(name.to_string(), resolve(context, path)?);
        } else {
          resolved.insert(key.clone(), resolve_parameters(value, context)?);
        }
      }
      Ok(Value::Object(resolved))
    }
    Value::Array(items) => items
      .iter()
      .map(|item| resolve_parameters(item, context))
      .collect::<Result<Vec<_>, _>>()
      .map(Value::Array),
    other => Ok(other.clone()),
  }
}
