//! Path parsing, lookup and result merging.

use serde_json::Value;

use crate::error::PathError;

/// One step of a parsed path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
  Field(String),
  Index(usize),
}

/// Parse a path expression into segments. `$` alone yields no segments.
pub(crate) fn parse_path(path: &str) -> Result<Vec<Segment>, PathError> {
  let rest = path
    .strip_prefix('$')
    .ok_or_else(|| PathError::invalid(path, "must start with '$'"))?;

  let bytes = rest.as_bytes();
  let mut segments = Vec::new();
  let mut i = 0;

  while i < bytes.len() {
    match bytes[i] {
      b'.' => {
        i += 1;
        let start = i;
        while i < bytes.len() && bytes[i] != b'.' && bytes[i] != b'[' {
          i += 1;
        }
        if start == i {
          return Err(PathError::invalid(path, "empty field name"));
        }
        segments.push(Segment::Field(rest[start..i].to_string()));
      }
      b'[' => {
        i += 1;
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
          i += 1;
        }
        if start == i || i >= bytes.len() || bytes[i] != b']' {
          return Err(PathError::invalid(path, "malformed array index"));
        }
        let index: usize = rest[start..i]
          .parse()
          .map_err(|_| PathError::invalid(path, "array index out of range"))?;
        segments.push(Segment::Index(index));
        i += 1;
      }
      _ => return Err(PathError::invalid(path, "expected '.' or '['")),
    }
  }

  Ok(segments)
}

/// Resolve a path against a context, returning the referenced
/// sub-value. Fails with `PathError::NotFound` when any segment is
/// missing or addresses the wrong container type.
pub fn resolve(context: &Value, path: &str) -> Result<Value, PathError> {
  let mut current = context;

  for segment in parse_path(path)? {
    current = match (&segment, current) {
      (Segment::Field(name), Value::Object(map)) => {
        map.get(name).ok_or_else(|| PathError::not_found(path))?
      }
      (Segment::Index(index), Value::Array(items)) => {
        items.get(*index).ok_or_else(|| PathError::not_found(path))?
      }
      _ => return Err(PathError::not_found(path)),
    };
  }

  Ok(current.clone())
}

/// Narrow the context before a state runs. `None` keeps the whole
/// context.
pub fn apply_input_path(context: &Value, input_path: Option<&str>) -> Result<Value, PathError> {
  match input_path {
    Some(path) => resolve(context, path),
    None => Ok(context.clone()),
  }
}

/// Merge a state's result back into the context at `result_path`,
/// leaving sibling fields untouched. `None` (and `$`) replace the
/// context with the result. Intermediate objects are created as
/// needed; writing through an existing scalar is an error.
pub fn apply_result_path(
  context: &Value,
  result_path: Option<&str>,
  result: Value,
) -> Result<Value, PathError> {
  let Some(path) = result_path else {
    return Ok(result);
  };

  let segments = parse_path(path)?;
  if segments.is_empty() {
    return Ok(result);
  }

  let mut merged = context.clone();
  insert_at(&mut merged, &segments, result, path)?;
  Ok(merged)
}

fn insert_at(
  target: &mut Value,
  segments: &[Segment],
  result: Value,
  path: &str,
) -> Result<(), PathError> {
  let (head, tail) = segments
    .split_first()
    .expect("insert_at requires at least one segment");

  match head {
    Segment::Field(name) => {
      if target.is_null() {
        *target = Value::Object(serde_json::Map::new());
      }
      let map = target
        .as_object_mut()
        .ok_or_else(|| PathError::Unmergeable {
          path: path.to_string(),
        })?;
      if tail.is_empty() {
        map.insert(name.clone(), result);
      } else {
        let entry = map.entry(name.clone()).or_insert(Value::Null);
        insert_at(entry, tail, result, path)?;
      }
    }
    Segment::Index(index) => {
      let items = target.as_array_mut().ok_or_else(|| PathError::Unmergeable {
        path: path.to_string(),
      })?;
      let slot = items.get_mut(*index).ok_or_else(|| PathError::not_found(path))?;
      if tail.is_empty() {
        *slot = result;
      } else {
        insert_at(slot, tail, result, path)?;
      }
    }
  }

  Ok(())
}
