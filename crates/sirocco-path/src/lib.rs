//! Sirocco Path
//!
//! Path-based addressing over JSON-like data contexts: a small
//! JSONPath dialect (`$` root, `$.field.sub`, `$.items[0]`) plus the
//! three data-shaping operations the interpreter composes around every
//! state:
//!
//! - `apply_input_path` narrows the context before a state runs
//! - `apply_result_path` merges a state's output back into the context
//! - `resolve_parameters` substitutes `.$`-suffixed template keys with
//!   path lookups
//!
//! All operations are pure: they never mutate their input context and
//! always produce a new value, which is what keeps Parallel branches
//! isolated from each other. A missing path is always a
//! `PathError::NotFound`, never a silent default.

mod error;
mod resolve;
mod template;

pub use error::PathError;
pub use resolve::{apply_input_path, apply_result_path, resolve};
pub use template::resolve_parameters;
