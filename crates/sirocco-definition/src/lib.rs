//! Sirocco Definition
//!
//! This crate contains the serializable state-machine definition types
//! for Sirocco and the validator that turns raw definition text into a
//! typed, validated workflow graph.
//!
//! A definition is a JSON document in the familiar state-language
//! shape: a `StartAt` state name and a `States` map where each state
//! carries a `Type` (Task, Choice, Pass, Wait, Parallel, Map, Succeed,
//! Fail), data-shaping paths (`InputPath`, `ResultPath`, `Parameters`)
//! and a transition (`Next` or `End`). Parallel branches and Map
//! iterators are full nested definitions and validate recursively.
//!
//! Parsing is a pure function of the input text: no I/O, no runtime
//! state. Everything the interpreter needs at runtime is resolved and
//! checked here, so `DefinitionError` is surfaced at submission and
//! never during execution.

mod definition;
mod error;
mod state;
mod validate;

pub use definition::WorkflowDefinition;
pub use error::DefinitionError;
pub use state::{
  CATCH_ALL, CatchRule, ChoiceRule, Comparison, RetryPolicy, State, StateKind,
};
