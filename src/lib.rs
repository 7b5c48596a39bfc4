//! Sirocco
//!
//! A trigger-based workflow orchestration engine. Workflows are JSON
//! state machine definitions (Task, Choice, Pass, Wait, Parallel, Map,
//! Succeed, Fail); the engine interprets them one state at a time,
//! dispatching Task states to external executors as trigger requests
//! and suspending until the matching completion arrives. Every step is
//! recorded in an event log, so an interrupted execution can be
//! replayed to its exact position and resumed.
//!
//! This crate is a facade over the workspace members:
//!
//! - [`definition`] — parsing and validation of workflow definitions
//! - [`path`] — path-based data context addressing
//! - [`event_log`] — event sourcing stores (in-memory and SQLite)
//! - [`trigger`] — trigger dispatch and completion routing
//! - [`engine`] — the interpreter, branch coordination and recovery

pub use sirocco_definition as definition;
pub use sirocco_engine as engine;
pub use sirocco_event_log as event_log;
pub use sirocco_path as path;
pub use sirocco_trigger as trigger;

pub use sirocco_definition::WorkflowDefinition;
pub use sirocco_engine::{Engine, EngineConfig, ExecutionOutcome};
pub use sirocco_event_log::{ExecutionStatus, MemoryEventStore, SqliteEventStore};
pub use sirocco_trigger::{CompletionRouter, LocalDispatcher};
