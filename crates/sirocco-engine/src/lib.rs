//! Sirocco Engine
//!
//! The orchestration core: a state machine interpreter that drives
//! workflow executions one state at a time, dispatching Task states to
//! external executors through the trigger layer and recording every
//! step in the event log. Parallel and Map states fan out into child
//! executions coordinated by a shared cancellation tree; after a crash,
//! replaying an execution's events rebuilds its exact position and the
//! engine resumes it.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use serde_json::json;
//! # use sirocco_engine::{Engine, EngineConfig};
//! # use sirocco_event_log::MemoryEventStore;
//! # use sirocco_trigger::{CompletionRouter, LocalDispatcher};
//! # use sirocco_definition::WorkflowDefinition;
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let router = Arc::new(CompletionRouter::new());
//! let dispatcher = Arc::new(LocalDispatcher::new(router.clone()));
//! let engine = Engine::new(
//!   Arc::new(MemoryEventStore::new()),
//!   dispatcher,
//!   router,
//!   EngineConfig::default(),
//! );
//!
//! let definition = WorkflowDefinition::parse(r#"{
//!   "StartAt": "Hello",
//!   "States": { "Hello": { "Type": "Pass", "End": true } }
//! }"#)?;
//! let outcome = engine.start_execution(definition, json!({})).await?.wait().await;
//! # Ok(())
//! # }
//! ```

mod branch;
mod config;
mod engine;
mod error;
mod instance;
mod interpreter;
mod recovery;
mod registry;

pub use config::EngineConfig;
pub use engine::{Engine, ExecutionHandle};
pub use error::{ExecutionError, FAIL_ERROR, TIMEOUT_ERROR};
pub use instance::{ExecutionInstance, ExecutionOutcome};
pub use interpreter::{Interpreter, ResumePoint};
