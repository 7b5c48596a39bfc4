//! Sirocco Event Log
//!
//! Append-only, replayable history of execution events. The log is the
//! source of truth for an execution: the interpreter's in-memory state
//! is a cache of its content, and the recovery manager rebuilds that
//! state by folding events in sequence order after a restart.
//!
//! The [`EventStore`] trait defines:
//! - durable, per-execution-sequenced event appends
//! - ordered reads of a full execution history
//! - execution status bookkeeping (used by the query surface and to
//!   find interrupted executions at startup)
//!
//! Two implementations are provided: [`MemoryEventStore`] for tests
//! and ephemeral runs, and [`SqliteEventStore`] for durable storage.

mod error;
mod memory;
mod sqlite;
mod store;
mod types;

pub use error::EventLogError;
pub use memory::MemoryEventStore;
pub use sqlite::SqliteEventStore;
pub use store::EventStore;
pub use types::{EventPayload, ExecutionEvent, ExecutionRecord, ExecutionStatus, NewEvent};
