use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::EventLogError;
use crate::types::{ExecutionEvent, ExecutionRecord, ExecutionStatus, NewEvent};

/// Storage for execution events and status rows.
///
/// `append` must be durable before returning and must serialize
/// sequence assignment per execution; events of different executions
/// may interleave freely at the storage level.
#[async_trait]
pub trait EventStore: Send + Sync {
  /// Append an event, assigning the next sequence number for its
  /// execution.
  async fn append(&self, event: NewEvent) -> Result<ExecutionEvent, EventLogError>;

  /// Read an execution's full history in strict sequence order.
  async fn read_all(&self, execution_id: &str) -> Result<Vec<ExecutionEvent>, EventLogError>;

  /// Create or replace an execution record.
  async fn put_execution(&self, record: &ExecutionRecord) -> Result<(), EventLogError>;

  /// Fetch an execution record by id.
  async fn get_execution(&self, execution_id: &str) -> Result<ExecutionRecord, EventLogError>;

  /// Update an execution's status.
  async fn set_status(
    &self,
    execution_id: &str,
    status: ExecutionStatus,
    ended_at: Option<DateTime<Utc>>,
  ) -> Result<(), EventLogError>;

  /// All executions not yet in a terminal status, oldest first.
  async fn list_open_executions(&self) -> Result<Vec<ExecutionRecord>, EventLogError>;

  /// Direct child executions of the given parent, ordered by id.
  async fn list_children(&self, parent_id: &str) -> Result<Vec<ExecutionRecord>, EventLogError>;
}
