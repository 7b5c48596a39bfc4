//! In-memory store for tests and ephemeral runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::EventLogError;
use crate::store::EventStore;
use crate::types::{ExecutionEvent, ExecutionRecord, ExecutionStatus, NewEvent};

#[derive(Default)]
struct Inner {
  events: HashMap<String, Vec<ExecutionEvent>>,
  executions: HashMap<String, ExecutionRecord>,
}

/// Non-durable `EventStore` holding everything in process memory.
#[derive(Default)]
pub struct MemoryEventStore {
  inner: Mutex<Inner>,
}

impl MemoryEventStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
    // A panic while holding this lock is already fatal to the run.
    self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}

#[async_trait]
impl EventStore for MemoryEventStore {
  async fn append(&self, event: NewEvent) -> Result<ExecutionEvent, EventLogError> {
    let mut inner = self.lock();
    let events = inner.events.entry(event.execution_id.clone()).or_default();
    let recorded = ExecutionEvent {
      execution_id: event.execution_id,
      sequence: events.len() as i64,
      timestamp: Utc::now(),
      state_name: event.state_name,
      payload: event.payload,
    };
    events.push(recorded.clone());
    Ok(recorded)
  }

  async fn read_all(&self, execution_id: &str) -> Result<Vec<ExecutionEvent>, EventLogError> {
    Ok(
      self
        .lock()
        .events
        .get(execution_id)
        .cloned()
        .unwrap_or_default(),
    )
  }

  async fn put_execution(&self, record: &ExecutionRecord) -> Result<(), EventLogError> {
    self
      .lock()
      .executions
      .insert(record.execution_id.clone(), record.clone());
    Ok(())
  }

  async fn get_execution(&self, execution_id: &str) -> Result<ExecutionRecord, EventLogError> {
    self
      .lock()
      .executions
      .get(execution_id)
      .cloned()
      .ok_or_else(|| EventLogError::ExecutionNotFound(execution_id.to_string()))
  }

  async fn set_status(
    &self,
    execution_id: &str,
    status: ExecutionStatus,
    ended_at: Option<DateTime<Utc>>,
  ) -> Result<(), EventLogError> {
    let mut inner = self.lock();
    let record = inner
      .executions
      .get_mut(execution_id)
      .ok_or_else(|| EventLogError::ExecutionNotFound(execution_id.to_string()))?;
    record.status = status;
    record.ended_at = ended_at;
    Ok(())
  }

  async fn list_open_executions(&self) -> Result<Vec<ExecutionRecord>, EventLogError> {
    let mut open: Vec<ExecutionRecord> = self
      .lock()
      .executions
      .values()
      .filter(|record| !record.status.is_terminal())
      .cloned()
      .collect();
    open.sort_by(|a, b| a.started_at.cmp(&b.started_at));
    Ok(open)
  }

  async fn list_children(&self, parent_id: &str) -> Result<Vec<ExecutionRecord>, EventLogError> {
    let mut children: Vec<ExecutionRecord> = self
      .lock()
      .executions
      .values()
      .filter(|record| record.parent_id.as_deref() == Some(parent_id))
      .cloned()
      .collect();
    children.sort_by(|a, b| a.execution_id.cmp(&b.execution_id));
    Ok(children)
  }
}
