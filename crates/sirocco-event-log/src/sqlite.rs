//! SQLite-backed store.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::error::EventLogError;
use crate::store::EventStore;
use crate::types::{EventPayload, ExecutionEvent, ExecutionRecord, ExecutionStatus, NewEvent};

/// Durable `EventStore` over a SQLite database.
///
/// Sequence assignment reads `MAX(sequence) + 1` inside the insert
/// transaction; per-execution appends are already serialized by the
/// single interpreter task driving each execution, so concurrent
/// appends only ever target different executions.
pub struct SqliteEventStore {
  pool: SqlitePool,
}

impl SqliteEventStore {
  /// Create a store over an existing connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Open (creating if missing) the database at the given URL, e.g.
  /// `sqlite:///var/lib/sirocco/events.db`.
  pub async fn connect(url: &str) -> Result<Self, EventLogError> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    Ok(Self { pool })
  }

  /// Create the event log tables if they do not exist.
  pub async fn migrate(&self) -> Result<(), EventLogError> {
    sqlx::query(
      r#"
            CREATE TABLE IF NOT EXISTS executions (
                execution_id TEXT PRIMARY KEY,
                parent_id    TEXT,
                status       TEXT NOT NULL,
                started_at   TEXT NOT NULL,
                ended_at     TEXT,
                definition   TEXT,
                input        TEXT
            )
            "#,
    )
    .execute(&self.pool)
    .await?;

    sqlx::query(
      r#"
            CREATE TABLE IF NOT EXISTS execution_events (
                execution_id TEXT NOT NULL,
                sequence     INTEGER NOT NULL,
                timestamp    TEXT NOT NULL,
                state_name   TEXT NOT NULL,
                payload      TEXT NOT NULL,
                PRIMARY KEY (execution_id, sequence)
            )
            "#,
    )
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ExecutionRecord, EventLogError> {
    let status: String = row.get("status");
    Ok(ExecutionRecord {
      execution_id: row.get("execution_id"),
      parent_id: row.get("parent_id"),
      status: status.parse()?,
      started_at: row.get("started_at"),
      ended_at: row.get("ended_at"),
      definition: row.get("definition"),
      input: row.get("input"),
    })
  }
}

#[async_trait]
impl EventStore for SqliteEventStore {
  async fn append(&self, event: NewEvent) -> Result<ExecutionEvent, EventLogError> {
    let payload = serde_json::to_string(&event.payload)?;
    let timestamp = Utc::now();

    let mut tx = self.pool.begin().await?;
    let (sequence,): (i64,) = sqlx::query_as(
      "SELECT COALESCE(MAX(sequence) + 1, 0) FROM execution_events WHERE execution_id = ?",
    )
    .bind(&event.execution_id)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
      r#"
            INSERT INTO execution_events (execution_id, sequence, timestamp, state_name, payload)
            VALUES (?, ?, ?, ?, ?)
            "#,
    )
    .bind(&event.execution_id)
    .bind(sequence)
    .bind(timestamp)
    .bind(&event.state_name)
    .bind(&payload)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    Ok(ExecutionEvent {
      execution_id: event.execution_id,
      sequence,
      timestamp,
      state_name: event.state_name,
      payload: event.payload,
    })
  }

  async fn read_all(&self, execution_id: &str) -> Result<Vec<ExecutionEvent>, EventLogError> {
    let rows = sqlx::query(
      r#"
            SELECT execution_id, sequence, timestamp, state_name, payload
            FROM execution_events
            WHERE execution_id = ?
            ORDER BY sequence ASC
            "#,
    )
    .bind(execution_id)
    .fetch_all(&self.pool)
    .await?;

    rows
      .into_iter()
      .map(|row| {
        let payload: String = row.get("payload");
        let payload: EventPayload = serde_json::from_str(&payload)?;
        Ok(ExecutionEvent {
          execution_id: row.get("execution_id"),
          sequence: row.get("sequence"),
          timestamp: row.get::<DateTime<Utc>, _>("timestamp"),
          state_name: row.get("state_name"),
          payload,
        })
      })
      .collect()
  }

  async fn put_execution(&self, record: &ExecutionRecord) -> Result<(), EventLogError> {
    sqlx::query(
      r#"
            INSERT OR REPLACE INTO executions
                (execution_id, parent_id, status, started_at, ended_at, definition, input)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
    )
    .bind(&record.execution_id)
    .bind(&record.parent_id)
    .bind(record.status.as_str())
    .bind(record.started_at)
    .bind(record.ended_at)
    .bind(&record.definition)
    .bind(&record.input)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn get_execution(&self, execution_id: &str) -> Result<ExecutionRecord, EventLogError> {
    let row = sqlx::query(
      r#"
            SELECT execution_id, parent_id, status, started_at, ended_at, definition, input
            FROM executions
            WHERE execution_id = ?
            "#,
    )
    .bind(execution_id)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| EventLogError::ExecutionNotFound(execution_id.to_string()))?;

    Self::record_from_row(&row)
  }

  async fn set_status(
    &self,
    execution_id: &str,
    status: ExecutionStatus,
    ended_at: Option<DateTime<Utc>>,
  ) -> Result<(), EventLogError> {
    let result = sqlx::query(
      r#"
            UPDATE executions
            SET status = ?, ended_at = ?
            WHERE execution_id = ?
            "#,
    )
    .bind(status.as_str())
    .bind(ended_at)
    .bind(execution_id)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      return Err(EventLogError::ExecutionNotFound(execution_id.to_string()));
    }
    Ok(())
  }

  async fn list_open_executions(&self) -> Result<Vec<ExecutionRecord>, EventLogError> {
    let rows = sqlx::query(
      r#"
            SELECT execution_id, parent_id, status, started_at, ended_at, definition, input
            FROM executions
            WHERE status = ?
            ORDER BY started_at ASC
            "#,
    )
    .bind(ExecutionStatus::Running.as_str())
    .fetch_all(&self.pool)
    .await?;

    rows.iter().map(Self::record_from_row).collect()
  }

  async fn list_children(&self, parent_id: &str) -> Result<Vec<ExecutionRecord>, EventLogError> {
    let rows = sqlx::query(
      r#"
            SELECT execution_id, parent_id, status, started_at, ended_at, definition, input
            FROM executions
            WHERE parent_id = ?
            ORDER BY execution_id ASC
            "#,
    )
    .bind(parent_id)
    .fetch_all(&self.pool)
    .await?;

    rows.iter().map(Self::record_from_row).collect()
  }
}
