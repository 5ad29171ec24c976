// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Task log append and incremental reads.
//!
//! `seq` assignment happens inside a single transaction on the single
//! writer thread, so concurrent appenders can never observe the same
//! `MAX(seq)` and the per-task sequence stays dense.

use conveyor_core::{ConveyorError, TaskLogEntry};
use rusqlite::params;

use crate::database::Database;

fn log_from_row(row: &rusqlite::Row<'_>) -> Result<TaskLogEntry, rusqlite::Error> {
    Ok(TaskLogEntry {
        task_id: row.get(0)?,
        seq: row.get(1)?,
        event_type: row.get(2)?,
        content: row.get(3)?,
        metadata: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Append a log entry, assigning the next dense sequence number.
///
/// Returns the assigned `seq`.
pub async fn append(
    db: &Database,
    task_id: &str,
    event_type: &str,
    content: &str,
    metadata: Option<String>,
    now: &str,
) -> Result<i64, ConveyorError> {
    let task_id = task_id.to_string();
    let event_type = event_type.to_string();
    let content = content.to_string();
    let now = now.to_string();
    db.call(move |conn| {
        let tx = conn.transaction()?;
        let seq: i64 = tx.query_row(
            "SELECT COALESCE(MAX(seq) + 1, 0) FROM task_logs WHERE task_id = ?1",
            params![task_id],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO task_logs (task_id, seq, event_type, content, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![task_id, seq, event_type, content, metadata, now],
        )?;
        tx.commit()?;
        Ok(seq)
    })
    .await
}

/// Read log entries with `seq > after_seq`, oldest first.
///
/// Pass `after_seq = -1` to read from the start.
pub async fn read(
    db: &Database,
    task_id: &str,
    after_seq: i64,
    limit: i64,
) -> Result<Vec<TaskLogEntry>, ConveyorError> {
    let task_id = task_id.to_string();
    db.call(move |conn| {
        let mut stmt = conn.prepare(
            "SELECT task_id, seq, event_type, content, metadata, created_at
             FROM task_logs WHERE task_id = ?1 AND seq > ?2
             ORDER BY seq ASC LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![task_id, after_seq, limit], log_from_row)?;
        rows.collect()
    })
    .await
}

/// Count all log entries for a task.
pub async fn count(db: &Database, task_id: &str) -> Result<i64, ConveyorError> {
    let task_id = task_id.to_string();
    db.call(move |conn| {
        conn.query_row(
            "SELECT COUNT(*) FROM task_logs WHERE task_id = ?1",
            params![task_id],
            |row| row.get(0),
        )
    })
    .await
}
