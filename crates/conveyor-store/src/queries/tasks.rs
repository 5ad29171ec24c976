// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Task CRUD and guarded partial updates.

use std::str::FromStr;

use conveyor_core::{ConveyorError, Task, TaskStatus, TaskUpdate};
use rusqlite::{params, OptionalExtension};

use crate::database::Database;

const TASK_COLUMNS: &str = "id, session_id, channel_type, channel_meta, status, message, \
     skills, bridge_configs, push, result, structured_output, error, \
     cost_usd, turns, duration_ms, worker_id, created_at, started_at, finished_at";

fn json_err(idx: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn task_from_row(row: &rusqlite::Row<'_>) -> Result<Task, rusqlite::Error> {
    let channel_meta: String = row.get(3)?;
    let status: String = row.get(4)?;
    let skills: String = row.get(6)?;
    let bridge_configs: String = row.get(7)?;
    let push: Option<String> = row.get(8)?;
    let structured_output: Option<String> = row.get(10)?;

    Ok(Task {
        id: row.get(0)?,
        session_id: row.get(1)?,
        channel_type: row.get(2)?,
        channel_meta: serde_json::from_str(&channel_meta).map_err(|e| json_err(3, e))?,
        status: TaskStatus::from_str(&status).map_err(|e| json_err(4, e))?,
        message: row.get(5)?,
        skills: serde_json::from_str(&skills).map_err(|e| json_err(6, e))?,
        bridge_configs: serde_json::from_str(&bridge_configs).map_err(|e| json_err(7, e))?,
        push: push
            .map(|p| serde_json::from_str(&p))
            .transpose()
            .map_err(|e| json_err(8, e))?,
        result: row.get(9)?,
        structured_output: structured_output
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| json_err(10, e))?,
        error: row.get(11)?,
        cost_usd: row.get(12)?,
        turns: row.get(13)?,
        duration_ms: row.get(14)?,
        worker_id: row.get(15)?,
        created_at: row.get(16)?,
        started_at: row.get(17)?,
        finished_at: row.get(18)?,
    })
}

/// Insert a new task record.
pub async fn create_task(db: &Database, task: &Task) -> Result<(), ConveyorError> {
    let task = task.clone();
    db.call(move |conn| {
        let skills = serde_json::to_string(&task.skills).map_err(|e| json_err(6, e))?;
        let bridges =
            serde_json::to_string(&task.bridge_configs).map_err(|e| json_err(7, e))?;
        let push = task
            .push
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| json_err(8, e))?;
        conn.execute(
            "INSERT INTO tasks (id, session_id, channel_type, channel_meta, status, message,
                                skills, bridge_configs, push, worker_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                task.id,
                task.session_id,
                task.channel_type,
                task.channel_meta.to_string(),
                task.status.to_string(),
                task.message,
                skills,
                bridges,
                push,
                task.worker_id,
                task.created_at,
            ],
        )?;
        Ok(())
    })
    .await
}

/// Get a task by ID.
pub async fn get_task(db: &Database, id: &str) -> Result<Option<Task>, ConveyorError> {
    let id = id.to_string();
    db.call(move |conn| {
        conn.query_row(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
            params![id],
            task_from_row,
        )
        .optional()
    })
    .await
}

/// List a session's tasks, oldest first.
pub async fn list_by_session(db: &Database, session_id: &str) -> Result<Vec<Task>, ConveyorError> {
    let session_id = session_id.to_string();
    db.call(move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE session_id = ?1 ORDER BY created_at ASC"
        ))?;
        let rows = stmt.query_map(params![session_id], task_from_row)?;
        rows.collect()
    })
    .await
}

/// Apply a partial update to a task.
///
/// Returns `Ok(false)` without writing anything when the task is missing or
/// already terminal -- terminal records are immutable, which is what keeps a
/// late worker `done` from resurrecting a canceled task.
pub async fn update_task(
    db: &Database,
    id: &str,
    update: TaskUpdate,
) -> Result<bool, ConveyorError> {
    let id = id.to_string();
    db.call(move |conn| {
        let tx = conn.transaction()?;

        let current: Option<String> = tx
            .query_row(
                "SELECT status FROM tasks WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(current) = current else {
            return Ok(false);
        };
        let current = TaskStatus::from_str(&current).map_err(|e| json_err(0, e))?;
        if current.is_terminal() {
            return Ok(false);
        }

        if let Some(status) = update.status {
            tx.execute(
                "UPDATE tasks SET status = ?1 WHERE id = ?2",
                params![status.to_string(), id],
            )?;
        }
        if let Some(result) = update.result {
            tx.execute(
                "UPDATE tasks SET result = ?1 WHERE id = ?2",
                params![result, id],
            )?;
        }
        if let Some(output) = update.structured_output {
            tx.execute(
                "UPDATE tasks SET structured_output = ?1 WHERE id = ?2",
                params![output.to_string(), id],
            )?;
        }
        if let Some(error) = update.error {
            tx.execute(
                "UPDATE tasks SET error = ?1 WHERE id = ?2",
                params![error, id],
            )?;
        }
        if let Some(cost_usd) = update.cost_usd {
            tx.execute(
                "UPDATE tasks SET cost_usd = ?1 WHERE id = ?2",
                params![cost_usd, id],
            )?;
        }
        if let Some(turns) = update.turns {
            tx.execute(
                "UPDATE tasks SET turns = ?1 WHERE id = ?2",
                params![turns, id],
            )?;
        }
        if let Some(duration_ms) = update.duration_ms {
            tx.execute(
                "UPDATE tasks SET duration_ms = ?1 WHERE id = ?2",
                params![duration_ms, id],
            )?;
        }
        if let Some(worker_id) = update.worker_id {
            tx.execute(
                "UPDATE tasks SET worker_id = ?1 WHERE id = ?2",
                params![worker_id, id],
            )?;
        }
        if let Some(started_at) = update.started_at {
            // Set-once: started_at records when the task first left pending
            // and is never moved by later transitions.
            tx.execute(
                "UPDATE tasks SET started_at = COALESCE(started_at, ?1) WHERE id = ?2",
                params![started_at, id],
            )?;
        }
        if let Some(finished_at) = update.finished_at {
            tx.execute(
                "UPDATE tasks SET finished_at = ?1 WHERE id = ?2",
                params![finished_at, id],
            )?;
        }

        tx.commit()?;
        Ok(true)
    })
    .await
}
