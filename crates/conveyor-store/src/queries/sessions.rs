// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session CRUD operations.

use conveyor_core::{ConveyorError, Session};
use rusqlite::{params, OptionalExtension};

use crate::database::Database;

fn session_from_row(row: &rusqlite::Row<'_>) -> Result<Session, rusqlite::Error> {
    Ok(Session {
        id: row.get(0)?,
        channel_type: row.get(1)?,
        title: row.get(2)?,
        created_at: row.get(3)?,
        last_active_at: row.get(4)?,
    })
}

const SESSION_COLUMNS: &str = "id, channel_type, title, created_at, last_active_at";

/// Insert a session if it does not exist yet. Idempotent.
pub async fn create_session(db: &Database, session: &Session) -> Result<(), ConveyorError> {
    let session = session.clone();
    db.call(move |conn| {
        conn.execute(
            "INSERT OR IGNORE INTO sessions (id, channel_type, title, created_at, last_active_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session.id,
                session.channel_type,
                session.title,
                session.created_at,
                session.last_active_at,
            ],
        )?;
        Ok(())
    })
    .await
}

/// Get a session by ID.
pub async fn get_session(db: &Database, id: &str) -> Result<Option<Session>, ConveyorError> {
    let id = id.to_string();
    db.call(move |conn| {
        conn.query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
            params![id],
            session_from_row,
        )
        .optional()
    })
    .await
}

/// List all sessions, most recently active first.
pub async fn list_sessions(db: &Database) -> Result<Vec<Session>, ConveyorError> {
    db.call(move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY last_active_at DESC"
        ))?;
        let rows = stmt.query_map([], session_from_row)?;
        rows.collect()
    })
    .await
}

/// Update a session's title.
pub async fn update_title(db: &Database, id: &str, title: &str) -> Result<(), ConveyorError> {
    let id = id.to_string();
    let title = title.to_string();
    db.call(move |conn| {
        conn.execute(
            "UPDATE sessions SET title = ?1 WHERE id = ?2",
            params![title, id],
        )?;
        Ok(())
    })
    .await
}

/// Bump the session's last-active timestamp.
pub async fn touch(db: &Database, id: &str, now: &str) -> Result<(), ConveyorError> {
    let id = id.to_string();
    let now = now.to_string();
    db.call(move |conn| {
        conn.execute(
            "UPDATE sessions SET last_active_at = ?1 WHERE id = ?2",
            params![now, id],
        )?;
        Ok(())
    })
    .await
}

/// Delete a session; tasks and logs cascade in the same statement.
///
/// Returns false if the session did not exist.
pub async fn delete_session(db: &Database, id: &str) -> Result<bool, ConveyorError> {
    let id = id.to_string();
    db.call(move |conn| {
        let affected = conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    })
    .await
}
