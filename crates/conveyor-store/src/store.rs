// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! High-level store facade over the database and query modules.

use conveyor_core::{ConveyorError, Session, Task, TaskLogEntry, TaskUpdate};
use tracing::debug;

use crate::database::Database;
use crate::queries;

/// Durable state for sessions, tasks, and task logs.
///
/// All operations funnel through one WAL-mode SQLite connection; see
/// [`Database`] for the single-writer model.
pub struct Store {
    db: Database,
}

impl Store {
    /// Open the store at `path`, creating schema on first use.
    pub async fn open(path: &str) -> Result<Self, ConveyorError> {
        let db = Database::open(path).await?;
        debug!(path, "store opened");
        Ok(Self { db })
    }

    /// Checkpoint and flush before shutdown.
    pub async fn close(&self) -> Result<(), ConveyorError> {
        self.db.close().await
    }

    fn now() -> String {
        chrono::Utc::now().to_rfc3339()
    }

    // --- Sessions ---

    /// Create a session if it does not exist. Idempotent.
    pub async fn create_session(
        &self,
        id: &str,
        channel_type: &str,
    ) -> Result<Session, ConveyorError> {
        let now = Self::now();
        let session = Session {
            id: id.to_string(),
            channel_type: channel_type.to_string(),
            title: None,
            created_at: now.clone(),
            last_active_at: now,
        };
        queries::sessions::create_session(&self.db, &session).await?;
        // Re-read: the insert is a no-op if the session already existed.
        Ok(queries::sessions::get_session(&self.db, id)
            .await?
            .unwrap_or(session))
    }

    pub async fn get_session(&self, id: &str) -> Result<Option<Session>, ConveyorError> {
        queries::sessions::get_session(&self.db, id).await
    }

    /// All sessions, most recently active first.
    pub async fn list_sessions(&self) -> Result<Vec<Session>, ConveyorError> {
        queries::sessions::list_sessions(&self.db).await
    }

    pub async fn update_session_title(
        &self,
        id: &str,
        title: &str,
    ) -> Result<(), ConveyorError> {
        queries::sessions::update_title(&self.db, id, title).await
    }

    /// Bump the session's last-active timestamp to now.
    pub async fn touch_session(&self, id: &str) -> Result<(), ConveyorError> {
        queries::sessions::touch(&self.db, id, &Self::now()).await
    }

    /// Delete a session; its tasks and logs cascade atomically.
    pub async fn delete_session(&self, id: &str) -> Result<bool, ConveyorError> {
        queries::sessions::delete_session(&self.db, id).await
    }

    // --- Tasks ---

    pub async fn create_task(&self, task: &Task) -> Result<(), ConveyorError> {
        queries::tasks::create_task(&self.db, task).await
    }

    pub async fn get_task(&self, id: &str) -> Result<Option<Task>, ConveyorError> {
        queries::tasks::get_task(&self.db, id).await
    }

    /// Apply a partial update. Updates to terminal tasks are ignored and
    /// reported as `Ok(false)`.
    pub async fn update_task(
        &self,
        id: &str,
        update: TaskUpdate,
    ) -> Result<bool, ConveyorError> {
        queries::tasks::update_task(&self.db, id, update).await
    }

    /// A session's tasks, oldest first.
    pub async fn list_tasks_by_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<Task>, ConveyorError> {
        queries::tasks::list_by_session(&self.db, session_id).await
    }

    // --- Task logs ---

    /// Append a log entry and return its assigned dense `seq`.
    pub async fn append_log(
        &self,
        task_id: &str,
        event_type: &str,
        content: &str,
        metadata: &serde_json::Value,
    ) -> Result<i64, ConveyorError> {
        let metadata = if metadata.is_null() {
            None
        } else {
            Some(metadata.to_string())
        };
        queries::logs::append(&self.db, task_id, event_type, content, metadata, &Self::now())
            .await
    }

    /// Log entries with `seq > after_seq`, oldest first. `after_seq = -1`
    /// reads from the start.
    pub async fn read_logs(
        &self,
        task_id: &str,
        after_seq: i64,
        limit: i64,
    ) -> Result<Vec<TaskLogEntry>, ConveyorError> {
        queries::logs::read(&self.db, task_id, after_seq, limit).await
    }

    pub async fn count_logs(&self, task_id: &str) -> Result<i64, ConveyorError> {
        queries::logs::count(&self.db, task_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use conveyor_core::{TaskRequest, TaskStatus};
    use tempfile::tempdir;

    async fn setup_store() -> (Store, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let store = Store::open(db_path.to_str().unwrap()).await.unwrap();
        (store, dir)
    }

    async fn seed_task(store: &Store, session_id: &str, task_id: &str) {
        store.create_session(session_id, "duplex").await.unwrap();
        let request = TaskRequest {
            message: "hello".into(),
            ..TaskRequest::default()
        };
        let task = Task::pending(task_id, session_id, "duplex", request, "2026-01-01T00:00:00Z");
        store.create_task(&task).await.unwrap();
    }

    #[tokio::test]
    async fn create_session_is_idempotent() {
        let (store, _dir) = setup_store().await;

        let first = store.create_session("s1", "duplex").await.unwrap();
        store.update_session_title("s1", "greetings").await.unwrap();
        let second = store.create_session("s1", "forge").await.unwrap();

        // Second create is a no-op: channel type and title survive.
        assert_eq!(second.channel_type, "duplex");
        assert_eq!(second.title.as_deref(), Some("greetings"));
        assert_eq!(first.id, second.id);
        assert_eq!(store.list_sessions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sessions_list_most_recently_active_first() {
        let (store, _dir) = setup_store().await;
        store.create_session("a", "duplex").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.create_session("b", "duplex").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.touch_session("a").await.unwrap();

        let sessions = store.list_sessions().await.unwrap();
        assert_eq!(sessions[0].id, "a");
        assert_eq!(sessions[1].id, "b");
    }

    #[tokio::test]
    async fn task_round_trips_with_json_fields() {
        let (store, _dir) = setup_store().await;
        store.create_session("s1", "forge").await.unwrap();

        let request = TaskRequest {
            message: "review this".into(),
            skills: vec!["code-review".into()],
            channel_meta: serde_json::json!({"repo": "acme/api", "issue": 7}),
            push: Some(conveyor_core::PushConfig {
                url: "https://example.test/hook".into(),
                auth_header: Some("Bearer t".into()),
                events: vec![],
            }),
            ..TaskRequest::default()
        };
        let task = Task::pending("t1", "s1", "forge", request, "2026-01-01T00:00:00Z");
        store.create_task(&task).await.unwrap();

        let loaded = store.get_task("t1").await.unwrap().unwrap();
        assert_eq!(loaded.status, TaskStatus::Pending);
        assert_eq!(loaded.skills, vec!["code-review"]);
        assert_eq!(loaded.channel_meta["repo"], "acme/api");
        assert_eq!(loaded.push.unwrap().url, "https://example.test/hook");
        assert!(loaded.started_at.is_none());
    }

    #[tokio::test]
    async fn update_task_applies_partial_fields() {
        let (store, _dir) = setup_store().await;
        seed_task(&store, "s1", "t1").await;

        let applied = store
            .update_task(
                "t1",
                TaskUpdate {
                    status: Some(TaskStatus::Running),
                    worker_id: Some("pod-abc".into()),
                    started_at: Some("2026-01-01T00:00:01Z".into()),
                    ..TaskUpdate::default()
                },
            )
            .await
            .unwrap();
        assert!(applied);

        let task = store.get_task("t1").await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.worker_id.as_deref(), Some("pod-abc"));
        assert_eq!(task.started_at.as_deref(), Some("2026-01-01T00:00:01Z"));
        assert!(task.finished_at.is_none());
    }

    #[tokio::test]
    async fn terminal_tasks_ignore_further_updates() {
        let (store, _dir) = setup_store().await;
        seed_task(&store, "s1", "t1").await;

        store
            .update_task(
                "t1",
                TaskUpdate {
                    status: Some(TaskStatus::Canceled),
                    finished_at: Some("2026-01-01T00:00:02Z".into()),
                    ..TaskUpdate::default()
                },
            )
            .await
            .unwrap();

        // A late worker `done` must not resurrect the task.
        let applied = store
            .update_task(
                "t1",
                TaskUpdate {
                    status: Some(TaskStatus::Completed),
                    result: Some(Some("late".into())),
                    ..TaskUpdate::default()
                },
            )
            .await
            .unwrap();
        assert!(!applied);

        let task = store.get_task("t1").await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Canceled);
        assert!(task.result.is_none());
        assert_eq!(task.finished_at.as_deref(), Some("2026-01-01T00:00:02Z"));
    }

    #[tokio::test]
    async fn started_at_is_set_once() {
        let (store, _dir) = setup_store().await;
        seed_task(&store, "s1", "t1").await;

        store
            .update_task(
                "t1",
                TaskUpdate {
                    status: Some(TaskStatus::Running),
                    started_at: Some("2026-01-01T00:00:01Z".into()),
                    ..TaskUpdate::default()
                },
            )
            .await
            .unwrap();

        // A later transition carrying its own stamp must not move it.
        store
            .update_task(
                "t1",
                TaskUpdate {
                    status: Some(TaskStatus::Failed),
                    started_at: Some("2026-01-01T00:00:09Z".into()),
                    finished_at: Some("2026-01-01T00:00:09Z".into()),
                    ..TaskUpdate::default()
                },
            )
            .await
            .unwrap();

        let task = store.get_task("t1").await.unwrap().unwrap();
        assert_eq!(task.started_at.as_deref(), Some("2026-01-01T00:00:01Z"));
        assert_eq!(task.finished_at.as_deref(), Some("2026-01-01T00:00:09Z"));
    }

    #[tokio::test]
    async fn update_unknown_task_reports_false() {
        let (store, _dir) = setup_store().await;
        let applied = store
            .update_task(
                "nope",
                TaskUpdate {
                    status: Some(TaskStatus::Running),
                    ..TaskUpdate::default()
                },
            )
            .await
            .unwrap();
        assert!(!applied);
    }

    #[tokio::test]
    async fn log_seq_is_dense_and_zero_based() {
        let (store, _dir) = setup_store().await;
        seed_task(&store, "s1", "t1").await;

        for i in 0..5 {
            let seq = store
                .append_log("t1", "text", &format!("chunk {i}"), &serde_json::Value::Null)
                .await
                .unwrap();
            assert_eq!(seq, i);
        }

        let logs = store.read_logs("t1", -1, 100).await.unwrap();
        let seqs: Vec<i64> = logs.iter().map(|l| l.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
        assert_eq!(store.count_logs("t1").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn log_seq_stays_dense_under_concurrent_appenders() {
        let (store, _dir) = setup_store().await;
        seed_task(&store, "s1", "t1").await;
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for worker in 0..4 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..25 {
                    store
                        .append_log(
                            "t1",
                            "text",
                            &format!("w{worker} c{i}"),
                            &serde_json::Value::Null,
                        )
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let logs = store.read_logs("t1", -1, 500).await.unwrap();
        assert_eq!(logs.len(), 100);
        for (expected, entry) in logs.iter().enumerate() {
            assert_eq!(entry.seq, expected as i64, "seq must be dense, no gaps");
        }
    }

    #[tokio::test]
    async fn read_logs_after_seq_is_exclusive() {
        let (store, _dir) = setup_store().await;
        seed_task(&store, "s1", "t1").await;
        for i in 0..10 {
            store
                .append_log("t1", "text", &format!("{i}"), &serde_json::Value::Null)
                .await
                .unwrap();
        }

        let page = store.read_logs("t1", -1, 4).await.unwrap();
        assert_eq!(page.len(), 4);
        assert_eq!(page[0].seq, 0);

        let next = store.read_logs("t1", page.last().unwrap().seq, 100).await.unwrap();
        assert_eq!(next[0].seq, 4);
        assert_eq!(next.len(), 6);
    }

    #[tokio::test]
    async fn delete_session_cascades_tasks_and_logs() {
        let (store, _dir) = setup_store().await;
        seed_task(&store, "s1", "t1").await;
        seed_task(&store, "s1", "t2").await;
        store
            .append_log("t1", "text", "x", &serde_json::Value::Null)
            .await
            .unwrap();

        let deleted = store.delete_session("s1").await.unwrap();
        assert!(deleted);

        assert!(store.get_session("s1").await.unwrap().is_none());
        assert!(store.get_task("t1").await.unwrap().is_none());
        assert!(store.get_task("t2").await.unwrap().is_none());
        assert_eq!(store.count_logs("t1").await.unwrap(), 0);

        // Deleting again is a no-op.
        assert!(!store.delete_session("s1").await.unwrap());
    }

    #[tokio::test]
    async fn tasks_require_an_existing_session() {
        let (store, _dir) = setup_store().await;
        let request = TaskRequest {
            message: "orphan".into(),
            ..TaskRequest::default()
        };
        let task = Task::pending("t1", "ghost", "duplex", request, "2026-01-01T00:00:00Z");
        let result = store.create_task(&task).await;
        assert!(result.is_err(), "foreign key should reject orphan tasks");
    }

    #[tokio::test]
    async fn list_tasks_by_session_ordered_by_creation() {
        let (store, _dir) = setup_store().await;
        store.create_session("s1", "duplex").await.unwrap();
        for (i, id) in ["t1", "t2", "t3"].iter().enumerate() {
            let request = TaskRequest {
                message: format!("m{i}"),
                ..TaskRequest::default()
            };
            let task = Task::pending(
                id,
                "s1",
                "duplex",
                request,
                &format!("2026-01-01T00:00:0{i}Z"),
            );
            store.create_task(&task).await.unwrap();
        }

        let tasks = store.list_tasks_by_session("s1").await.unwrap();
        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2", "t3"]);
    }
}
