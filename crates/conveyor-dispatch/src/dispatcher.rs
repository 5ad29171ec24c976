// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The dispatcher: runs one persisted pending task on a worker.
//!
//! Pipeline: acquire -> running -> prepare -> chat -> ordered fan-out
//! (persist log, forward to subscriber, accumulate text, apply status) ->
//! stream-end fallback -> deliver -> push. Any error before stream end fails
//! the task and announces synthetic `error` + `done` frames to the live
//! subscriber; delivery and push are skipped on that path.
//!
//! Ordering: for a given task, log entries are written in stream-receive
//! order and subscriber frames are forwarded in the same order. A closed
//! subscriber stops forwarding but never persistence.

use std::sync::Arc;

use dashmap::DashMap;
use futures::StreamExt;
use tracing::{debug, info, warn};

use conveyor_core::{
    event_types, frame_types, Channel, ConveyorError, Driver, Endpoint, OutboundFrame,
    Subscriber, TaskStatus, TaskUpdate, WorkerEvent,
};
use conveyor_store::Store;
use conveyor_worker::WorkerClient;

use crate::push::{push_wanted, send_push};
use crate::skills::SkillLibrary;

/// Outcome of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The task was marked canceled (worker interrupt was attempted).
    Canceled,
    /// The task was already terminal; nothing changed.
    Conflict,
    /// No such task.
    NotFound,
}

pub struct Dispatcher {
    store: Arc<Store>,
    driver: Arc<dyn Driver>,
    worker: WorkerClient,
    skills: Arc<SkillLibrary>,
    push_client: reqwest::Client,
    /// Endpoints of currently streaming tasks, for best-effort cancel.
    active: DashMap<String, Endpoint>,
}

impl Dispatcher {
    pub fn new(store: Arc<Store>, driver: Arc<dyn Driver>, skills: Arc<SkillLibrary>) -> Self {
        Self {
            store,
            driver,
            worker: WorkerClient::new(),
            skills,
            push_client: reqwest::Client::new(),
            active: DashMap::new(),
        }
    }

    /// Run a pending task to its terminal state.
    ///
    /// Never returns an error: failures are recorded on the task and, when a
    /// live subscriber is attached, announced as synthetic frames.
    pub async fn run_task(
        &self,
        task_id: &str,
        channel: Arc<dyn Channel>,
        subscriber: Option<Arc<dyn Subscriber>>,
    ) {
        let result = self.execute(task_id, subscriber.clone()).await;
        self.active.remove(task_id);

        if let Err(e) = result {
            warn!(task_id, error = %e, "task execution failed");
            // started_at is set-once: this only fills it for tasks that
            // failed before the running transition (e.g. acquire errors).
            let stamp = now();
            let applied = self
                .store
                .update_task(
                    task_id,
                    TaskUpdate {
                        status: Some(TaskStatus::Failed),
                        error: Some(e.to_string()),
                        started_at: Some(stamp.clone()),
                        finished_at: Some(stamp),
                        ..TaskUpdate::default()
                    },
                )
                .await;
            if let Err(persist_err) = applied {
                warn!(task_id, error = %persist_err, "failed to record task failure");
            }

            if let Some(subscriber) = subscriber {
                let session_id = self.session_id_of(task_id).await;
                let error_frame = OutboundFrame::new(frame_types::ERROR)
                    .with_content(&e.to_string())
                    .with_session_id(session_id.as_deref().unwrap_or_default());
                if subscriber.send(error_frame).await.is_ok() {
                    let done = OutboundFrame::new(frame_types::DONE)
                        .with_session_id(session_id.as_deref().unwrap_or_default());
                    let _ = subscriber.send(done).await;
                }
            }
            // No delivery or push on the failure path.
            return;
        }

        self.finalize(task_id, channel).await;
    }

    /// Cancel a task: best-effort worker interrupt, then sticky `canceled`.
    ///
    /// Log entries from the still-draining stream keep being persisted, but
    /// the terminal guard in the store keeps status at `canceled`.
    pub async fn cancel_task(&self, task_id: &str) -> Result<CancelOutcome, ConveyorError> {
        let Some(task) = self.store.get_task(task_id).await? else {
            return Ok(CancelOutcome::NotFound);
        };
        if !task.status.is_cancelable() {
            return Ok(CancelOutcome::Conflict);
        }

        let endpoint = self.active.get(task_id).map(|e| e.value().clone());
        if let Some(endpoint) = endpoint {
            self.worker.cancel(&endpoint, &task.session_id).await;
        }

        // started_at is set-once in the store: a running task keeps its real
        // start, a still-pending one gets stamped here so a terminal record
        // never reads as "never left pending".
        let stamp = now();
        self.store
            .update_task(
                task_id,
                TaskUpdate {
                    status: Some(TaskStatus::Canceled),
                    started_at: Some(stamp.clone()),
                    finished_at: Some(stamp),
                    ..TaskUpdate::default()
                },
            )
            .await?;
        info!(task_id, "task canceled");
        Ok(CancelOutcome::Canceled)
    }

    async fn execute(
        &self,
        task_id: &str,
        subscriber: Option<Arc<dyn Subscriber>>,
    ) -> Result<(), ConveyorError> {
        let task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| ConveyorError::Internal(format!("task {task_id} not found")))?;

        // 1. Acquire a healthy worker endpoint for the session.
        let endpoint = self.driver.acquire(&task.session_id).await?;
        self.active.insert(task.id.clone(), endpoint.clone());

        // 2. pending -> running. A false here means the task went terminal
        //    (canceled) before we got the endpoint; nothing left to do.
        let applied = self
            .store
            .update_task(
                task_id,
                TaskUpdate {
                    status: Some(TaskStatus::Running),
                    worker_id: Some(endpoint.container_id.clone()),
                    started_at: Some(now()),
                    ..TaskUpdate::default()
                },
            )
            .await?;
        if !applied {
            debug!(task_id, "task already terminal before dispatch");
            return Ok(());
        }

        // 3. Inject capabilities, independent of pod lifecycle.
        if !task.skills.is_empty() || !task.bridge_configs.is_empty() {
            let bundles = self.skills.resolve(&task.skills);
            self.worker
                .prepare(&endpoint, &task.id, &bundles, &task.bridge_configs)
                .await?;
        }

        // 4. Start the chat turn.
        let mut stream = self
            .worker
            .chat(&endpoint, &task.session_id, &task.message)
            .await?;

        // 5. Fan out each framed event in order.
        let mut text_buffer = String::new();
        let mut subscriber = subscriber;
        let mut reached_terminal = false;

        while let Some(event) = stream.next().await {
            let event = event?;

            // 5a. Persist first; a failed append is fatal (the seq invariant
            //     cannot be honored past a lost entry).
            self.store
                .append_log(&task.id, &event.event_type, &event.content, &event.metadata)
                .await?;

            // 5b. Forward to the live subscriber, if still attached.
            if let Some(sub) = &subscriber {
                let frame = subscriber_frame(&event, &task.session_id);
                if sub.send(frame).await.is_err() {
                    debug!(task_id, "subscriber closed, persistence continues");
                    subscriber = None;
                }
            }

            // 5c. Accumulate text into the running result buffer.
            if event.event_type == event_types::TEXT {
                text_buffer.push_str(&event.content);
            }

            // 5d. Apply status transitions; exactly one terminal transition
            //     regardless of extra trailing events. Every other event
            //     type, known or not, has no status semantics.
            match event.event_type.as_str() {
                event_types::DONE if !reached_terminal => {
                    reached_terminal = true;
                    self.store
                        .update_task(&task.id, done_update(&event, &text_buffer))
                        .await?;
                }
                event_types::ERROR if !reached_terminal => {
                    reached_terminal = true;
                    self.store
                        .update_task(
                            &task.id,
                            TaskUpdate {
                                status: Some(TaskStatus::Failed),
                                error: Some(event.content.clone()),
                                finished_at: Some(now()),
                                ..TaskUpdate::default()
                            },
                        )
                        .await?;
                }
                _ => {}
            }
        }

        // 6. Stream-end fallback: a close without a terminal event counts as
        //    completion with whatever text accumulated.
        if !reached_terminal {
            self.store
                .update_task(
                    &task.id,
                    TaskUpdate {
                        status: Some(TaskStatus::Completed),
                        result: Some(non_empty(text_buffer)),
                        finished_at: Some(now()),
                        ..TaskUpdate::default()
                    },
                )
                .await?;
        }

        Ok(())
    }

    /// Steps 7-8: channel delivery and push notification. Failures here are
    /// logged and never reach task status.
    async fn finalize(&self, task_id: &str, channel: Arc<dyn Channel>) {
        let task = match self.store.get_task(task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => return,
            Err(e) => {
                warn!(task_id, error = %e, "finalize re-read failed");
                return;
            }
        };

        if task.status == TaskStatus::Completed {
            if let Err(e) = channel.deliver(&task).await {
                warn!(task_id, error = %e, "channel delivery failed");
            }
        }

        if let Some(push) = &task.push {
            if push_wanted(push, &task) {
                if let Err(e) = send_push(&self.push_client, push, &task).await {
                    warn!(task_id, error = %e, "push notification failed");
                }
            }
        }
    }

    async fn session_id_of(&self, task_id: &str) -> Option<String> {
        self.store
            .get_task(task_id)
            .await
            .ok()
            .flatten()
            .map(|t| t.session_id)
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn subscriber_frame(event: &WorkerEvent, session_id: &str) -> OutboundFrame {
    let mut frame = OutboundFrame::new(&event.event_type)
        .with_content(&event.content)
        .with_session_id(session_id);
    if !event.metadata.is_null() {
        frame = frame.with_metadata(event.metadata.clone());
    }
    frame
}

/// Build the completed-state update from a `done` event.
///
/// The worker may report the canonical result and execution stats in the
/// event metadata; a non-empty reported result wins over accumulated text.
fn done_update(event: &WorkerEvent, text_buffer: &str) -> TaskUpdate {
    let meta = &event.metadata;
    let reported = meta
        .get("result")
        .and_then(|r| r.as_str())
        .filter(|r| !r.is_empty());
    let result = reported
        .map(String::from)
        .or_else(|| non_empty(text_buffer.to_string()));

    TaskUpdate {
        status: Some(TaskStatus::Completed),
        result: Some(result),
        structured_output: meta.get("structured_output").cloned(),
        cost_usd: meta.get("cost_usd").and_then(|v| v.as_f64()),
        turns: meta.get("num_turns").and_then(|v| v.as_i64()),
        duration_ms: meta.get("duration_ms").and_then(|v| v.as_i64()),
        finished_at: Some(now()),
        ..TaskUpdate::default()
    }
}
