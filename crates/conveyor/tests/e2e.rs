// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end integration tests for the complete Conveyor pipeline.
//!
//! Each test creates an isolated TestHarness with a temp SQLite store, a
//! mock worker behind a static driver, and registered channels. Tests are
//! independent and order-insensitive.

use std::sync::Arc;
use std::time::Duration;

use conveyor_core::{Channel, PushConfig, TaskRequest, TaskStatus, TaskUpdate};
use conveyor_test_utils::{event, CaptureChannel, CaptureSubscriber, TestHarness};

fn chat_request(message: &str) -> TaskRequest {
    TaskRequest {
        message: message.to_string(),
        ..TaskRequest::default()
    }
}

// ---- Interactive happy path ----

#[tokio::test]
async fn interactive_chat_streams_text_and_completes() {
    let harness = TestHarness::builder()
        .with_chat_events(vec![
            event("text", "Hel", serde_json::json!({})),
            event("text", "lo!", serde_json::json!({})),
            event("done", "", serde_json::json!({})),
        ])
        .build()
        .await
        .unwrap();

    let duplex = harness.registry.require("duplex").unwrap();
    let subscriber = Arc::new(CaptureSubscriber::new());
    let task = harness
        .run_task("s1", duplex, chat_request("hi"), Some(subscriber.clone()))
        .await
        .unwrap();

    // Concatenated text frames equal the final result.
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.result.as_deref(), Some("Hello!"));
    assert!(task.error.is_none());

    // started_at/finished_at are set and ordered.
    let started = task.started_at.expect("started_at set");
    let finished = task.finished_at.expect("finished_at set");
    assert!(started <= finished);

    // Subscriber saw the frames in order, ending with done.
    let frame_types = subscriber.frame_types().await;
    assert_eq!(frame_types, vec!["text", "text", "done"]);

    // Store contains one session, one task, and a dense log.
    assert_eq!(harness.store.list_sessions().await.unwrap().len(), 1);
    let logs = harness.store.read_logs(&task.id, -1, 100).await.unwrap();
    assert_eq!(logs.len(), 3);
    for (i, entry) in logs.iter().enumerate() {
        assert_eq!(entry.seq, i as i64);
    }
}

#[tokio::test]
async fn done_metadata_supplies_result_and_stats() {
    let harness = TestHarness::builder()
        .with_chat_events(vec![
            event("tool_call", "read_file", serde_json::json!({"tool_id": "t-1"})),
            event(
                "done",
                "",
                serde_json::json!({
                    "result": "final answer",
                    "cost_usd": 0.031,
                    "num_turns": 2,
                    "duration_ms": 900,
                }),
            ),
        ])
        .build()
        .await
        .unwrap();

    let duplex = harness.registry.require("duplex").unwrap();
    let task = harness
        .run_task("s1", duplex, chat_request("go"), None)
        .await
        .unwrap();

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.result.as_deref(), Some("final answer"));
    assert_eq!(task.cost_usd, Some(0.031));
    assert_eq!(task.turns, Some(2));
    assert_eq!(task.duration_ms, Some(900));
}

#[tokio::test]
async fn stream_end_without_terminal_event_counts_as_completed() {
    let harness = TestHarness::builder()
        .with_chat_events(vec![event("text", "partial", serde_json::json!({}))])
        .build()
        .await
        .unwrap();

    let duplex = harness.registry.require("duplex").unwrap();
    let task = harness
        .run_task("s1", duplex, chat_request("hi"), None)
        .await
        .unwrap();

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.result.as_deref(), Some("partial"));
}

#[tokio::test]
async fn worker_error_event_fails_the_task_once() {
    let harness = TestHarness::builder()
        .with_chat_events(vec![
            event("error", "model exploded", serde_json::json!({})),
            // Trailing done must not flip the already-failed task.
            event("done", "", serde_json::json!({})),
        ])
        .build()
        .await
        .unwrap();

    let duplex = harness.registry.require("duplex").unwrap();
    let task = harness
        .run_task("s1", duplex, chat_request("hi"), None)
        .await
        .unwrap();

    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error.as_deref(), Some("model exploded"));
    assert!(task.finished_at.is_some());

    // Both events were still logged.
    assert_eq!(harness.store.count_logs(&task.id).await.unwrap(), 2);
}

#[tokio::test]
async fn unknown_event_types_are_persisted_and_forwarded() {
    let harness = TestHarness::builder()
        .with_chat_events(vec![
            event("thinking", "hmm", serde_json::json!({})),
            event("done", "", serde_json::json!({})),
        ])
        .build()
        .await
        .unwrap();

    let duplex = harness.registry.require("duplex").unwrap();
    let subscriber = Arc::new(CaptureSubscriber::new());
    let task = harness
        .run_task("s1", duplex, chat_request("hi"), Some(subscriber.clone()))
        .await
        .unwrap();

    let logs = harness.store.read_logs(&task.id, -1, 10).await.unwrap();
    assert_eq!(logs[0].event_type, "thinking");
    assert_eq!(subscriber.frame_types().await[0], "thinking");
}

// ---- Subscriber liveness ----

#[tokio::test]
async fn closed_subscriber_does_not_affect_persistence() {
    let harness = TestHarness::builder()
        .with_chat_events(vec![
            event("text", "a", serde_json::json!({})),
            event("text", "b", serde_json::json!({})),
            event("done", "", serde_json::json!({})),
        ])
        .build()
        .await
        .unwrap();

    let duplex = harness.registry.require("duplex").unwrap();
    let subscriber = Arc::new(CaptureSubscriber::new());
    subscriber.close(); // peer gone before the first frame

    let task = harness
        .run_task("s1", duplex, chat_request("hi"), Some(subscriber.clone()))
        .await
        .unwrap();

    assert!(subscriber.frames().await.is_empty());
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(harness.store.count_logs(&task.id).await.unwrap(), 3);
}

// ---- Channel defaults ----

#[tokio::test]
async fn channel_defaults_merge_in_front_of_request_skills() {
    let harness = TestHarness::builder()
        .with_chat_events(vec![event("done", "", serde_json::json!({}))])
        .build()
        .await
        .unwrap();
    harness.worker.mount_prepare_ok(1).await;

    let channel = Arc::new(
        CaptureChannel::new("demo").with_defaults(conveyor_core::ChannelDefaults {
            skills: vec!["code-review".into()],
            bridge_configs: vec![],
        }),
    );

    let mut request = chat_request("review");
    request.skills = vec!["sql-expert".into()];
    channel.defaults().apply(&mut request);

    let task = harness
        .run_task("s1", channel, request, None)
        .await
        .unwrap();

    assert_eq!(task.skills, vec!["code-review", "sql-expert"]);
    assert_eq!(task.status, TaskStatus::Completed);
}

// ---- Prepare failure ----

#[tokio::test]
async fn prepare_failure_fails_task_and_skips_delivery_and_push() {
    let harness = TestHarness::builder()
        .with_chat_events(vec![event("done", "", serde_json::json!({}))])
        .with_skill("code-review", &[("prompt.md", "review carefully")])
        .build()
        .await
        .unwrap();
    harness.worker.mount_prepare_failure(500, "disk full").await;

    // A push endpoint that must never be called.
    let push_server = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .respond_with(wiremock::ResponseTemplate::new(200))
        .expect(0)
        .mount(&push_server)
        .await;

    let channel = Arc::new(CaptureChannel::new("demo"));
    let request = TaskRequest {
        message: "review".into(),
        skills: vec!["code-review".into()],
        push: Some(PushConfig {
            url: push_server.uri(),
            auth_header: None,
            events: vec![],
        }),
        ..TaskRequest::default()
    };

    let task = harness
        .run_task("s1", channel.clone(), request, None)
        .await
        .unwrap();

    assert_eq!(task.status, TaskStatus::Failed);
    let error = task.error.unwrap();
    assert!(error.contains("disk full"), "got: {error}");
    assert!(channel.delivered().await.is_empty(), "deliver must not run");
}

// ---- Delivery and push ----

#[tokio::test]
async fn completed_task_is_delivered_exactly_once_with_final_snapshot() {
    let harness = TestHarness::builder()
        .with_chat_events(vec![
            event("text", "report", serde_json::json!({})),
            event("done", "", serde_json::json!({})),
        ])
        .build()
        .await
        .unwrap();

    let channel = Arc::new(CaptureChannel::new("demo"));
    let task = harness
        .run_task("s1", channel.clone(), chat_request("run"), None)
        .await
        .unwrap();

    let delivered = channel.delivered().await;
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].id, task.id);
    assert_eq!(delivered[0].status, TaskStatus::Completed);
    assert_eq!(delivered[0].result.as_deref(), Some("report"));
}

#[tokio::test]
async fn push_notification_fires_on_terminal_state() {
    let harness = TestHarness::builder()
        .with_chat_events(vec![
            event("text", "out", serde_json::json!({})),
            event("done", "", serde_json::json!({})),
        ])
        .build()
        .await
        .unwrap();

    let push_server = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .and(wiremock::matchers::header("authorization", "Bearer push-me"))
        .and(wiremock::matchers::body_partial_json(serde_json::json!({
            "status": "completed",
            "result": "out",
        })))
        .respond_with(wiremock::ResponseTemplate::new(200))
        .expect(1)
        .mount(&push_server)
        .await;

    let channel = Arc::new(CaptureChannel::new("demo"));
    let request = TaskRequest {
        message: "run".into(),
        push: Some(PushConfig {
            url: push_server.uri(),
            auth_header: Some("Bearer push-me".into()),
            events: vec![],
        }),
        ..TaskRequest::default()
    };
    harness.run_task("s1", channel, request, None).await.unwrap();
}

// ---- Cancellation ----

#[tokio::test]
async fn cancel_during_run_is_sticky_and_keeps_late_logs() {
    let harness = TestHarness::builder().build().await.unwrap();
    // Slow worker: the chat response only lands after the cancel below.
    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .and(wiremock::matchers::path("/chat"))
        .respond_with(
            wiremock::ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(conveyor_test_utils::sse_body(&[
                    event("text", "late output", serde_json::json!({})),
                    event("done", "", serde_json::json!({})),
                ]))
                .set_delay(Duration::from_millis(600)),
        )
        .mount(&harness.worker.server)
        .await;
    harness.worker.mount_cancel_ok(1).await;

    let duplex = harness.registry.require("duplex").unwrap();
    let task_id = harness
        .seed_task("s1", "duplex", chat_request("long job"))
        .await
        .unwrap();

    let dispatcher = harness.dispatcher.clone();
    let run_channel = duplex.clone();
    let run_id = task_id.clone();
    let run = tokio::spawn(async move {
        dispatcher.run_task(&run_id, run_channel, None).await;
    });

    // Let the dispatcher acquire the worker and enter the chat call.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let outcome = harness.dispatcher.cancel_task(&task_id).await.unwrap();
    assert_eq!(outcome, conveyor_dispatch::CancelOutcome::Canceled);

    run.await.unwrap();

    // The worker's late done did not resurrect the task.
    let task = harness.store.get_task(&task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Canceled);
    assert!(task.error.is_none(), "canceled tasks expose no error");

    // The drained frames were still persisted as history.
    assert_eq!(harness.store.count_logs(&task_id).await.unwrap(), 2);
}

#[tokio::test]
async fn cancel_after_terminal_conflicts() {
    let harness = TestHarness::builder()
        .with_chat_events(vec![event("done", "", serde_json::json!({}))])
        .build()
        .await
        .unwrap();

    let duplex = harness.registry.require("duplex").unwrap();
    let task = harness
        .run_task("s1", duplex, chat_request("hi"), None)
        .await
        .unwrap();

    let outcome = harness.dispatcher.cancel_task(&task.id).await.unwrap();
    assert_eq!(outcome, conveyor_dispatch::CancelOutcome::Conflict);

    let missing = harness.dispatcher.cancel_task("nope").await.unwrap();
    assert_eq!(missing, conveyor_dispatch::CancelOutcome::NotFound);
}

// ---- Webhook ingress over HTTP ----

#[tokio::test]
async fn webhook_accepts_verifies_and_dispatches() {
    let webhook_channel = Arc::new(CaptureChannel::new("webhook-demo").with_secret("s3cret"));
    let harness = TestHarness::builder()
        .with_chat_events(vec![
            event("text", "webhook result", serde_json::json!({})),
            event("done", "", serde_json::json!({})),
        ])
        .with_channel(webhook_channel.clone())
        .build()
        .await
        .unwrap();

    let (base_url, cancel) = harness.serve_gateway().await.unwrap();
    let client = reqwest::Client::new();

    // Accepted: 202 with a task id, task visible immediately.
    let response = client
        .post(format!("{base_url}/api/channel/webhook-demo/webhook"))
        .header("x-test-signature", "s3cret")
        .json(&serde_json::json!({"message": "do the thing"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202);
    let body: serde_json::Value = response.json().await.unwrap();
    let task_id = body["taskId"].as_str().unwrap().to_string();

    let projection: serde_json::Value = client
        .get(format!("{base_url}/api/tasks/{task_id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(matches!(
        projection["status"].as_str().unwrap(),
        "pending" | "running" | "completed"
    ));

    // Wait for the async dispatch to finish.
    let mut status = String::new();
    for _ in 0..50 {
        let projection: serde_json::Value = client
            .get(format!("{base_url}/api/tasks/{task_id}"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        status = projection["status"].as_str().unwrap().to_string();
        if status == "completed" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(status, "completed");

    // Delivery runs just after the terminal transition; give it a moment,
    // then check it ran exactly once with the final snapshot.
    let mut delivered = webhook_channel.delivered().await;
    for _ in 0..50 {
        if !delivered.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        delivered = webhook_channel.delivered().await;
    }
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].id, task_id);
    assert_eq!(delivered[0].result.as_deref(), Some("webhook result"));

    cancel.cancel();
}

#[tokio::test]
async fn webhook_rejects_bad_signatures_and_unknown_channels() {
    let harness = TestHarness::builder()
        .with_channel(Arc::new(
            CaptureChannel::new("webhook-demo").with_secret("s3cret"),
        ))
        .build()
        .await
        .unwrap();

    let (base_url, cancel) = harness.serve_gateway().await.unwrap();
    let client = reqwest::Client::new();

    let unauthorized = client
        .post(format!("{base_url}/api/channel/webhook-demo/webhook"))
        .header("x-test-signature", "wrong")
        .json(&serde_json::json!({"message": "hi"}))
        .send()
        .await
        .unwrap();
    assert_eq!(unauthorized.status(), 401);

    let unknown = client
        .post(format!("{base_url}/api/channel/slack/webhook"))
        .json(&serde_json::json!({"message": "hi"}))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), 404);

    let skipped = client
        .post(format!("{base_url}/api/channel/webhook-demo/webhook"))
        .header("x-test-signature", "s3cret")
        .json(&serde_json::json!({"ignore": true}))
        .send()
        .await
        .unwrap();
    assert_eq!(skipped.status(), 200);
    let body: serde_json::Value = skipped.json().await.unwrap();
    assert_eq!(body["skipped"], true);

    cancel.cancel();
}

// ---- Incremental log pull over HTTP ----

#[tokio::test]
async fn log_tail_pages_in_seq_order_until_drained() {
    let harness = TestHarness::builder()
        .with_chat_events(vec![
            event("text", "1", serde_json::json!({})),
            event("text", "2", serde_json::json!({})),
            event("text", "3", serde_json::json!({})),
            event("text", "4", serde_json::json!({})),
            event("done", "", serde_json::json!({})),
        ])
        .build()
        .await
        .unwrap();

    let duplex = harness.registry.require("duplex").unwrap();
    let task = harness
        .run_task("s1", duplex, chat_request("hi"), None)
        .await
        .unwrap();

    let (base_url, cancel) = harness.serve_gateway().await.unwrap();
    let client = reqwest::Client::new();

    let first: serde_json::Value = client
        .get(format!("{base_url}/api/tasks/{}/logs?after=0&limit=3", task.id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let logs = first["logs"].as_array().unwrap();
    assert_eq!(logs.len(), 3);
    assert_eq!(logs[0]["seq"], 0);
    assert_eq!(first["hasMore"], true);

    let last_seq = logs.last().unwrap()["seq"].as_i64().unwrap();
    let second: serde_json::Value = client
        .get(format!(
            "{base_url}/api/tasks/{}/logs?after={last_seq}&limit=50",
            task.id
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let rest = second["logs"].as_array().unwrap();
    assert_eq!(rest.len(), 2);
    assert_eq!(rest[0]["seq"], 3);
    assert_eq!(second["hasMore"], false);

    cancel.cancel();
}

// ---- Session CRUD over HTTP ----

#[tokio::test]
async fn session_crud_and_cascade_delete() {
    let harness = TestHarness::builder()
        .with_chat_events(vec![event("done", "", serde_json::json!({}))])
        .build()
        .await
        .unwrap();

    let duplex = harness.registry.require("duplex").unwrap();
    let task = harness
        .run_task("s1", duplex, chat_request("hi"), None)
        .await
        .unwrap();

    let (base_url, cancel) = harness.serve_gateway().await.unwrap();
    let client = reqwest::Client::new();

    let sessions: serde_json::Value = client
        .get(format!("{base_url}/api/sessions"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(sessions["sessions"].as_array().unwrap().len(), 1);

    let patched = client
        .patch(format!("{base_url}/api/sessions/s1"))
        .json(&serde_json::json!({"title": "greetings"}))
        .send()
        .await
        .unwrap();
    assert_eq!(patched.status(), 200);

    let session: serde_json::Value = client
        .get(format!("{base_url}/api/sessions/s1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(session["title"], "greetings");

    let deleted = client
        .delete(format!("{base_url}/api/sessions/s1"))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), 200);

    // Cascade: the task and its logs are gone with the session.
    let missing = client
        .get(format!("{base_url}/api/tasks/{}", task.id))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);

    cancel.cancel();
}

// ---- Health ----

#[tokio::test]
async fn health_reports_status_and_version() {
    let harness = TestHarness::builder().build().await.unwrap();
    let (base_url, cancel) = harness.serve_gateway().await.unwrap();

    let health: serde_json::Value = reqwest::get(format!("{base_url}/api/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert!(!health["version"].as_str().unwrap().is_empty());

    cancel.cancel();
}

// ---- Terminal immutability through the store ----

#[tokio::test]
async fn late_updates_after_cancel_are_ignored() {
    let harness = TestHarness::builder().build().await.unwrap();
    let task_id = harness
        .seed_task("s1", "duplex", chat_request("hi"))
        .await
        .unwrap();

    harness.dispatcher.cancel_task(&task_id).await.unwrap();

    // A late worker done arriving through the store path is a no-op.
    let applied = harness
        .store
        .update_task(
            &task_id,
            TaskUpdate {
                status: Some(TaskStatus::Completed),
                result: Some(Some("late".into())),
                ..TaskUpdate::default()
            },
        )
        .await
        .unwrap();
    assert!(!applied);

    // But late log entries are kept as history.
    harness
        .store
        .append_log(&task_id, "text", "late frame", &serde_json::Value::Null)
        .await
        .unwrap();
    assert_eq!(harness.store.count_logs(&task_id).await.unwrap(), 1);

    let task = harness.store.get_task(&task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Canceled);

    // Canceling a pending task still leaves a well-formed terminal record:
    // it is no longer pending, so started_at must be set and ordered.
    let started = task.started_at.expect("started_at set on cancel");
    let finished = task.finished_at.expect("finished_at set on cancel");
    assert!(started <= finished);
}
