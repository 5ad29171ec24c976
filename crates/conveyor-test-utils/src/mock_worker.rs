// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock worker: a wiremock server speaking the worker API contract.
//!
//! Serves `/health`, `/chat` (canned SSE), `/prepare`, `/cancel`, and the
//! workspace/session proxies so drivers and the dispatcher can run against
//! a real HTTP boundary in tests.

use conveyor_core::WorkerEvent;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Render worker events as an SSE body in the wire framing.
pub fn sse_body(events: &[WorkerEvent]) -> String {
    events
        .iter()
        .map(|event| {
            let data = serde_json::json!({
                "content": event.content,
                "metadata": event.metadata,
            });
            format!("event: {}\ndata: {}\n\n", event.event_type, data)
        })
        .collect()
}

/// Convenience constructor for test event sequences.
pub fn event(event_type: &str, content: &str, metadata: serde_json::Value) -> WorkerEvent {
    WorkerEvent {
        event_type: event_type.to_string(),
        content: content.to_string(),
        metadata,
    }
}

pub struct MockWorker {
    pub server: MockServer,
}

impl MockWorker {
    /// Start a mock worker that already answers its health probe.
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok"
            })))
            .mount(&server)
            .await;
        Self { server }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Serve the given events from `POST /chat`.
    pub async fn mount_chat(&self, events: &[WorkerEvent]) {
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse_body(events)),
            )
            .mount(&self.server)
            .await;
    }

    /// Accept `POST /prepare`, expecting it `times` times.
    pub async fn mount_prepare_ok(&self, times: u64) {
        Mock::given(method("POST"))
            .and(path("/prepare"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ready"
            })))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// Reject `POST /prepare` with the given status and body.
    pub async fn mount_prepare_failure(&self, status: u16, body: &str) {
        Mock::given(method("POST"))
            .and(path("/prepare"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body.to_string()))
            .mount(&self.server)
            .await;
    }

    /// Accept `POST /cancel`, expecting it `times` times.
    pub async fn mount_cancel_ok(&self, times: u64) {
        Mock::given(method("POST"))
            .and(path("/cancel"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "canceled"
            })))
            .expect(times)
            .mount(&self.server)
            .await;
    }
}
