// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Duplex interactive ingress over WebSocket.
//!
//! Inbound frames: `{"type": "chat", session_id?, message, skills?,
//! bridge_configs?}` and `{"type": "ping"}`. Outbound frames are
//! [`OutboundFrame`]s: streamed task events plus `pong`, `session_created`,
//! and `session_title`. The connection acts as the live subscriber for
//! tasks it starts; a dropped connection stops forwarding, never
//! persistence.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use conveyor_core::{
    frame_types, ConveyorError, InboundRequest, OutboundFrame, Subscriber, SubscriberClosed, Task,
};

use crate::server::AppState;

/// Live subscriber backed by the connection's outbound queue.
///
/// The queue's receiver dies with the socket, so a failed send is the
/// closed-subscriber signal the dispatcher expects.
struct WsSubscriber {
    tx: mpsc::Sender<String>,
}

#[async_trait]
impl Subscriber for WsSubscriber {
    async fn send(&self, frame: OutboundFrame) -> Result<(), SubscriberClosed> {
        let json = serde_json::to_string(&frame).map_err(|_| SubscriberClosed)?;
        self.tx.send(json).await.map_err(|_| SubscriberClosed)
    }
}

/// WebSocket upgrade handler for `GET /ws`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Outbound queue: the dispatcher and title generator write frames here,
    // one task forwards them onto the socket.
    let (tx, mut rx) = mpsc::channel::<String>(64);
    let sender_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    let subscriber = Arc::new(WsSubscriber { tx });

    while let Some(Ok(msg)) = ws_receiver.next().await {
        match msg {
            Message::Text(text) => {
                handle_frame(&state, &subscriber, text.as_bytes()).await;
            }
            Message::Close(_) => break,
            _ => {} // Binary and ping/pong are handled by the protocol layer.
        }
    }

    sender_task.abort();
    debug!("duplex connection closed");
}

async fn handle_frame(state: &AppState, subscriber: &Arc<WsSubscriber>, body: &[u8]) {
    let frame_type = serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(String::from));

    match frame_type.as_deref() {
        Some("ping") => {
            let _ = subscriber.send(OutboundFrame::new(frame_types::PONG)).await;
        }
        Some("chat") => {
            if let Err(e) = handle_chat(state, subscriber, body).await {
                warn!(error = %e, "chat frame rejected");
                let _ = subscriber
                    .send(OutboundFrame::new(frame_types::ERROR).with_content(&e.to_string()))
                    .await;
            }
        }
        _ => {
            debug!("discarding unrecognized duplex frame");
        }
    }
}

async fn handle_chat(
    state: &AppState,
    subscriber: &Arc<WsSubscriber>,
    body: &[u8],
) -> Result<(), ConveyorError> {
    let channel = state.registry.require("duplex")?;

    let request = InboundRequest {
        headers: Default::default(),
        body: body.to_vec(),
    };
    if !channel.verify(&request) {
        // Connection acceptance already verified the peer; a false here
        // means a misconfigured channel. Discard the frame.
        return Err(ConveyorError::VerificationFailed {
            channel: "duplex".into(),
        });
    }
    let Some(mut task_request) = channel.translate(&request)? else {
        return Ok(());
    };
    channel.defaults().apply(&mut task_request);

    // Mint a session on first contact and tell the peer about it.
    let minted = task_request.session_id.is_none();
    let session_id = task_request
        .session_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    state.store.create_session(&session_id, "duplex").await?;

    if minted {
        let _ = subscriber
            .send(
                OutboundFrame::new(frame_types::SESSION_CREATED).with_session_id(&session_id),
            )
            .await;
        spawn_title_generation(state, subscriber, &session_id, &task_request.message);
    }

    let task_id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let task = Task::pending(&task_id, &session_id, "duplex", task_request, &now);
    state.store.create_task(&task).await?;

    let dispatcher = state.dispatcher.clone();
    let store = state.store.clone();
    let live = subscriber.clone() as Arc<dyn Subscriber>;
    tokio::spawn(async move {
        dispatcher.run_task(&task_id, channel, Some(live)).await;
        if let Err(e) = store.touch_session(&session_id).await {
            warn!(session_id, error = %e, "session touch failed");
        }
    });

    Ok(())
}

/// Fire-and-forget title generation for a freshly minted session.
///
/// Emits a `session_title` frame and persists the title on success; any
/// failure is logged and never touches the task.
fn spawn_title_generation(
    state: &AppState,
    subscriber: &Arc<WsSubscriber>,
    session_id: &str,
    message: &str,
) {
    let Some(titles) = state.titles.clone() else {
        return;
    };
    let store = state.store.clone();
    let subscriber = subscriber.clone();
    let session_id = session_id.to_string();
    let message = message.to_string();

    tokio::spawn(async move {
        match titles.generate(&message).await {
            Ok(title) => {
                if let Err(e) = store.update_session_title(&session_id, &title).await {
                    warn!(session_id, error = %e, "title persist failed");
                }
                let _ = subscriber
                    .send(
                        OutboundFrame::new(frame_types::SESSION_TITLE)
                            .with_content(&title)
                            .with_session_id(&session_id),
                    )
                    .await;
            }
            Err(e) => {
                debug!(session_id, error = %e, "title generation failed");
            }
        }
    });
}
